mod subsystems;

use std::{cell::Cell, rc::Rc, time::Duration};

pub use subsystems::{
    FibrationManager, OrbitalCamera, ParticleLayer, PolytopeManager, Projection, ProjectionHandle,
    Projector4D,
};

use crate::{
    bus::{ControlBus, TOGGLE_GUIDE},
    config::RenderConfig,
    raster::{Image, Rgb},
    subscription::{isolate, SubscriptionHandle},
    Result,
};

/// An independently animated part of the scene.
///
/// `update` mutates internal state only. A subsystem that returns an error
/// must leave its state as it was before the call.
pub trait Subsystem {
    fn name(&self) -> &str;

    fn update(&mut self, elapsed: Duration) -> Result<()>;

    fn draw(&self, _target: &mut Image, _view: &View) {}

    /// Camera subsystems expose the view the scene is rendered through.
    fn view(&self) -> Option<View> {
        None
    }
}

/// Orbit camera parameters used to project world points onto the raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct View {
    pub azimuth: f32,
    pub elevation: f32,
    pub distance: f32,
    /// Vertical field of view scale; larger values zoom in.
    pub focal: f32,
    pub aspect: f32,
}

impl Default for View {
    fn default() -> Self {
        Self {
            azimuth: 0.0,
            elevation: 0.0,
            distance: 4.0,
            focal: 1.5,
            aspect: 16.0 / 9.0,
        }
    }
}

impl View {
    /// Projects a world point to normalised device coordinates. Points behind
    /// the camera yield `None`.
    pub fn project(&self, [x, y, z]: [f32; 3]) -> Option<(f32, f32)> {
        let (sa, ca) = self.azimuth.sin_cos();
        let (x, z) = (x * ca - z * sa, x * sa + z * ca);
        let (se, ce) = self.elevation.sin_cos();
        let (y, z) = (y * ce - z * se, y * se + z * ce);

        let depth = self.distance - z;
        if depth <= 1e-3 {
            return None;
        }
        Some((x * self.focal / depth / self.aspect, y * self.focal / depth))
    }

    pub fn plot(&self, target: &mut Image, point: [f32; 3], color: Rgb) {
        if let Some((x, y)) = self.project(point) {
            target.plot_ndc(x, y, color);
        }
    }
}

/// Debug axes, hidden until `toggleGuide` is received.
#[derive(Debug, Clone, Default)]
pub struct Guide {
    visible: Rc<Cell<bool>>,
}

impl Guide {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips visibility on every `toggleGuide` event.
    pub fn subscribe(&self, bus: &mut ControlBus) -> SubscriptionHandle {
        let visible = Rc::clone(&self.visible);
        bus.on(TOGGLE_GUIDE, move |_| {
            visible.set(!visible.get());
            Ok(())
        })
    }

    pub fn is_visible(&self) -> bool {
        self.visible.get()
    }

    pub fn draw(&self, target: &mut Image, view: &View) {
        if !self.is_visible() {
            return;
        }
        let axes = [
            ([1.0, 0.0, 0.0], Rgb::new(1.0, 0.0, 0.0)),
            ([0.0, 1.0, 0.0], Rgb::new(0.0, 1.0, 0.0)),
            ([0.0, 0.0, 1.0], Rgb::new(0.0, 0.0, 1.0)),
        ];
        for (axis, color) in axes {
            for step in 0..=32 {
                let t = step as f32 / 32.0 * 2.0;
                view.plot(target, axis.map(|c| c * t), color);
            }
        }
    }
}

/// Per-frame outcome of updating the subsystems.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub updated: usize,
    pub faulted: Vec<String>,
}

/// The subsystems in their fixed update order plus the debug guide.
pub struct Scene {
    width: u32,
    height: u32,
    clear_color: Rgb,
    subsystems: Vec<Box<dyn Subsystem>>,
    guide: Guide,
}

impl Scene {
    pub fn new(render: &RenderConfig) -> Self {
        Self {
            width: render.width,
            height: render.height,
            clear_color: render.clear_rgb(),
            subsystems: Vec::new(),
            guide: Guide::new(),
        }
    }

    /// Appends a subsystem. Update order is insertion order.
    pub fn add(&mut self, subsystem: impl Subsystem + 'static) {
        self.subsystems.push(Box::new(subsystem));
    }

    pub fn guide(&self) -> &Guide {
        &self.guide
    }

    pub fn subsystem_names(&self) -> Vec<&str> {
        self.subsystems.iter().map(|s| s.name()).collect()
    }

    /// Updates every subsystem in order. A faulting subsystem is logged and
    /// skipped; the rest still run.
    pub fn update(&mut self, elapsed: Duration) -> UpdateReport {
        let mut report = UpdateReport::default();
        for subsystem in &mut self.subsystems {
            let name = subsystem.name().to_string();
            match isolate(&name, || subsystem.update(elapsed)) {
                Ok(()) => report.updated += 1,
                Err(err) => {
                    tracing::warn!(subsystem = %name, error = %err, "subsystem update failed");
                    report.faulted.push(name);
                }
            }
        }
        report
    }

    pub fn view(&self) -> View {
        let aspect = self.width as f32 / self.height.max(1) as f32;
        let view = self
            .subsystems
            .iter()
            .find_map(|s| s.view())
            .unwrap_or_default();
        View { aspect, ..view }
    }

    /// Produces the raw scene image the pass chain starts from.
    ///
    /// Each subsystem draws onto a copy of the image so far. A subsystem
    /// whose `draw` panics contributes nothing this frame and is listed in
    /// [`SceneRender::faulted`]; the others still draw.
    pub fn render(&self) -> SceneRender {
        let mut image = Image::filled(self.width, self.height, self.clear_color);
        let mut faulted = Vec::new();
        let view = self.view();

        let layers = self
            .subsystems
            .iter()
            .map(|s| (s.name(), Layer::Subsystem(&**s)))
            .chain(std::iter::once(("guide", Layer::Guide(&self.guide))));
        for (name, layer) in layers {
            let drawn = isolate(name, || {
                let mut target = image.clone();
                match layer {
                    Layer::Subsystem(subsystem) => subsystem.draw(&mut target, &view),
                    Layer::Guide(guide) => guide.draw(&mut target, &view),
                }
                Ok(target)
            });
            match drawn {
                Ok(target) => image = target,
                Err(err) => {
                    tracing::warn!(subsystem = name, error = %err, "subsystem draw failed");
                    faulted.push(name.to_string());
                }
            }
        }
        SceneRender { image, faulted }
    }
}

#[derive(Clone, Copy)]
enum Layer<'a> {
    Subsystem(&'a dyn Subsystem),
    Guide(&'a Guide),
}

/// Raw scene image of one frame plus the subsystems that failed to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneRender {
    pub image: Image,
    pub faulted: Vec<String>,
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("clear_color", &self.clear_color)
            .field("subsystems", &self.subsystem_names())
            .field("guide", &self.guide.is_visible())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HyperviewError;

    struct Counter {
        name: &'static str,
        ticks: Rc<Cell<u32>>,
        fail: bool,
    }

    impl Subsystem for Counter {
        fn name(&self) -> &str {
            self.name
        }

        fn update(&mut self, _elapsed: Duration) -> Result<()> {
            if self.fail {
                return Err(HyperviewError::msg("bad state"));
            }
            self.ticks.set(self.ticks.get() + 1);
            Ok(())
        }
    }

    fn small_config() -> RenderConfig {
        RenderConfig {
            width: 32,
            height: 18,
            clear_color: 0x102030,
        }
    }

    #[test]
    fn failing_subsystem_does_not_block_the_rest() {
        let ticks = Rc::new(Cell::new(0));
        let mut scene = Scene::new(&small_config());
        scene.add(Counter { name: "broken", ticks: Rc::clone(&ticks), fail: true });
        scene.add(Counter { name: "healthy", ticks: Rc::clone(&ticks), fail: false });

        let report = scene.update(Duration::from_millis(16));

        assert_eq!(ticks.get(), 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.faulted, vec!["broken".to_string()]);
    }

    /// Fills the raster with white, or panics mid-draw.
    struct Painter {
        name: &'static str,
        panics: bool,
    }

    impl Subsystem for Painter {
        fn name(&self) -> &str {
            self.name
        }

        fn update(&mut self, _elapsed: Duration) -> Result<()> {
            Ok(())
        }

        fn draw(&self, target: &mut Image, _view: &View) {
            target.set(0, 0, Rgb::WHITE);
            if self.panics {
                panic!("draw exploded");
            }
            *target = target.map(|_| Rgb::WHITE);
        }
    }

    #[test]
    fn panicking_draw_is_skipped_without_partial_output() {
        let mut scene = Scene::new(&small_config());
        scene.add(Painter { name: "broken", panics: true });
        let rendered = scene.render();
        assert_eq!(rendered.faulted, vec!["broken".to_string()]);
        assert!(rendered.image.pixels().iter().all(|p| *p == Rgb::from_hex(0x102030)));

        scene.add(Painter { name: "painter", panics: false });
        let rendered = scene.render();
        assert_eq!(rendered.faulted, vec!["broken".to_string()]);
        assert!(rendered.image.pixels().iter().all(|p| *p == Rgb::WHITE));
    }

    #[test]
    fn empty_scene_renders_clear_colour() {
        let scene = Scene::new(&small_config());
        let image = scene.render().image;
        assert_eq!(image.width(), 32);
        assert!(image.pixels().iter().all(|p| *p == Rgb::from_hex(0x102030)));
    }

    #[test]
    fn guide_toggles_through_the_bus() {
        let mut bus = ControlBus::new();
        let scene = Scene::new(&small_config());
        scene.guide().subscribe(&mut bus);

        assert!(!scene.guide().is_visible());
        let hidden = scene.render().image;

        bus.emit(TOGGLE_GUIDE, crate::bus::ControlValue::Unit);
        assert!(scene.guide().is_visible());
        assert_ne!(scene.render().image, hidden);

        bus.emit(TOGGLE_GUIDE, crate::bus::ControlValue::Unit);
        assert!(!scene.guide().is_visible());
    }

    #[test]
    fn view_projects_origin_to_centre() {
        let view = View::default();
        assert_eq!(view.project([0.0, 0.0, 0.0]), Some((0.0, 0.0)));
        assert_eq!(view.project([0.0, 0.0, 10.0]), None);
    }
}
