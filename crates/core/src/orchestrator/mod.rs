//! Owns the scene and the pass chain and sequences them once per tick.

use std::{cell::RefCell, rc::Rc, time::Duration};

use crate::{
    assets::{AssetLoader, AssetStore},
    bus::ControlBus,
    config::AppConfig,
    raster::Rgb,
    render::{
        CompositePass, CopyPass, DeformPass, HsvAdjust, OverlayPass, PassChain, RenderReport,
        Surface,
    },
    scene::{
        FibrationManager, OrbitalCamera, ParticleLayer, PolytopeManager, Projector4D, Scene,
        UpdateReport,
    },
    startup::StartupBarrier,
    subscription::SubscriptionHandle,
    ticker::{Tick, Ticker},
    transition::SharedTransition,
    HyperviewError, Result,
};

const SMALL_PARTICLE_SCALE: f32 = 0.8;
const LARGE_PARTICLE_SCALE: f32 = 1.6;
const FIBERS: usize = 12;

/// What happened during one [`Orchestrator::animate`] sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub frame: u64,
    pub elapsed: Duration,
    pub scene: UpdateReport,
    /// Subsystems whose `draw` failed this tick.
    pub draw_faults: Vec<String>,
    /// Passes whose `update` failed this tick.
    pub pass_faults: Vec<String>,
    pub render: RenderReport,
}

impl FrameReport {
    pub fn is_clean(&self) -> bool {
        self.scene.faulted.is_empty()
            && self.draw_faults.is_empty()
            && self.pass_faults.is_empty()
            && self.render.faulted.is_empty()
    }
}

#[derive(Debug)]
pub struct Orchestrator {
    scene: Scene,
    chain: PassChain,
    surface: Surface,
    exclusion: SharedTransition<Rgb>,
    overlay_opacity: SharedTransition<f32>,
    subscriptions: Vec<SubscriptionHandle>,
    last_report: Option<FrameReport>,
}

impl Orchestrator {
    /// Builds the scene, its objects and the post-processing chain, in that
    /// order, from already loaded assets. Control-bus subscriptions are made
    /// last, so a failed construction leaves `bus` untouched.
    pub fn new(config: &AppConfig, assets: &AssetStore, bus: &mut ControlBus) -> Result<Self> {
        let mut scene = Scene::new(&config.render);
        let projector = Projector4D::default();
        let projection = projector.handle();
        scene.add(PolytopeManager::from_graph(assets.data("graphs")?, projection.clone())?);
        scene.add(projector);
        scene.add(OrbitalCamera::default());

        let tint = assets.texture("dandruff_small_tex")?.mean();
        let mut dandruff = ParticleLayer::new(projection.clone(), tint);
        dandruff.add_mesh(assets.mesh("dandruff_small_obj")?, SMALL_PARTICLE_SCALE);
        dandruff.add_mesh(assets.mesh("dandruff_large_obj")?, LARGE_PARTICLE_SCALE);
        scene.add(dandruff);
        scene.add(FibrationManager::new(projection, FIBERS));

        let deform = &config.deform;
        let composite = &config.composite;
        let mut hsv = HsvAdjust::default();
        hsv.set("hue", composite.hue)?;
        hsv.set("saturation", composite.saturation)?;
        hsv.set("brightness", composite.brightness)?;
        let composite = CompositePass::new(Rgb::BLACK, config.transitions.exclusion_color(), hsv);

        let clips = vec![
            assets.video("overlay_attack")?.clone(),
            assets.video("overlay_zfighting")?.clone(),
        ];
        let overlay = OverlayPass::new(
            clips,
            config.overlay.opacity,
            config.transitions.overlay_opacity(),
        );

        let exclusion = composite.exclusion();
        let overlay_opacity = overlay.opacity();
        let subscriptions = vec![
            scene.guide().subscribe(bus),
            composite.subscribe(bus),
            overlay.subscribe(bus),
        ];

        let mut chain = PassChain::new();
        let deform = chain.add_pass(DeformPass::new(
            deform.amplitude,
            deform.frequency,
            deform.speed,
        ));
        let composite = chain.add_pass(composite);
        let overlay = chain.add_pass(overlay);
        let copy = chain.add_pass(CopyPass);
        chain.render_to_screen_last()?;
        chain.set_update_order(&[deform, overlay, composite, copy])?;

        tracing::info!(
            subsystems = ?scene.subsystem_names(),
            passes = ?chain.pass_names(),
            "orchestrator ready"
        );

        Ok(Self {
            scene,
            chain,
            surface: Surface::new(),
            exclusion,
            overlay_opacity,
            subscriptions,
            last_report: None,
        })
    }

    /// One frame: subsystems, then pass state, then the chain render.
    pub fn animate(&mut self, tick: &Tick) -> Result<FrameReport> {
        let scene = self.scene.update(tick.elapsed);
        let pass_faults = self.chain.update(tick.elapsed);
        let rendered = self.scene.render();
        let render = self.chain.render(rendered.image, &mut self.surface)?;

        let report = FrameReport {
            frame: tick.frame,
            elapsed: tick.elapsed,
            scene,
            draw_faults: rendered.faulted,
            pass_faults,
            render,
        };
        if !report.is_clean() {
            tracing::debug!(frame = report.frame, ?report, "frame had faults");
        }
        self.last_report = Some(report.clone());
        Ok(report)
    }

    /// Hands the orchestrator to `ticker`, which calls [`Self::animate`] on
    /// every update until [`Self::detach`].
    pub fn attach(self, ticker: &mut Ticker) -> Rc<RefCell<Self>> {
        let shared = Rc::new(RefCell::new(self));
        let driven = Rc::clone(&shared);
        let handle = ticker.on_update(move |tick| {
            driven
                .try_borrow_mut()
                .map_err(|_| HyperviewError::Busy("orchestrator"))?
                .animate(tick)
                .map(|_| ())
        });
        shared.borrow_mut().subscriptions.push(handle);
        shared
    }

    /// Waits on the startup barrier, then constructs, attaches and starts
    /// the ticker. Nothing is constructed if any asset fails.
    pub async fn launch(
        config: &AppConfig,
        barrier: StartupBarrier,
        loader: &dyn AssetLoader,
        bus: &mut ControlBus,
        ticker: &mut Ticker,
        now: Duration,
    ) -> Result<Rc<RefCell<Self>>> {
        let assets = barrier.when_all_ready(loader).await?;
        let orchestrator = Self::new(config, &assets, bus)?.attach(ticker);
        ticker.start(now);
        Ok(orchestrator)
    }

    /// Cancels the control-bus subscriptions and, once attached, the ticker
    /// subscription.
    pub fn detach(&self) {
        for handle in &self.subscriptions {
            handle.cancel();
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Extra subsystems added here run after the built-in ones.
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn chain(&self) -> &PassChain {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut PassChain {
        &mut self.chain
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn guide_visible(&self) -> bool {
        self.scene.guide().is_visible()
    }

    pub fn exclusion(&self) -> &SharedTransition<Rgb> {
        &self.exclusion
    }

    pub fn overlay_opacity(&self) -> &SharedTransition<f32> {
        &self.overlay_opacity
    }

    pub fn last_report(&self) -> Option<&FrameReport> {
        self.last_report.as_ref()
    }
}
