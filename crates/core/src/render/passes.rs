use std::{f32::consts::TAU, ops::RangeInclusive, time::Duration};

use super::Pass;
use crate::{
    assets::VideoClip,
    bus::{ControlBus, CHANGE_EXCLUSION_COLOR, CHANGE_OVERLAY_OPACITY},
    raster::{Image, Rgb},
    subscription::SubscriptionHandle,
    transition::SharedTransition,
    HyperviewError, Result,
};

/// Identity pass; by convention the terminal pass of the chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyPass;

impl Pass for CopyPass {
    fn name(&self) -> &str {
        "copy"
    }

    fn render(&self, input: &Image) -> Result<Image> {
        Ok(input.clone())
    }
}

/// Horizontal sine displacement of rows, scrolling over time.
#[derive(Debug, Clone)]
pub struct DeformPass {
    amplitude: f32,
    frequency: f32,
    speed: f32,
    phase: f32,
}

impl DeformPass {
    pub fn new(amplitude: f32, frequency: f32, speed: f32) -> Self {
        Self {
            amplitude,
            frequency,
            speed,
            phase: 0.0,
        }
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }
}

impl Pass for DeformPass {
    fn name(&self) -> &str {
        "deform"
    }

    fn update(&mut self, elapsed: Duration) -> Result<()> {
        self.phase = (self.phase + self.speed * elapsed.as_secs_f32()) % TAU;
        Ok(())
    }

    fn render(&self, input: &Image) -> Result<Image> {
        let (width, height) = (input.width(), input.height());
        let mut output = input.clone();
        for y in 0..height {
            let row = y as f32 / height.max(1) as f32;
            let shift = self.amplitude * (self.phase + row * self.frequency * TAU).sin();
            for x in 0..width {
                let source = (x as f32 - shift).round().clamp(0.0, width.saturating_sub(1) as f32);
                if let Some(pixel) = input.get(source as u32, y) {
                    output.set(x, y, pixel);
                }
            }
        }
        Ok(output)
    }
}

/// A debug-tunable parameter and its declared range.
#[derive(Debug, Clone, PartialEq)]
pub struct Tunable {
    pub name: &'static str,
    pub range: RangeInclusive<f32>,
    pub value: f32,
}

/// Hue/saturation/brightness adjustment applied by the composite pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HsvAdjust {
    hue: f32,
    saturation: f32,
    brightness: f32,
}

impl HsvAdjust {
    pub const HUE: RangeInclusive<f32> = -1.0..=1.0;
    pub const SATURATION: RangeInclusive<f32> = 0.0..=2.0;
    pub const BRIGHTNESS: RangeInclusive<f32> = 0.0..=2.0;

    pub const IDENTITY: Self = Self {
        hue: 0.0,
        saturation: 1.0,
        brightness: 1.0,
    };

    /// Builds an adjustment, clamping each value into its range.
    pub fn new(hue: f32, saturation: f32, brightness: f32) -> Self {
        let mut adjust = Self::IDENTITY;
        adjust.hue = clamp_to(&Self::HUE, hue);
        adjust.saturation = clamp_to(&Self::SATURATION, saturation);
        adjust.brightness = clamp_to(&Self::BRIGHTNESS, brightness);
        adjust
    }

    pub fn hue(&self) -> f32 {
        self.hue
    }

    pub fn saturation(&self) -> f32 {
        self.saturation
    }

    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    pub fn tunables(&self) -> [Tunable; 3] {
        [
            Tunable {
                name: "hue",
                range: Self::HUE,
                value: self.hue,
            },
            Tunable {
                name: "saturation",
                range: Self::SATURATION,
                value: self.saturation,
            },
            Tunable {
                name: "brightness",
                range: Self::BRIGHTNESS,
                value: self.brightness,
            },
        ]
    }

    /// Writes a tunable by name. Values are clamped into the declared range;
    /// non-finite values and unknown names are rejected.
    pub fn set(&mut self, name: &str, value: f32) -> Result<()> {
        if !value.is_finite() {
            return Err(HyperviewError::invalid_target(name, format!("{value} is not finite")));
        }
        match name {
            "hue" => self.hue = clamp_to(&Self::HUE, value),
            "saturation" => self.saturation = clamp_to(&Self::SATURATION, value),
            "brightness" => self.brightness = clamp_to(&Self::BRIGHTNESS, value),
            other => return Err(HyperviewError::invalid_target(other, "unknown tunable")),
        }
        Ok(())
    }

    pub fn apply(&self, color: Rgb) -> Rgb {
        if *self == Self::IDENTITY {
            return color;
        }
        let (h, s, v) = rgb_to_hsv(color);
        let h = (h + self.hue).rem_euclid(1.0);
        let s = (s * self.saturation).clamp(0.0, 1.0);
        let v = v * self.brightness;
        hsv_to_rgb(h, s, v)
    }
}

impl Default for HsvAdjust {
    fn default() -> Self {
        Self::IDENTITY
    }
}

fn clamp_to(range: &RangeInclusive<f32>, value: f32) -> f32 {
    value.clamp(*range.start(), *range.end())
}

fn rgb_to_hsv(Rgb { r, g, b }: Rgb) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    let hue = if delta <= f32::EPSILON {
        0.0
    } else if max == r {
        ((g - b) / delta).rem_euclid(6.0) / 6.0
    } else if max == g {
        ((b - r) / delta + 2.0) / 6.0
    } else {
        ((r - g) / delta + 4.0) / 6.0
    };
    let saturation = if max <= f32::EPSILON { 0.0 } else { delta / max };
    (hue, saturation, max)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb {
    let sector = h * 6.0;
    let c = v * s;
    let x = c * (1.0 - (sector.rem_euclid(2.0) - 1.0).abs());
    let m = v - c;
    let (r, g, b) = match sector as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    Rgb::new(r + m, g + m, b + m)
}

/// Exclusion blend against an animated colour, followed by an HSV adjustment.
#[derive(Debug)]
pub struct CompositePass {
    exclusion: SharedTransition<Rgb>,
    hsv: HsvAdjust,
}

impl CompositePass {
    pub fn new(initial: Rgb, transition: Duration, hsv: HsvAdjust) -> Self {
        Self {
            exclusion: SharedTransition::new("exclusion colour", initial, transition),
            hsv,
        }
    }

    /// Retargets the exclusion colour on every valid `changeExclusionColor`.
    pub fn subscribe(&self, bus: &mut ControlBus) -> SubscriptionHandle {
        let exclusion = self.exclusion.clone();
        bus.on(CHANGE_EXCLUSION_COLOR, move |payload| {
            exclusion.retarget(payload.normalized_color("exclusionColor")?)
        })
    }

    pub fn exclusion(&self) -> SharedTransition<Rgb> {
        self.exclusion.clone()
    }

    pub fn hsv(&self) -> HsvAdjust {
        self.hsv
    }

    pub fn hsv_mut(&mut self) -> &mut HsvAdjust {
        &mut self.hsv
    }
}

impl Pass for CompositePass {
    fn name(&self) -> &str {
        "composite"
    }

    fn update(&mut self, elapsed: Duration) -> Result<()> {
        self.exclusion.advance(elapsed)
    }

    fn render(&self, input: &Image) -> Result<Image> {
        let exclusion = self.exclusion.current()?;
        let hsv = self.hsv;
        Ok(input.map(|base| {
            let excluded = Rgb::new(
                exclude(base.r, exclusion.r),
                exclude(base.g, exclusion.g),
                exclude(base.b, exclusion.b),
            );
            hsv.apply(excluded)
        }))
    }
}

fn exclude(base: f32, blend: f32) -> f32 {
    base + blend - 2.0 * base * blend
}

/// Screen-blends looping video clips over the image at an animated opacity.
#[derive(Debug)]
pub struct OverlayPass {
    clips: Vec<VideoClip>,
    opacity: SharedTransition<f32>,
    time: Duration,
}

impl OverlayPass {
    pub fn new(clips: Vec<VideoClip>, opacity: f32, transition: Duration) -> Self {
        Self {
            clips,
            opacity: SharedTransition::new("overlay opacity", opacity.clamp(0.0, 1.0), transition),
            time: Duration::ZERO,
        }
    }

    /// Retargets the opacity on every valid `changeOverlayOpacity`.
    pub fn subscribe(&self, bus: &mut ControlBus) -> SubscriptionHandle {
        let opacity = self.opacity.clone();
        bus.on(CHANGE_OVERLAY_OPACITY, move |payload| {
            opacity.retarget(payload.number_in("overlayOpacity", 0.0..=1.0)? as f32)
        })
    }

    pub fn opacity(&self) -> SharedTransition<f32> {
        self.opacity.clone()
    }
}

impl Pass for OverlayPass {
    fn name(&self) -> &str {
        "overlay"
    }

    fn update(&mut self, elapsed: Duration) -> Result<()> {
        self.opacity.advance(elapsed)?;
        self.time += elapsed;
        Ok(())
    }

    fn render(&self, input: &Image) -> Result<Image> {
        let opacity = self.opacity.current()?;
        let frames: Vec<&Image> = self
            .clips
            .iter()
            .filter_map(|clip| clip.frame_at(self.time))
            .collect();
        if opacity <= 0.0 || frames.is_empty() {
            return Ok(input.clone());
        }

        let (width, height) = (input.width(), input.height());
        let mut output = input.clone();
        for y in 0..height {
            let v = y as f32 / height.saturating_sub(1).max(1) as f32;
            for x in 0..width {
                let u = x as f32 / width.saturating_sub(1).max(1) as f32;
                let Some(base) = input.get(x, y) else { continue };
                let blended = frames.iter().fold(base, |acc, frame| {
                    let layer = frame.sample(u, v);
                    let screen = Rgb::new(
                        1.0 - (1.0 - acc.r) * (1.0 - layer.r),
                        1.0 - (1.0 - acc.g) * (1.0 - layer.g),
                        1.0 - (1.0 - acc.b) * (1.0 - layer.b),
                    );
                    acc.lerp(screen, opacity)
                });
                output.set(x, y, blended);
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ControlValue;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn zero_amplitude_deform_is_identity() {
        let mut image = Image::filled(5, 3, Rgb::BLACK);
        image.set(2, 1, Rgb::WHITE);
        let mut pass = DeformPass::new(0.0, 3.0, 1.0);
        pass.update(ms(250)).unwrap();
        assert_eq!(pass.render(&image).unwrap(), image);
    }

    #[test]
    fn deform_shifts_rows() {
        let mut image = Image::filled(8, 4, Rgb::BLACK);
        for y in 0..4 {
            image.set(4, y, Rgb::WHITE);
        }
        let mut pass = DeformPass::new(2.0, 1.0, 0.0);
        pass.phase = std::f32::consts::FRAC_PI_2;
        let output = pass.render(&image).unwrap();
        assert_eq!(output.get(6, 0), Some(Rgb::WHITE));
        assert_eq!(output.get(4, 0), Some(Rgb::BLACK));
    }

    #[test]
    fn hsv_tunables_clamp_to_declared_ranges() {
        let mut hsv = HsvAdjust::default();
        hsv.set("hue", 3.0).unwrap();
        hsv.set("saturation", -1.0).unwrap();
        hsv.set("brightness", 1.5).unwrap();
        assert_eq!(hsv.hue(), 1.0);
        assert_eq!(hsv.saturation(), 0.0);
        assert_eq!(hsv.brightness(), 1.5);

        assert!(hsv.set("gamma", 1.0).is_err());
        assert!(hsv.set("hue", f32::INFINITY).is_err());
        let names: Vec<_> = hsv.tunables().iter().map(|t| t.name).collect();
        assert_eq!(names, ["hue", "saturation", "brightness"]);
    }

    #[test]
    fn hsv_adjustments_change_colour() {
        let red = Rgb::new(1.0, 0.0, 0.0);
        let grey = HsvAdjust::new(0.0, 0.0, 1.0).apply(red);
        assert!((grey.r - 1.0).abs() < 1e-6 && (grey.g - 1.0).abs() < 1e-6);

        let green = HsvAdjust::new(1.0 / 3.0, 1.0, 1.0).apply(red);
        assert!(green.g > 0.99 && green.r < 1e-5 && green.b < 1e-5);

        let dim = HsvAdjust::new(0.0, 1.0, 0.5).apply(red);
        assert!((dim.r - 0.5).abs() < 1e-6);
    }

    #[test]
    fn black_exclusion_leaves_image_untouched() {
        let pass = CompositePass::new(Rgb::BLACK, ms(1500), HsvAdjust::default());
        let image = Image::filled(3, 3, Rgb::new(0.2, 0.4, 0.6));
        assert_eq!(pass.render(&image).unwrap(), image);
    }

    #[test]
    fn white_exclusion_inverts() {
        let pass = CompositePass::new(Rgb::WHITE, ms(1500), HsvAdjust::default());
        let image = Image::filled(1, 1, Rgb::new(0.25, 0.5, 1.0));
        assert_eq!(pass.render(&image).unwrap().get(0, 0), Some(Rgb::new(0.75, 0.5, 0.0)));
    }

    #[test]
    fn exclusion_colour_follows_bus_events() {
        let mut bus = ControlBus::new();
        let mut pass = CompositePass::new(Rgb::BLACK, ms(1000), HsvAdjust::default());
        pass.subscribe(&mut bus);

        bus.emit(CHANGE_EXCLUSION_COLOR, Rgb::new(0.0, 1.0, 0.0));
        assert!(pass.exclusion().snapshot().unwrap().is_running());
        pass.update(ms(1000)).unwrap();
        assert_eq!(pass.exclusion().current().unwrap(), Rgb::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn invalid_exclusion_targets_are_rejected() {
        let mut bus = ControlBus::new();
        let pass = CompositePass::new(Rgb::BLACK, ms(1000), HsvAdjust::default());
        pass.subscribe(&mut bus);

        let report = bus.emit(CHANGE_EXCLUSION_COLOR, Rgb::new(0.0, 4.0, 0.0));
        assert_eq!(report.faulted, 1);
        let report = bus.emit(CHANGE_EXCLUSION_COLOR, ControlValue::Text("red".into()));
        assert_eq!(report.faulted, 1);
        assert!(!pass.exclusion().snapshot().unwrap().is_running());
    }

    fn white_clip() -> VideoClip {
        VideoClip {
            frames: vec![Image::filled(2, 2, Rgb::WHITE)],
            frame_duration: ms(33),
        }
    }

    #[test]
    fn transparent_overlay_is_identity() {
        let pass = OverlayPass::new(vec![white_clip()], 0.0, ms(800));
        let image = Image::filled(4, 4, Rgb::new(0.3, 0.3, 0.3));
        assert_eq!(pass.render(&image).unwrap(), image);
    }

    #[test]
    fn overlay_opacity_transitions_through_the_bus() {
        let mut bus = ControlBus::new();
        let mut pass = OverlayPass::new(vec![white_clip()], 0.0, ms(800));
        pass.subscribe(&mut bus);

        bus.emit(CHANGE_OVERLAY_OPACITY, 1.0);
        pass.update(ms(400)).unwrap();
        let midway = pass.opacity().current().unwrap();
        assert!(midway > 0.0 && midway < 1.0);

        pass.update(ms(400)).unwrap();
        assert_eq!(pass.opacity().current().unwrap(), 1.0);
        let image = Image::filled(4, 4, Rgb::new(0.3, 0.3, 0.3));
        let output = pass.render(&image).unwrap();
        assert!(output.pixels().iter().all(|p| p.r > 0.999 && p.g > 0.999 && p.b > 0.999));

        assert_eq!(bus.emit(CHANGE_OVERLAY_OPACITY, 1.5).faulted, 1);
    }
}
