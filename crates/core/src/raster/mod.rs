use serde::{Deserialize, Serialize};

/// Linear RGB colour with components nominally in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Builds a colour from a `0xRRGGBB` literal.
    pub fn from_hex(hex: u32) -> Self {
        let channel = |shift: u32| ((hex >> shift) & 0xff) as f32 / 255.0;
        Self::new(channel(16), channel(8), channel(0))
    }

    /// Componentwise linear interpolation.
    pub fn lerp(self, other: Self, t: f32) -> Self {
        Self::new(
            self.r + (other.r - self.r) * t,
            self.g + (other.g - self.g) * t,
            self.b + (other.b - self.b) * t,
        )
    }

    /// True when every component is finite and within `[0, 1]`.
    pub fn is_normalized(&self) -> bool {
        [self.r, self.g, self.b]
            .iter()
            .all(|c| c.is_finite() && (0.0..=1.0).contains(c))
    }

    pub fn clamped(self) -> Self {
        Self::new(
            self.r.clamp(0.0, 1.0),
            self.g.clamp(0.0, 1.0),
            self.b.clamp(0.0, 1.0),
        )
    }

    pub fn map(self, f: impl Fn(f32) -> f32) -> Self {
        Self::new(f(self.r), f(self.g), f(self.b))
    }
}

/// CPU raster handed from pass to pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Vec<Rgb>,
}

impl Image {
    pub fn filled(width: u32, height: u32, color: Rgb) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }

    pub fn get(&self, x: u32, y: u32) -> Option<Rgb> {
        self.index(x, y).map(|i| self.pixels[i])
    }

    /// Writes a pixel; coordinates outside the raster are ignored.
    pub fn set(&mut self, x: u32, y: u32, color: Rgb) {
        if let Some(i) = self.index(x, y) {
            self.pixels[i] = color;
        }
    }

    /// Plots a point given in normalised device coordinates (`[-1, 1]`, y up).
    pub fn plot_ndc(&mut self, x: f32, y: f32, color: Rgb) {
        if !(-1.0..=1.0).contains(&x) || !(-1.0..=1.0).contains(&y) {
            return;
        }
        let px = ((x + 1.0) * 0.5 * (self.width.saturating_sub(1)) as f32).round() as u32;
        let py = ((1.0 - y) * 0.5 * (self.height.saturating_sub(1)) as f32).round() as u32;
        self.set(px, py, color);
    }

    /// Nearest-neighbour sample at normalised coordinates, clamped to the edge.
    pub fn sample(&self, u: f32, v: f32) -> Rgb {
        if self.pixels.is_empty() {
            return Rgb::BLACK;
        }
        let x = (u.clamp(0.0, 1.0) * (self.width - 1) as f32).round() as u32;
        let y = (v.clamp(0.0, 1.0) * (self.height - 1) as f32).round() as u32;
        self.get(x, y).unwrap_or_default()
    }

    /// Average colour of the raster; black when empty.
    pub fn mean(&self) -> Rgb {
        if self.pixels.is_empty() {
            return Rgb::BLACK;
        }
        let n = self.pixels.len() as f32;
        let sum = self.pixels.iter().fold(Rgb::BLACK, |acc, p| {
            Rgb::new(acc.r + p.r, acc.g + p.g, acc.b + p.b)
        });
        sum.map(|c| c / n)
    }

    /// Returns a copy with `f` applied to every pixel.
    pub fn map(&self, f: impl Fn(Rgb) -> Rgb) -> Self {
        Self {
            width: self.width,
            height: self.height,
            pixels: self.pixels.iter().copied().map(f).collect(),
        }
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height).then(|| y as usize * self.width as usize + x as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_channels_are_normalised() {
        let color = Rgb::from_hex(0xff8000);
        assert_eq!(color.r, 1.0);
        assert!((color.g - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(color.b, 0.0);
    }

    #[test]
    fn normalisation_rejects_out_of_range_and_nan() {
        assert!(Rgb::new(0.0, 0.5, 1.0).is_normalized());
        assert!(!Rgb::new(1.2, 0.0, 0.0).is_normalized());
        assert!(!Rgb::new(f32::NAN, 0.0, 0.0).is_normalized());
    }

    #[test]
    fn sampling_clamps_and_averages() {
        let mut image = Image::filled(2, 1, Rgb::BLACK);
        image.set(1, 0, Rgb::WHITE);
        assert_eq!(image.sample(5.0, 0.0), Rgb::WHITE);
        assert_eq!(image.sample(-1.0, 0.0), Rgb::BLACK);
        assert_eq!(image.mean(), Rgb::new(0.5, 0.5, 0.5));
    }

    #[test]
    fn ndc_plot_lands_on_corners() {
        let mut image = Image::filled(4, 3, Rgb::BLACK);
        image.plot_ndc(-1.0, 1.0, Rgb::WHITE);
        image.plot_ndc(1.0, -1.0, Rgb::WHITE);
        image.plot_ndc(2.0, 0.0, Rgb::WHITE);

        assert_eq!(image.get(0, 0), Some(Rgb::WHITE));
        assert_eq!(image.get(3, 2), Some(Rgb::WHITE));
        assert_eq!(image.pixels().iter().filter(|p| **p == Rgb::WHITE).count(), 2);
    }
}
