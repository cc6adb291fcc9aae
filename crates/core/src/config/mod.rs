use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{raster::Rgb, Result};

/// Top-level configuration structure for the application.
///
/// The struct is built once (defaults, JSON file, or both) and handed to the
/// orchestrator by reference. Nothing mutates it after startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub render: RenderConfig,
    pub ticker: TickerConfig,
    pub transitions: TransitionConfig,
    pub composite: CompositeConfig,
    pub deform: DeformConfig,
    pub overlay: OverlayConfig,
}

impl AppConfig {
    /// Parses a configuration document. Missing sections keep their defaults.
    pub fn from_json_str(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Reads and parses a configuration file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_json_str(&source)
    }
}

/// Size of the fixed-aspect render target and its clear colour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub clear_color: u32,
}

impl RenderConfig {
    pub fn clear_rgb(&self) -> Rgb {
        Rgb::from_hex(self.clear_color)
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 36,
            clear_color: 0x000000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickerConfig {
    /// Elapsed time reported on the very first tick after `start`.
    pub first_tick_elapsed_ms: u64,
}

impl TickerConfig {
    pub fn first_tick_elapsed(&self) -> Duration {
        Duration::from_millis(self.first_tick_elapsed_ms)
    }
}

/// Durations of the animated parameter classes, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    pub exclusion_color_ms: u64,
    pub overlay_opacity_ms: u64,
}

impl TransitionConfig {
    pub fn exclusion_color(&self) -> Duration {
        Duration::from_millis(self.exclusion_color_ms)
    }

    pub fn overlay_opacity(&self) -> Duration {
        Duration::from_millis(self.overlay_opacity_ms)
    }
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            exclusion_color_ms: 1500,
            overlay_opacity_ms: 800,
        }
    }
}

/// Initial hue/saturation/brightness adjustment of the composite pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeConfig {
    pub hue: f32,
    pub saturation: f32,
    pub brightness: f32,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            hue: 0.0,
            saturation: 1.0,
            brightness: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeformConfig {
    /// Maximum horizontal displacement in pixels.
    pub amplitude: f32,
    /// Waves per image height.
    pub frequency: f32,
    /// Phase advance in radians per second.
    pub speed: f32,
}

impl Default for DeformConfig {
    fn default() -> Self {
        Self {
            amplitude: 1.5,
            frequency: 2.0,
            speed: 1.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Opacity of the video overlay before any `changeOverlayOpacity`.
    pub opacity: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self { opacity: 0.35 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_documents_keep_defaults() {
        let config =
            AppConfig::from_json_str(r#"{ "render": { "width": 160, "height": 90 } }"#).unwrap();

        assert_eq!(config.render.width, 160);
        assert_eq!(config.render.clear_color, 0x000000);
        assert_eq!(config.transitions.exclusion_color(), Duration::from_millis(1500));
        assert_eq!(config.composite, CompositeConfig::default());
        assert_eq!(config.overlay.opacity, 0.35);
    }

    #[test]
    fn rejects_malformed_documents() {
        let err = AppConfig::from_json_str("{ render: ").unwrap_err();
        assert!(matches!(err, crate::HyperviewError::Json(_)));
    }
}
