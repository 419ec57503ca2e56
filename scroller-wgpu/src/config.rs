//! Host configuration (scroller.toml)
//!
//! The renderer section is [`RendererConfig`]; window and animation settings
//! belong to the host.

use std::path::Path;

use serde::{Deserialize, Serialize};

use scroller_core::{ClearColor, ConfigError, RendererConfig};

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ScrollerConfig {
    #[serde(default)]
    pub renderer: RendererConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub animation: AnimationConfig,
}

/// Window settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Window title (default: "Scroller")
    #[serde(default = "default_title")]
    pub title: String,
    /// Initial logical width (default: 1280)
    #[serde(default = "default_width")]
    pub width: u32,
    /// Initial logical height (default: 720)
    #[serde(default = "default_height")]
    pub height: u32,
    /// Whether to enable vertical sync (default: true)
    #[serde(default = "default_true")]
    pub vsync: bool,
}

/// Settings for the built-in animation that drives the frame state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationConfig {
    /// Content offset change per second (default: 120.0)
    #[serde(default = "default_scroll_speed")]
    pub scroll_speed: f64,
    /// Seconds for one pass through the palette (default: 8.0)
    #[serde(default = "default_color_period")]
    pub color_period_secs: f64,
    /// Clear colors blended in order, wrapping around
    #[serde(default = "default_palette")]
    pub palette: Vec<ClearColor>,
}

fn default_title() -> String {
    "Scroller".to_string()
}
fn default_width() -> u32 {
    1280
}
fn default_height() -> u32 {
    720
}
fn default_true() -> bool {
    true
}
fn default_scroll_speed() -> f64 {
    120.0
}
fn default_color_period() -> f64 {
    8.0
}
fn default_palette() -> Vec<ClearColor> {
    vec![
        ClearColor::opaque(0.05, 0.05, 0.12),
        ClearColor::opaque(0.10, 0.30, 0.45),
        ClearColor::opaque(0.45, 0.15, 0.30),
    ]
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            width: default_width(),
            height: default_height(),
            vsync: default_true(),
        }
    }
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            scroll_speed: default_scroll_speed(),
            color_period_secs: default_color_period(),
            palette: default_palette(),
        }
    }
}

impl ScrollerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ScrollerConfig::default();
        assert_eq!(config.window.title, "Scroller");
        assert_eq!((config.window.width, config.window.height), (1280, 720));
        assert!(config.window.vsync);
        assert_eq!(config.animation.palette.len(), 3);
        assert_eq!(config.renderer, RendererConfig::default());
    }

    #[test]
    fn test_config_deserialize_empty() {
        assert_eq!(
            ScrollerConfig::from_toml_str("").unwrap(),
            ScrollerConfig::default()
        );
    }

    #[test]
    fn test_config_deserialize_sections() {
        let toml_str = r#"
[renderer]
use_depth_buffer = true
max_frames_in_flight = 3

[window]
vsync = false

[animation]
scroll_speed = 30.0
palette = [
    { r = 1.0, g = 0.0, b = 0.0, a = 1.0 },
    { r = 0.0, g = 0.0, b = 1.0, a = 1.0 },
]
"#;
        let config = ScrollerConfig::from_toml_str(toml_str).unwrap();
        assert!(config.renderer.use_depth_buffer);
        assert_eq!(config.renderer.max_frames_in_flight, 3);
        assert!(!config.window.vsync);
        assert_eq!(config.window.width, 1280); // default
        assert_eq!(config.animation.scroll_speed, 30.0);
        assert_eq!(
            config.animation.palette,
            vec![ClearColor::RED, ClearColor::BLUE]
        );
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scroller.toml");
        std::fs::write(&path, "[window]\ntitle = \"Demo\"\n").unwrap();

        let config = ScrollerConfig::load(&path).unwrap();
        assert_eq!(config.window.title, "Demo");
    }

    #[test]
    fn test_config_serialize_roundtrip() {
        let mut config = ScrollerConfig::default();
        config.animation.color_period_secs = 2.5;
        let text = toml::to_string(&config).unwrap();
        assert_eq!(ScrollerConfig::from_toml_str(&text).unwrap(), config);
    }
}
