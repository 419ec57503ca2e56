//! Renderer configuration
//!
//! Every field has a serde default, so a partial (or empty) TOML table yields
//! a usable configuration. Values are clamped by [`RendererConfig::sanitized`]
//! before the renderer uses them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::{ClearColor, FrameState};

/// Upper bound on frames the CPU may run ahead of the GPU
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

/// Errors from loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Renderer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Allocate a depth target sized to the drawable (default: false)
    #[serde(default)]
    pub use_depth_buffer: bool,
    /// Frames that may be submitted but not yet completed (default: 2, range: 1-3)
    #[serde(default = "default_frames_in_flight")]
    pub max_frames_in_flight: usize,
    /// Longest wait for the next drawable before dropping a frame (default: 100)
    #[serde(default = "default_drawable_timeout_ms")]
    pub drawable_timeout_ms: u64,
    /// Longest wait for an in-flight frame to retire (default: 1000)
    #[serde(default = "default_in_flight_timeout_ms")]
    pub in_flight_timeout_ms: u64,
    /// Consecutive resize allocation failures tolerated before giving up (default: 3)
    #[serde(default = "default_max_allocation_failures")]
    pub max_allocation_failures: u32,
    /// Clear color before the application sets one (default: opaque black)
    #[serde(default)]
    pub initial_clear_color: ClearColor,
    /// Content offset before the application sets one (default: 0.0)
    #[serde(default)]
    pub initial_content_offset: f32,
}

fn default_frames_in_flight() -> usize {
    2
}
fn default_drawable_timeout_ms() -> u64 {
    100
}
fn default_in_flight_timeout_ms() -> u64 {
    1000
}
fn default_max_allocation_failures() -> u32 {
    3
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            use_depth_buffer: false,
            max_frames_in_flight: default_frames_in_flight(),
            drawable_timeout_ms: default_drawable_timeout_ms(),
            in_flight_timeout_ms: default_in_flight_timeout_ms(),
            max_allocation_failures: default_max_allocation_failures(),
            initial_clear_color: ClearColor::default(),
            initial_content_offset: 0.0,
        }
    }
}

impl RendererConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Read and parse a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not valid configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Like [`load`](Self::load), but logs a warning and falls back to
    /// defaults on any error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Using default renderer config: {}", e);
                Self::default()
            }
        }
    }

    /// Copy with out-of-range values clamped.
    pub fn sanitized(&self) -> Self {
        Self {
            max_frames_in_flight: self.max_frames_in_flight.clamp(1, MAX_FRAMES_IN_FLIGHT),
            max_allocation_failures: self.max_allocation_failures.max(1),
            ..self.clone()
        }
    }

    pub fn drawable_timeout(&self) -> Duration {
        Duration::from_millis(self.drawable_timeout_ms)
    }

    pub fn in_flight_timeout(&self) -> Duration {
        Duration::from_millis(self.in_flight_timeout_ms)
    }

    /// Frame state the renderer starts from
    pub fn initial_state(&self) -> FrameState {
        FrameState::new(self.initial_content_offset, self.initial_clear_color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =============================================================
    // Default value tests
    // =============================================================

    #[test]
    fn test_config_default() {
        let config = RendererConfig::default();
        assert!(!config.use_depth_buffer);
        assert_eq!(config.max_frames_in_flight, 2);
        assert_eq!(config.max_allocation_failures, 3);
        assert_eq!(config.initial_state(), FrameState::default());
    }

    #[test]
    fn test_config_deserialize_empty() {
        let config = RendererConfig::from_toml_str("").unwrap();
        assert_eq!(config, RendererConfig::default());
    }

    // =============================================================
    // TOML parsing tests
    // =============================================================

    #[test]
    fn test_config_deserialize_partial() {
        let toml_str = r#"
use_depth_buffer = true
drawable_timeout_ms = 16

[initial_clear_color]
r = 0.2
g = 0.3
b = 0.4
a = 1.0
"#;
        let config = RendererConfig::from_toml_str(toml_str).unwrap();
        assert!(config.use_depth_buffer);
        assert_eq!(config.drawable_timeout(), Duration::from_millis(16));
        assert_eq!(config.max_frames_in_flight, 2); // default
        assert_eq!(
            config.initial_clear_color,
            ClearColor::rgba(0.2, 0.3, 0.4, 1.0)
        );
    }

    #[test]
    fn test_config_rejects_wrong_types() {
        let err = RendererConfig::from_toml_str("max_frames_in_flight = \"two\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_sanitized_clamps_frames_in_flight() {
        let mut config = RendererConfig {
            max_frames_in_flight: 0,
            max_allocation_failures: 0,
            ..Default::default()
        };
        let clean = config.sanitized();
        assert_eq!(clean.max_frames_in_flight, 1);
        assert_eq!(clean.max_allocation_failures, 1);

        config.max_frames_in_flight = 8;
        assert_eq!(config.sanitized().max_frames_in_flight, MAX_FRAMES_IN_FLIGHT);
    }

    // =============================================================
    // File loading tests
    // =============================================================

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("renderer.toml");
        std::fs::write(&path, "max_frames_in_flight = 3\ninitial_content_offset = 12.5\n").unwrap();

        let config = RendererConfig::load(&path).unwrap();
        assert_eq!(config.max_frames_in_flight, 3);
        assert_eq!(config.initial_content_offset, 12.5);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = RendererConfig::load(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("nope.toml"));
    }

    #[test]
    fn test_load_or_default_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "use_depth_buffer = [").unwrap();
        assert_eq!(RendererConfig::load_or_default(&path), RendererConfig::default());
    }
}
