//! Application and renderer configuration.
//!
//! Configuration is read from a TOML file. Every field has a default, so a
//! partial file (or no file at all) is valid:
//!
//! ```toml
//! log_filter = "info,toybox_renderer=trace"
//!
//! [window]
//! width = 1920
//! height = 1080
//!
//! [renderer]
//! frames_in_flight = 3
//! validation = "required"
//! present_mode = "fifo"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Smallest supported frame-slot ring.
pub const MIN_FRAMES_IN_FLIGHT: usize = 1;
/// Largest supported frame-slot ring.
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Tracing filter directives, overridden by `RUST_LOG`.
    pub log_filter: Option<String>,
    pub window: WindowConfig,
    pub renderer: RendererConfig,
    pub scene: SceneConfig,
}

impl AppConfig {
    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and [`Error::Config`]
    /// if it is not valid TOML for this schema.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Loads a configuration file, falling back to defaults when it is absent.
    ///
    /// A file that exists but fails to parse is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Parses configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let mut config: Self =
            toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        config.renderer.frames_in_flight = config
            .renderer
            .frames_in_flight
            .clamp(MIN_FRAMES_IN_FLIGHT, MAX_FRAMES_IN_FLIGHT);
        Ok(config)
    }

    /// Serializes the effective configuration.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Main window settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "ToyBox - Vulkan Renderer".to_string(),
            width: 1280,
            height: 800,
        }
    }
}

/// Validation layer policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Never enable the validation layer.
    Disabled,
    /// Enable it when installed, continue without it otherwise.
    Preferred,
    /// Refuse to start without it.
    Required,
}

impl Default for ValidationMode {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            ValidationMode::Preferred
        } else {
            ValidationMode::Disabled
        }
    }
}

/// Preferred presentation mode; FIFO is always the fallback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModePreference {
    /// Low latency without tearing.
    #[default]
    Mailbox,
    /// Strict vsync.
    Fifo,
    /// No vsync, may tear.
    Immediate,
}

/// Renderer settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Number of frame slots in the ring.
    pub frames_in_flight: usize,
    pub validation: ValidationMode,
    pub present_mode: PresentModePreference,
    /// Directory holding compiled `.spv` shader modules.
    pub shader_dir: PathBuf,
    pub clear_color: [f32; 4],
    /// Spin the demo models around Y, in radians per second.
    pub spin_speed: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            validation: ValidationMode::default(),
            present_mode: PresentModePreference::default(),
            shader_dir: PathBuf::from("shaders"),
            clear_color: [0.1, 0.1, 0.12, 1.0],
            spin_speed: 0.5,
        }
    }
}

/// Scene inputs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Image files assigned, in order, to the demo materials.
    pub textures: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 800);
        assert_eq!(config.renderer.frames_in_flight, 2);
    }

    #[test]
    fn test_partial_file() {
        let config = AppConfig::from_toml_str(
            r#"
            [renderer]
            validation = "required"
            present_mode = "fifo"
            "#,
        )
        .unwrap();
        assert_eq!(config.renderer.validation, ValidationMode::Required);
        assert_eq!(config.renderer.present_mode, PresentModePreference::Fifo);
        assert_eq!(config.window, WindowConfig::default());
    }

    #[test]
    fn test_frames_in_flight_clamped() {
        let config = AppConfig::from_toml_str("[renderer]\nframes_in_flight = 16\n").unwrap();
        assert_eq!(config.renderer.frames_in_flight, MAX_FRAMES_IN_FLIGHT);

        let config = AppConfig::from_toml_str("[renderer]\nframes_in_flight = 0\n").unwrap();
        assert_eq!(config.renderer.frames_in_flight, MIN_FRAMES_IN_FLIGHT);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = AppConfig::from_toml_str("[window\nwidth = ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unknown_validation_mode_rejected() {
        let err = AppConfig::from_toml_str("[renderer]\nvalidation = \"sometimes\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_serialized_config_parses_back() {
        let mut config = AppConfig::default();
        config.window.title = "Test".to_string();
        config.log_filter = Some("debug".to_string());
        let text = config.to_toml_string().unwrap();
        assert_eq!(AppConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config =
            AppConfig::load_or_default(Path::new("definitely/not/here/toybox.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }
}
