//! Configuration management for snapcam
//!
//! Controls which output the session is wired with, which camera is
//! preferred at setup, frame stream connection settings, preview geometry
//! and how many still captures may be in flight.

use crate::errors::CameraError;
use crate::types::{CameraPosition, FlashMode, Orientation, OutputMode, PixelFormat, VideoGravity};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix for environment overrides, e.g. `SNAPCAM_SESSION__OUTPUT_MODE=frame_stream`.
pub const ENV_PREFIX: &str = "SNAPCAM";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapcamConfig {
    pub session: SessionConfig,
    pub stream: StreamConfig,
    pub preview: PreviewConfig,
    pub capture: CaptureConfig,
}

/// Session wiring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Photo output or continuous frame stream
    pub output_mode: OutputMode,
    /// Camera to start on; falls back to the output mode's default when unset
    #[serde(default)]
    pub preferred_camera: Option<CameraPosition>,
    /// Flash mode used for captures that do not specify one
    pub default_flash: FlashMode,
}

/// Frame stream output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub pixel_format: PixelFormat,
    /// Drop frames that arrive while the previous one is still being handled
    pub discard_late_frames: bool,
    /// Mirror frames from the front camera when the connection supports it
    pub mirror_front_camera: bool,
    pub orientation: Orientation,
}

/// Preview layer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewConfig {
    pub orientation: Orientation,
    pub gravity: VideoGravity,
}

/// Still capture settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Requests beyond this many unresolved captures are rejected (1-8)
    pub max_pending: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            output_mode: OutputMode::Photo,
            preferred_camera: None,
            default_flash: FlashMode::Off,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::Bgra8,
            discard_late_frames: true,
            mirror_front_camera: true,
            orientation: Orientation::Portrait,
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            orientation: Orientation::Portrait,
            gravity: VideoGravity::ResizeAspectFill,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { max_pending: 1 }
    }
}

impl SnapcamConfig {
    /// Defaults for the frame stream variant.
    pub fn frame_stream() -> Self {
        let mut config = Self::default();
        config.session.output_mode = OutputMode::FrameStream;
        config
    }

    /// Camera used at setup: the explicit preference, else the output mode's default.
    pub fn preferred_camera(&self) -> CameraPosition {
        self.session
            .preferred_camera
            .unwrap_or_else(|| self.session.output_mode.default_camera())
    }

    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CameraError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| CameraError::Config(format!("Failed to read config file: {}", e)))?;

        let config: SnapcamConfig = toml::from_str(&contents)
            .map_err(|e| CameraError::Config(format!("Failed to parse config file: {}", e)))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load defaults, then the optional TOML file, then `SNAPCAM_*` environment overrides.
    pub fn load_layered(path: Option<&Path>) -> Result<Self, CameraError> {
        let defaults = config::Config::try_from(&Self::default())
            .map_err(|e| CameraError::Config(format!("Failed to build defaults: {}", e)))?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        );

        let config: SnapcamConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| CameraError::Config(format!("Failed to load configuration: {}", e)))?;

        config.validate().map_err(CameraError::Config)?;
        log::debug!("Layered configuration: {:?}", config);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CameraError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CameraError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| CameraError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| CameraError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("snapcam.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.capture.max_pending == 0 || self.capture.max_pending > 8 {
            return Err("Max pending captures must be between 1 and 8".to_string());
        }
        if self.stream.pixel_format != PixelFormat::Bgra8
            && self.session.output_mode == OutputMode::FrameStream
        {
            return Err("Frame stream output only delivers BGRA8 buffers".to_string());
        }
        Ok(())
    }
}
