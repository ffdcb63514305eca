use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use tracing::Level;

use crate::common::Rotation;
use crate::error::AppError;

pub const DEFAULT_CONFIG_FILE: &str = "depth_overlay";
pub const ENV_PREFIX: &str = "DEPTH_OVERLAY";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_level: String,
    pub pipeline: PipelineSettings,
    pub model: ModelSettings,
    pub source: SourceSettings,
    pub ui: UiSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub enabled_on_start: bool,
    /// Capacity of the channel between the frame source and the ingestion loop.
    pub frame_buffer_size: usize,
    /// Deadline for one inference call. Unset means no deadline.
    pub inference_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub output_size: u32,
    pub prior_weight: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Synthetic,
    Replay,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub kind: SourceKind,
    /// Directory of still images for the replay source.
    pub path: Option<PathBuf>,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    /// Rotation reported with every frame, in degrees.
    pub rotation: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UiSettings {
    pub enabled: bool,
    pub title: String,
    pub width: f32,
    pub height: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            pipeline: PipelineSettings::default(),
            model: ModelSettings::default(),
            source: SourceSettings::default(),
            ui: UiSettings::default(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            enabled_on_start: true,
            frame_buffer_size: 2,
            inference_timeout_ms: None,
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            output_size: 256,
            prior_weight: 0.7,
        }
    }
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            kind: SourceKind::Synthetic,
            path: None,
            fps: 30,
            width: 640,
            height: 480,
            rotation: 0,
        }
    }
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            title: "Depth Overlay".to_string(),
            width: 960.0,
            height: 720.0,
        }
    }
}

impl Settings {
    /// Loads settings from an optional TOML file layered with
    /// `DEPTH_OVERLAY__SECTION__KEY` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let builder = Config::builder().add_source(file).add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );
        Self::from_builder(builder)
    }

    pub(crate) fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, AppError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.log_level()?;
        if self.pipeline.frame_buffer_size == 0 {
            return Err(AppError::Config(
                "Frame buffer size must be greater than 0".to_string(),
            ));
        }
        if self.pipeline.inference_timeout_ms == Some(0) {
            return Err(AppError::Config(
                "Inference timeout must be greater than 0 when set".to_string(),
            ));
        }
        if self.model.output_size == 0 {
            return Err(AppError::Config(
                "Model output size must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.model.prior_weight) {
            return Err(AppError::Config(
                "Prior weight must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.source.fps == 0 {
            return Err(AppError::Config("Source fps must be greater than 0".to_string()));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(AppError::Config(
                "Source dimensions must be greater than 0".to_string(),
            ));
        }
        if self.source.kind == SourceKind::Replay && self.source.path.is_none() {
            return Err(AppError::Config(
                "Replay source needs source.path".to_string(),
            ));
        }
        self.rotation()?;
        Ok(())
    }

    pub fn log_level(&self) -> Result<Level, AppError> {
        Level::from_str(&self.log_level)
            .map_err(|_| AppError::Config(format!("Unknown log level '{}'", self.log_level)))
    }

    pub fn rotation(&self) -> Result<Rotation, AppError> {
        Rotation::try_from(self.source.rotation).map_err(|e| AppError::Config(e.to_string()))
    }

    pub fn inference_timeout(&self) -> Option<Duration> {
        self.pipeline.inference_timeout_ms.map(Duration::from_millis)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.source.fps as f64)
    }
}
