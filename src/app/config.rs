//! Harness configuration.
//!
//! Loaded from a TOML file; every field has a default so a partial file (or
//! none at all) is valid.

use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub audio: AudioSettings,
    pub source: SourceSettings,
    pub hrtf: HrtfSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub sample_rate: u32,
    /// Frames per callback.
    pub buffer_size: usize,
    /// Output device index or name (empty string means system default)
    pub output_device: String,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            buffer_size: 512,
            output_device: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Mono source material; white noise when unset or unreadable.
    pub wav_file: Option<PathBuf>,
    pub initial_azimuth: f64,
    pub initial_elevation: f64,
    /// Metres.
    pub initial_distance: f64,
    /// Degrees per callback.
    pub step_degrees: f64,
    pub noise_seconds: f32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            wav_file: None,
            initial_azimuth: 0.0,
            initial_elevation: 0.0,
            initial_distance: 2.0,
            step_degrees: 0.1,
            noise_seconds: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerModel {
    Hrtf,
    Panning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HrtfSource {
    /// Synthesised rigid-sphere head.
    HeadModel,
    /// SOFA files (needs the `sofa` feature).
    Sofa,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HrtfSettings {
    pub model: ListenerModel,
    pub reader: HrtfSource,
    pub files: Vec<PathBuf>,
    /// Grid spacing in degrees the HRTFs are resampled to.
    pub resampling_step: f32,
    pub interpolation: bool,
    pub near_field: bool,
    pub grid_csv: PathBuf,
}

impl Default for HrtfSettings {
    fn default() -> Self {
        Self {
            model: ListenerModel::Hrtf,
            reader: HrtfSource::HeadModel,
            files: vec![PathBuf::from("spherical-head")],
            resampling_step: 15.0,
            interpolation: true,
            near_field: false,
            grid_csv: PathBuf::from("hrtf_grid.csv"),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!("Config file {:?} not found, using defaults", path);
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, toml).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Saved config to {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> Result<(), ConfigError> {
            Err(ConfigError::Invalid {
                field,
                reason: reason.into(),
            })
        }

        if self.audio.sample_rate == 0 {
            return invalid("audio.sample_rate", "must be positive");
        }
        if self.audio.buffer_size == 0 {
            return invalid("audio.buffer_size", "must be at least 1 frame");
        }
        if !(self.source.initial_distance > 0.0) {
            return invalid("source.initial_distance", "must be positive");
        }
        if !(self.source.step_degrees > 0.0 && self.source.step_degrees <= 180.0) {
            return invalid("source.step_degrees", "must be in (0, 180]");
        }
        if !(-90.0..=90.0).contains(&self.source.initial_elevation) {
            return invalid("source.initial_elevation", "must be in [-90, 90]");
        }
        let step = self.hrtf.resampling_step;
        if !(step > 0.0 && step <= 90.0) {
            return invalid("hrtf.resampling_step", "must be in (0, 90]");
        }
        Ok(())
    }
}
