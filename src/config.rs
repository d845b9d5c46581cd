//! Configuration file handling for retrocam.
//!
//! Loads configuration from `~/.config/retrocam/config.toml` or a custom path.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app::ControllerConfig;
use crate::exposure::TuneConfig;
use crate::memory::HostMemory;
use crate::pipeline::{CaptureMode, PipelineSettings};
use crate::preview::PreviewSettings;
use crate::sensor::{PixelFormat, SensorConfig};
use crate::tone::DitherAlgorithm;

/// Configuration file structure for retrocam.
/// Loaded from ~/.config/retrocam/config.toml (or custom path via --config).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub exposure: ExposureConfig,
    #[serde(default)]
    pub tone: ToneConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    pub jpeg_quality: u8,
    /// Bytes of external RAM; 0 means none fitted
    pub external_ram: usize,
    pub prefer_rgb: bool,
    /// Make the simulated sensor reject RGB565 (exercises the JPEG fallback)
    pub fail_rgb_init: bool,
    /// Largest frame the capture arena accepts
    pub max_width: u32,
    pub max_height: u32,
    pub mode: CaptureMode,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 160,
            height: 120,
            jpeg_quality: 80,
            external_ram: 4 * 1024 * 1024,
            prefer_rgb: true,
            fail_rgb_init: false,
            max_width: 320,
            max_height: 240,
            mode: CaptureMode::Normal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposureConfig {
    pub enabled: bool,
    pub target: u8,
    pub tolerance: u8,
    pub interval_ms: u64,
    pub max_iterations: u32,
    pub sample_stride: usize,
    pub auto_exposure: bool,
    pub auto_gain: bool,
}

impl Default for ExposureConfig {
    fn default() -> Self {
        let tune = TuneConfig::default();
        Self {
            enabled: true,
            target: tune.target_brightness,
            tolerance: tune.tolerance,
            interval_ms: tune.sample_interval.as_millis() as u64,
            max_iterations: tune.max_iterations,
            sample_stride: tune.sample_stride,
            auto_exposure: tune.auto_exposure,
            auto_gain: tune.auto_gain,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneConfig {
    pub gamma: f32,
    pub night_gamma: f32,
    pub night_contrast: f32,
    pub night_threshold: u8,
    pub algorithm: DitherAlgorithm,
    pub palette: String,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            gamma: 0.9,
            night_gamma: 0.5,
            night_contrast: 1.6,
            night_threshold: 96,
            algorithm: DitherAlgorithm::Bayer8,
            palette: "classic".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub width: u32,
    pub height: u32,
    pub algorithm: DitherAlgorithm,
    pub fps: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            width: 80,
            height: 60,
            algorithm: DitherAlgorithm::Bayer8,
            fps: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub filter: bool,
    pub filter_block: usize,
    pub feedback_ms: u64,
    pub hold_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            filter: false,
            filter_block: 4,
            feedback_ms: 1500,
            hold_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub prefix: String,
    /// Settings file; relative paths are resolved against `root`
    pub settings: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("captures"),
            prefix: "IMG_".to_string(),
            settings: PathBuf::from("settings.toml"),
        }
    }
}

impl StorageConfig {
    pub fn settings_path(&self) -> PathBuf {
        if self.settings.is_absolute() {
            self.settings.clone()
        } else {
            self.root.join(&self.settings)
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
                path: path.clone(),
                source: e,
            })?;
            let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.clone(),
                source: e,
            })?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Write this configuration as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_toml()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::IoError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::SerializeError)
    }

    /// Sensor parameters; the pixel format is picked during bring-up.
    pub fn sensor_config(&self) -> SensorConfig {
        SensorConfig {
            format: PixelFormat::Jpeg,
            width: self.camera.width,
            height: self.camera.height,
            jpeg_quality: self.camera.jpeg_quality.clamp(1, 100),
        }
    }

    pub fn tune_config(&self) -> TuneConfig {
        TuneConfig {
            target_brightness: self.exposure.target,
            tolerance: self.exposure.tolerance,
            sample_interval: Duration::from_millis(self.exposure.interval_ms),
            max_iterations: self.exposure.max_iterations,
            sample_stride: self.exposure.sample_stride.max(1),
            auto_exposure: self.exposure.auto_exposure,
            auto_gain: self.exposure.auto_gain,
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            max_width: self.camera.max_width,
            max_height: self.camera.max_height,
            stylized_algorithm: self.tone.algorithm,
            night_threshold: self.tone.night_threshold,
            block_filter: self.capture.filter.then_some(self.capture.filter_block),
            standard_exposure: crate::exposure::StandardExposure::default(),
        }
    }

    pub fn preview_settings(&self) -> PreviewSettings {
        PreviewSettings {
            width: self.preview.width.max(1),
            height: self.preview.height.max(1),
            algorithm: self.preview.algorithm,
            frame_interval: Duration::from_millis(1000 / u64::from(self.preview.fps.max(1))),
            night_threshold: self.tone.night_threshold,
        }
    }

    /// Memory model described by `[camera] external_ram`.
    pub fn memory(&self) -> HostMemory {
        HostMemory::new((self.camera.external_ram > 0).then_some(self.camera.external_ram))
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            sensor: self.sensor_config(),
            prefer_rgb: self.camera.prefer_rgb,
            pipeline: self.pipeline_settings(),
            preview: self.preview_settings(),
            tune: self.tune_config(),
            auto_tune: self.exposure.enabled,
            tone_gamma: self.tone.gamma,
            night_gamma: self.tone.night_gamma,
            night_contrast: self.tone.night_contrast,
            palette: self.tone.palette.clone(),
            filter_enabled: self.capture.filter,
            filter_block: self.capture.filter_block,
            feedback: Duration::from_millis(self.capture.feedback_ms),
            hold: Duration::from_millis(self.capture.hold_ms),
            file_prefix: self.storage.prefix.clone(),
            initial_mode: self.camera.mode,
        }
    }
}

/// Errors that can occur when loading or writing configuration.
#[derive(Debug)]
pub enum ConfigError {
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    SerializeError(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError { path, source } => {
                write!(
                    f,
                    "Failed to read config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::ParseError { path, source } => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::SerializeError(source) => {
                write!(f, "Failed to serialize config: {}", source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
            ConfigError::SerializeError(source) => Some(source),
        }
    }
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("retrocam").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/retrocam/config.toml")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(Some(&dir.path().join("nope.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[tone]\nalgorithm = \"floyd-steinberg\"\n\n[camera]\nmode = \"gameboy\"\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.tone.algorithm, DitherAlgorithm::FloydSteinberg);
        assert_eq!(config.tone.night_threshold, 96);
        assert_eq!(config.camera.mode, CaptureMode::Stylized);
        assert_eq!(config.capture.feedback_ms, 1500);
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[camera\nwidth = ").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.exposure.target = 90;
        config.storage.prefix = "SHOT_".to_string();

        config.save(&path).unwrap();
        assert_eq!(Config::load(Some(&path)).unwrap(), config);
    }

    #[test]
    fn test_controller_config_conversion() {
        let mut config = Config::default();
        config.preview.fps = 10;
        config.capture.hold_ms = 800;
        let ctrl = config.controller_config();

        assert_eq!(ctrl.preview.frame_interval, Duration::from_millis(100));
        assert_eq!(ctrl.hold, Duration::from_millis(800));
        assert_eq!(ctrl.feedback, Duration::from_millis(1500));
        assert_eq!(ctrl.pipeline.max_width, 320);
        assert_eq!(ctrl.tune.sample_stride, 64);
    }

    #[test]
    fn test_block_filter_follows_capture_section() {
        let mut config = Config::default();
        assert_eq!(config.pipeline_settings().block_filter, None);

        config.capture.filter = true;
        config.capture.filter_block = 6;
        assert_eq!(config.pipeline_settings().block_filter, Some(6));
    }

    #[test]
    fn test_zero_external_ram_means_none() {
        use crate::memory::MemoryPool;
        let mut config = Config::default();
        assert!(config.memory().has_external());
        config.camera.external_ram = 0;
        assert!(!config.memory().has_external());
    }

    #[test]
    fn test_settings_path_relative_to_root() {
        let config = Config::default();
        assert_eq!(
            config.storage.settings_path(),
            PathBuf::from("captures").join("settings.toml")
        );
    }
}
