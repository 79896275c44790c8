//! Configuration file handling for rollcam.
//!
//! Loads configuration from `<config dir>/rollcam/config.toml` or a custom
//! path. Every field has a default, so a partial file (or no file) works.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::camera::Resolution;
use crate::recording::Backend;

pub const CONFIG_FILE: &str = "config.toml";

/// Configuration file structure for rollcam.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub roster: RosterConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub deck: DeckConfig,
    #[serde(default)]
    pub headshot: HeadshotConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RosterConfig {
    /// Roster workbook.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Sheet index or name the capture session starts with.
    #[serde(default)]
    pub sheet: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: Resolution::FULL_HD.width,
            height: Resolution::FULL_HD.height,
            fps: 30,
        }
    }
}

impl CameraConfig {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub backend: Backend,
    pub output_dir: PathBuf,
    /// Encoded size for the pipeline backend.
    pub width: u32,
    pub height: u32,
    /// Microphone gain 0-100 (direct backend).
    pub volume: u8,
    /// Empty for the platform default.
    pub audio_device: String,
    pub rotate: bool,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Pipeline,
            output_dir: PathBuf::from("."),
            width: Resolution::FULL_HD.width,
            height: Resolution::FULL_HD.height,
            volume: 50,
            audio_device: String::new(),
            rotate: false,
        }
    }
}

impl RecordingConfig {
    pub fn output_size(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeckConfig {
    pub photo_dir: PathBuf,
    pub headshot_dir: PathBuf,
    pub output_dir: PathBuf,
    pub cols: u32,
    pub rows: u32,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            photo_dir: PathBuf::from("."),
            headshot_dir: PathBuf::from(crate::headshot::DEFAULT_OUTPUT_DIR),
            output_dir: PathBuf::from("ppt_output"),
            cols: 6,
            rows: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadshotConfig {
    /// YuNet ONNX model.
    pub model: PathBuf,
    pub input_dir: PathBuf,
    pub pattern: String,
    pub output_dir: PathBuf,
    pub scale: f32,
    pub threshold: f32,
}

impl Default for HeadshotConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::from("face_detection_yunet_2023mar.onnx"),
            input_dir: PathBuf::from("."),
            pattern: crate::headshot::DEFAULT_PATTERN.to_string(),
            output_dir: PathBuf::from(crate::headshot::DEFAULT_OUTPUT_DIR),
            scale: crate::headshot::DEFAULT_SCALE,
            threshold: crate::headshot::yunet::SCORE_THRESHOLD,
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
            log::debug!("Loaded config from {}", path.display());
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::SerializeError)
    }

    /// Write this config to `path`, creating parent directories.
    ///
    /// Refuses to overwrite an existing file unless `force` is set.
    pub fn save(&self, path: &Path, force: bool) -> Result<(), ConfigError> {
        if path.exists() && !force {
            return Err(ConfigError::AlreadyExists(path.to_path_buf()));
        }
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
}

/// Errors that can occur when loading or writing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", path.display())]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{}': {source}", path.display())]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[source] toml::ser::Error),
    #[error("Config file '{}' already exists (use --force to overwrite)", .0.display())]
    AlreadyExists(PathBuf),
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("rollcam").join(CONFIG_FILE))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/rollcam").join(CONFIG_FILE)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/rollcam.toml"))).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.camera.fps, 30);
        assert_eq!(config.recording.volume, 50);
        assert_eq!(config.headshot.output_dir, PathBuf::from("cuted"));
        assert_eq!((config.deck.cols, config.deck.rows), (6, 4));
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[roster]
path = "students.xlsx"
sheet = "Class3"

[recording]
backend = "direct"
volume = 80
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.roster.path, Some(PathBuf::from("students.xlsx")));
        assert_eq!(config.roster.sheet.as_deref(), Some("Class3"));
        assert_eq!(config.recording.backend, Backend::Direct);
        assert_eq!(config.recording.volume, 80);
        assert_eq!(config.recording.output_size(), Resolution::FULL_HD);
        assert_eq!(config.camera, CameraConfig::default());
    }

    #[test]
    fn test_invalid_toml_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[camera\nindex = ").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_unknown_backend_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[recording]\nbackend = \"tk\"\n").unwrap();
        assert!(matches!(Config::load(Some(&path)), Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn test_save_then_load_and_no_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.camera.index = 2;
        config.deck.cols = 5;
        config.save(&path, false).unwrap();

        assert_eq!(Config::load(Some(&path)).unwrap(), config);
        assert!(matches!(
            Config::default().save(&path, false),
            Err(ConfigError::AlreadyExists(_))
        ));
        Config::default().save(&path, true).unwrap();
        assert_eq!(Config::load(Some(&path)).unwrap(), Config::default());
    }

    #[test]
    fn test_default_path_ends_with_rollcam() {
        assert!(default_path().ends_with("rollcam/config.toml"));
    }
}
