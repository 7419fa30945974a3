//! Recorder configuration
//!
//! Runtime settings shared by the location, capture and storage components.
//! Every field has a default so a partial (or missing) JSON file is valid.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Settings for a recorder instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    /// Directory where videos, photos, tracks and clips are written
    pub output_dir: PathBuf,

    /// Value of the `creator` attribute in track files
    pub track_creator: String,

    /// How often the last known fix is handed to the track writer
    pub sample_interval_ms: u64,

    /// Window after which acquisition is restarted if no fix arrived
    pub fix_timeout_ms: u64,

    /// Length of an audio snippet taken alongside a photo
    pub audio_clip_secs: u32,

    /// Artifacts older than this are purged at launch
    pub retention_days: u32,

    /// Frame rate used when a caller does not ask for one
    pub default_frame_rate: u32,

    /// Storage cost of one minute of video, for the "minutes left" estimate
    pub video_mb_per_minute: f64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: std::env::temp_dir(),
            track_creator: "VideoGPSRecorder".to_string(),
            sample_interval_ms: 1000,
            fix_timeout_ms: 10_000,
            audio_clip_secs: 10,
            retention_days: 7,
            default_frame_rate: 30,
            video_mb_per_minute: 100.0,
        }
    }
}

impl RecorderConfig {
    /// Load configuration from a JSON file, falling back to defaults when it
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: RecorderConfig = serde_json::from_str(&content)?;
        config.validate()?;

        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Write configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Reject values the recorder cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "sampleIntervalMs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.fix_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "fixTimeoutMs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.video_mb_per_minute <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "videoMbPerMinute",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn fix_timeout(&self) -> Duration {
        Duration::from_millis(self.fix_timeout_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(u64::from(self.retention_days) * 24 * 60 * 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = RecorderConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, RecorderConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "sampleIntervalMs": 500, "trackCreator": "Dashcam" }"#).unwrap();

        let config = RecorderConfig::load(&path).unwrap();
        assert_eq!(config.sample_interval(), Duration::from_millis(500));
        assert_eq!(config.track_creator, "Dashcam");
        assert_eq!(config.audio_clip_secs, 10);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "sampleIntervalMs": 0 }"#).unwrap();

        assert!(matches!(
            RecorderConfig::load(&path),
            Err(ConfigError::Invalid { field: "sampleIntervalMs", .. })
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = RecorderConfig {
            retention_days: 3,
            ..RecorderConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(RecorderConfig::load(&path).unwrap(), config);
    }
}
