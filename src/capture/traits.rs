//! Capture trait definitions
//!
//! Platform-agnostic contracts for the camera and microphone. Platform shells
//! implement these and report asynchronous completions by sending
//! [`CaptureEvent`]s into the coordinator's channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Capture errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Device error: {0}")]
    Device(String),
}

/// Result type for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Permission state for camera or microphone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionStatus {
    NotDetermined,
    Denied,
    Granted,
}

/// Physical camera lens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CameraLens {
    /// Standard wide-angle back camera
    Standard,
    /// Ultra-wide back camera
    UltraWide,
}

impl CameraLens {
    pub fn from_ultra_wide(use_ultra_wide: bool) -> Self {
        if use_ultra_wide {
            Self::UltraWide
        } else {
            Self::Standard
        }
    }
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Inclusive frame-rate range supported by a format
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameRateRange {
    pub min_fps: f64,
    pub max_fps: f64,
}

impl FrameRateRange {
    pub fn new(min_fps: f64, max_fps: f64) -> Self {
        Self { min_fps, max_fps }
    }

    pub fn covers(&self, fps: u32) -> bool {
        let fps = f64::from(fps);
        self.min_fps <= fps && fps <= self.max_fps
    }
}

/// One capture format offered by a lens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceFormat {
    /// Opaque identifier understood by the device
    pub id: String,

    pub resolution: Resolution,

    pub frame_rate_ranges: Vec<FrameRateRange>,
}

impl DeviceFormat {
    /// Whether any range of this format covers `fps`
    pub fn supports(&self, fps: u32) -> bool {
        self.frame_rate_ranges.iter().any(|range| range.covers(fps))
    }
}

/// First format, in device order, with a range covering `fps`
pub fn first_supporting(formats: &[DeviceFormat], fps: u32) -> Option<&DeviceFormat> {
    formats.iter().find(|format| format.supports(fps))
}

/// Encoder settings for audio snippets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSettings {
    /// Container codec; always AAC in an MPEG-4 container
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            codec: "aac".to_string(),
            sample_rate: 44_100,
            channels: 1,
        }
    }
}

/// Completions delivered by the camera
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// The movie file has been flushed and closed
    MovieFinished {
        path: PathBuf,
        error: Option<String>,
    },
    /// Photo processing finished with encoded JPEG data
    PhotoProcessed { request_id: Uuid, data: Vec<u8> },
    /// Photo processing failed
    PhotoFailed { request_id: Uuid, error: String },
}

/// Camera capture graph collaborator
///
/// Mutating calls are only issued by the coordinator between
/// `begin_configuration` and `commit_configuration`, or for movie and photo
/// requests.
pub trait CaptureDevice: Send + Sync {
    fn camera_permission(&self) -> PermissionStatus;

    /// Lenses physically present on the device
    fn available_lenses(&self) -> Vec<CameraLens>;

    /// Formats offered by a lens, in device order
    fn formats(&self, lens: CameraLens) -> Vec<DeviceFormat>;

    fn begin_configuration(&self);

    fn commit_configuration(&self);

    fn add_input(&self, lens: CameraLens) -> CaptureResult<()>;

    fn remove_input(&self, lens: CameraLens);

    fn add_movie_output(&self) -> CaptureResult<()>;

    fn add_photo_output(&self) -> CaptureResult<()>;

    /// Make `format` active and pin the frame duration to `fps`
    fn set_active_format(&self, lens: CameraLens, format: &DeviceFormat, fps: u32) -> CaptureResult<()>;

    /// Revert the lens to its default format and frame rate
    fn use_default_format(&self, lens: CameraLens);

    /// Start the preview session
    fn start_running(&self);

    fn stop_running(&self);

    /// Begin encoding to `path`
    fn start_movie(&self, path: &Path) -> CaptureResult<()>;

    /// Ask the movie output to finish; completion arrives as `MovieFinished`
    fn stop_movie(&self);

    /// Request a still; completion arrives as `PhotoProcessed` or `PhotoFailed`
    fn capture_photo(&self, request_id: Uuid) -> CaptureResult<()>;
}

/// Microphone collaborator for audio snippets
#[async_trait]
pub trait MicrophoneDevice: Send + Sync {
    fn permission(&self) -> PermissionStatus;

    /// Prompt the user; resolves to whether access was granted
    async fn request_permission(&self) -> bool;

    /// Begin encoding to `path`
    fn start_encoding(&self, path: &Path, settings: &AudioSettings) -> CaptureResult<()>;

    /// Stop encoding and close the file
    fn stop_encoding(&self);
}
