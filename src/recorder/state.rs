//! Recording state management
//!
//! Defines the capture state machine, the capture graph snapshot and the
//! active recording session.

use crate::capture::CameraLens;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Current state of the capture coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    /// No movie is being encoded
    #[default]
    Idle,
    /// Movie output is writing to a file
    Recording,
}

/// Live configuration of the camera pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureGraph {
    /// Lens currently attached as video input
    pub lens: Option<CameraLens>,

    /// Frame rate the active format is pinned to
    pub frame_rate: u32,

    /// Identifier of the active format, `None` for the device default
    pub active_format: Option<String>,

    pub has_movie_output: bool,
    pub has_photo_output: bool,
}

impl Default for CaptureGraph {
    fn default() -> Self {
        Self {
            lens: None,
            frame_rate: 30,
            active_format: None,
            has_movie_output: false,
            has_photo_output: false,
        }
    }
}

/// Information about the movie currently being recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSession {
    pub started_at: DateTime<Utc>,

    /// Movie file being written
    pub output_path: PathBuf,

    /// Frame rate requested at start
    pub frame_rate: u32,
}

impl RecordingSession {
    /// Create a session starting now
    pub fn new(output_path: PathBuf, frame_rate: u32) -> Self {
        Self {
            started_at: Utc::now(),
            output_path,
            frame_rate,
        }
    }

    /// Whole seconds since the session started
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        (now - self.started_at).num_seconds().max(0) as u64
    }
}

/// Result of a lens switch request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "outcome", content = "detail")]
pub enum SwitchOutcome {
    /// New lens attached
    Switched,
    /// Requested lens was already active
    Unchanged,
    /// Lens switching is not allowed while a movie is encoding
    RejectedWhileRecording,
    /// Requested lens is not present on this device
    LensUnavailable,
    /// Reconfiguration failed; previous input restored
    Failed(String),
}

impl SwitchOutcome {
    /// Whether the graph now uses the requested lens
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Switched | Self::Unchanged)
    }
}

/// Format an elapsed duration as `HH:MM:SS`
pub fn format_elapsed(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}
