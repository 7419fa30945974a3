//! Recording-related commands
//!
//! The action layer a mobile shell calls into. Start and stop fan out to the
//! capture coordinator and the location session together; every command
//! returns immediately and reports failures through [`RecorderStatus`].

use super::system::{get_storage_info, StorageInfo};
use crate::capture::{CaptureDevice, CaptureEvent, MicrophoneDevice};
use crate::config::RecorderConfig;
use crate::location::{LocationEvent, LocationProvider, LocationSession, LocationStatus, TrackSummary};
use crate::recorder::{CaptureCoordinator, CaptureGraph, CaptureState, RecorderEvent, SwitchOutcome};
use crate::utils::error::{AppError, ErrorResponse};
use crate::utils::files::{delete_artifact, list_artifacts, purge_older_than, MediaArtifact};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

/// Application state for recording
pub struct RecorderState {
    config: RecorderConfig,
    pub coordinator: Arc<CaptureCoordinator>,
    pub location: Arc<LocationSession>,
}

/// Everything the UI shows about the recorder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderStatus {
    pub state: CaptureState,
    /// `HH:MM:SS` while recording
    pub elapsed: Option<String>,
    pub graph: CaptureGraph,
    pub location: LocationStatus,
    /// Seconds left on the running audio snippet
    pub mic_countdown: u32,
    pub last_error: Option<ErrorResponse>,
    pub storage: StorageInfo,
}

impl RecorderState {
    /// Wire the collaborators together, purge expired media and configure the
    /// capture session.
    pub async fn launch(
        config: RecorderConfig,
        device: Arc<dyn CaptureDevice>,
        microphone: Arc<dyn MicrophoneDevice>,
        provider: Arc<dyn LocationProvider>,
    ) -> anyhow::Result<Self> {
        tracing::info!("Starting video GPS recorder v{}", env!("CARGO_PKG_VERSION"));

        config.validate().context("Invalid recorder configuration")?;

        std::fs::create_dir_all(&config.output_dir)
            .with_context(|| format!("Failed to create storage dir {:?}", config.output_dir))?;

        let dir = config.output_dir.clone();
        let retention = config.retention();
        let purged = tokio::task::spawn_blocking(move || {
            purge_older_than(&dir, retention, SystemTime::now())
        })
        .await
        .context("Purge task panicked")?;
        match purged {
            Ok(count) => tracing::debug!("Retention purge removed {} files", count),
            Err(e) => tracing::warn!("Retention purge failed: {}", e),
        }

        let location = Arc::new(LocationSession::new(provider, &config));
        let coordinator = Arc::new(CaptureCoordinator::new(
            device,
            microphone,
            location.last_known_fix(),
            &config,
        ));
        coordinator.setup_session().await;

        Ok(Self {
            config,
            coordinator,
            location,
        })
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Channel for the platform location callbacks
    pub fn location_events(&self) -> mpsc::UnboundedSender<LocationEvent> {
        self.location.event_sender()
    }

    /// Channel for the platform camera callbacks
    pub fn capture_events(&self) -> mpsc::UnboundedSender<CaptureEvent> {
        self.coordinator.event_sender()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.coordinator.subscribe()
    }
}

/// Start recording video and logging the GPS track together.
///
/// `frame_rate` defaults to the configured rate.
pub async fn start_recording(state: &RecorderState, frame_rate: Option<u32>) {
    let fps = frame_rate.unwrap_or(state.config.default_frame_rate);
    tokio::join!(
        state.coordinator.start_recording(fps),
        state.location.start_logging()
    );
}

/// Stop recording and finalize the track.
///
/// Returns once the track footer is written; the movie finalizes
/// asynchronously.
pub async fn stop_recording(state: &RecorderState) -> Option<TrackSummary> {
    let (_, track) = tokio::join!(
        state.coordinator.stop_recording(),
        state.location.stop_logging()
    );
    track
}

/// Take a photo, optionally with an audio snippet
pub async fn capture_photo(state: &RecorderState, with_audio: bool) -> Option<Uuid> {
    state.coordinator.capture_photo(with_audio)
}

/// Switch between the standard and ultra-wide lens
pub async fn switch_camera(state: &RecorderState, use_ultra_wide: bool) -> SwitchOutcome {
    state.coordinator.switch_camera(use_ultra_wide).await
}

/// Record an audio snippet of the configured length without a photo
pub async fn record_audio_snippet(state: &RecorderState) -> Option<PathBuf> {
    state
        .coordinator
        .audio()
        .record(state.config.audio_clip_secs)
        .await
}

/// Get the current recorder status
pub async fn get_recorder_status(state: &RecorderState) -> RecorderStatus {
    RecorderStatus {
        state: state.coordinator.state(),
        elapsed: state.coordinator.elapsed(),
        graph: state.coordinator.graph().await,
        location: state.location.status(),
        mic_countdown: state.coordinator.audio().countdown(),
        last_error: state.coordinator.last_error(),
        storage: get_storage_info(state).await,
    }
}

/// List media in the storage area, newest first
pub async fn list_media(state: &RecorderState) -> Result<Vec<MediaArtifact>, ErrorResponse> {
    let dir = state.config.output_dir.clone();
    tokio::task::spawn_blocking(move || list_artifacts(&dir))
        .await
        .map_err(|e| ErrorResponse::from(AppError::Io(std::io::Error::other(e))))?
        .map_err(|e| AppError::Io(e).into())
}

/// Delete one artifact from the storage area
pub async fn delete_media(state: &RecorderState, path: &Path) -> Result<(), ErrorResponse> {
    if path.parent() != Some(state.config.output_dir.as_path()) {
        return Err(AppError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} is outside the storage area", path.display()),
        ))
        .into());
    }

    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || delete_artifact(&path))
        .await
        .map_err(|e| ErrorResponse::from(AppError::Io(std::io::Error::other(e))))?
        .map_err(|e| AppError::Io(e).into())
}
