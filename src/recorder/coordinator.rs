//! Capture coordinator
//!
//! Owns the camera capture graph and the Idle/Recording state machine.
//! Graph mutations (session setup, frame-rate changes, lens switches, movie
//! start/stop) are serialized behind one async lock. Completions from the
//! camera arrive as [`CaptureEvent`]s on a channel and are handled by the
//! coordinator's event loop.

use super::audio::AudioSnippetRecorder;
use super::state::{format_elapsed, CaptureGraph, CaptureState, RecordingSession, SwitchOutcome};
use crate::capture::{
    first_supporting, CameraLens, CaptureDevice, CaptureError, CaptureEvent, MicrophoneDevice,
    PermissionStatus,
};
use crate::config::RecorderConfig;
use crate::location::{LastKnownFix, LocationFix};
use crate::media::persist_photo;
use crate::utils::error::{AppError, ErrorResponse};
use crate::utils::files::{artifact_filename, ArtifactKind};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Frame rate negotiated on session setup and after a lens switch
pub const HIGH_FRAME_RATE: u32 = 60;

/// Events emitted by the coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderEvent {
    /// Movie output started writing
    RecordingStarted { path: PathBuf },
    /// Stop requested; the file is still being finalized
    RecordingStopped { path: PathBuf },
    /// Movie file flushed and closed
    RecordingFinished { path: PathBuf, error: Option<String> },
    /// Photo written to its final name
    PhotoSaved { path: PathBuf, geotagged: bool },
    PhotoFailed { error: String },
    LensSwitched(CameraLens),
    /// A failure recorded for the status surface
    Error(ErrorResponse),
}

struct Shared {
    device: Arc<dyn CaptureDevice>,
    state: RwLock<CaptureState>,
    session: RwLock<Option<RecordingSession>>,
    /// Location snapshot taken at shutter time, keyed by photo request
    pending_photos: Mutex<HashMap<Uuid, Option<LocationFix>>>,
    last_error: RwLock<Option<ErrorResponse>>,
    events: broadcast::Sender<RecorderEvent>,
    output_dir: PathBuf,
}

impl Shared {
    fn record_error(&self, error: AppError) {
        tracing::warn!("Capture failure: {}", error);
        let response = ErrorResponse::from(error);
        *self.last_error.write() = Some(response.clone());
        let _ = self.events.send(RecorderEvent::Error(response));
    }

    fn handle_event(self: &Arc<Self>, event: CaptureEvent) {
        match event {
            CaptureEvent::MovieFinished { path, error } => {
                match &error {
                    Some(message) => {
                        self.record_error(CaptureError::Device(message.clone()).into());
                    }
                    None => tracing::info!("Movie finalized: {:?}", path),
                }
                let _ = self.events.send(RecorderEvent::RecordingFinished { path, error });
            }
            CaptureEvent::PhotoProcessed { request_id, data } => {
                let snapshot = self.pending_photos.lock().remove(&request_id);
                if snapshot.is_none() {
                    tracing::warn!("Photo {} was not requested by this session", request_id);
                }
                self.spawn_persist(data, snapshot.flatten());
            }
            CaptureEvent::PhotoFailed { request_id, error } => {
                self.pending_photos.lock().remove(&request_id);
                self.record_error(CaptureError::Device(error.clone()).into());
                let _ = self.events.send(RecorderEvent::PhotoFailed { error });
            }
        }
    }

    fn spawn_persist(self: &Arc<Self>, data: Vec<u8>, snapshot: Option<LocationFix>) {
        let shared = self.clone();
        tokio::spawn(async move {
            let dir = shared.output_dir.clone();
            let result = tokio::task::spawn_blocking(move || {
                persist_photo(data, snapshot.as_ref(), &dir, chrono::Local::now().fixed_offset())
            })
            .await;

            match result {
                Ok(Ok(path)) => {
                    let _ = shared.events.send(RecorderEvent::PhotoSaved {
                        path,
                        geotagged: snapshot.is_some(),
                    });
                }
                Ok(Err(e)) => {
                    let error = e.to_string();
                    shared.record_error(e.into());
                    let _ = shared.events.send(RecorderEvent::PhotoFailed { error });
                }
                Err(e) => {
                    tracing::error!("Photo writer task failed: {}", e);
                    let _ = shared.events.send(RecorderEvent::PhotoFailed {
                        error: e.to_string(),
                    });
                }
            }
        });
    }
}

/// Coordinates the camera graph, movie recording and photo capture
pub struct CaptureCoordinator {
    shared: Arc<Shared>,
    graph: tokio::sync::Mutex<CaptureGraph>,
    last_fix: LastKnownFix,
    audio: Arc<AudioSnippetRecorder>,
    audio_clip_secs: u32,
    default_frame_rate: u32,
    event_tx: mpsc::UnboundedSender<CaptureEvent>,
    event_loop: JoinHandle<()>,
}

impl CaptureCoordinator {
    /// Create a coordinator and spawn its event loop on the current runtime
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        microphone: Arc<dyn MicrophoneDevice>,
        last_fix: LastKnownFix,
        config: &RecorderConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(100);
        let shared = Arc::new(Shared {
            device,
            state: RwLock::new(CaptureState::Idle),
            session: RwLock::new(None),
            pending_photos: Mutex::new(HashMap::new()),
            last_error: RwLock::new(None),
            events,
            output_dir: config.output_dir.clone(),
        });

        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<CaptureEvent>();
        let loop_shared = shared.clone();
        let event_loop = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                loop_shared.handle_event(event);
            }
            tracing::debug!("Capture event loop finished");
        });

        Self {
            shared,
            graph: tokio::sync::Mutex::new(CaptureGraph {
                frame_rate: config.default_frame_rate,
                ..CaptureGraph::default()
            }),
            last_fix,
            audio: Arc::new(AudioSnippetRecorder::new(
                microphone,
                config.output_dir.clone(),
            )),
            audio_clip_secs: config.audio_clip_secs,
            default_frame_rate: config.default_frame_rate,
            event_tx,
            event_loop,
        }
    }

    /// Channel the camera delivers completions into
    pub fn event_sender(&self) -> mpsc::UnboundedSender<CaptureEvent> {
        self.event_tx.clone()
    }

    /// Subscribe to coordinator events
    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.shared.events.subscribe()
    }

    pub fn state(&self) -> CaptureState {
        *self.shared.state.read()
    }

    pub fn is_recording(&self) -> bool {
        self.state() == CaptureState::Recording
    }

    /// Snapshot of the capture graph
    pub async fn graph(&self) -> CaptureGraph {
        self.graph.lock().await.clone()
    }

    /// The movie being recorded, if any
    pub fn session(&self) -> Option<RecordingSession> {
        self.shared.session.read().clone()
    }

    /// Recording time as `HH:MM:SS`, `None` while idle
    pub fn elapsed(&self) -> Option<String> {
        self.shared
            .session
            .read()
            .as_ref()
            .map(|session| format_elapsed(session.elapsed_secs(chrono::Utc::now())))
    }

    pub fn last_error(&self) -> Option<ErrorResponse> {
        self.shared.last_error.read().clone()
    }

    pub fn audio(&self) -> &AudioSnippetRecorder {
        &self.audio
    }

    /// Attach the photo output, the standard lens and the movie output, then
    /// start the preview. Failures leave the graph partially built and are
    /// reported through [`Self::last_error`].
    pub async fn setup_session(&self) {
        let mut graph = self.graph.lock().await;
        if graph.lens.is_some() {
            tracing::debug!("setup_session ignored: session already configured");
            return;
        }

        let device = &self.shared.device;
        if device.camera_permission() == PermissionStatus::Denied {
            self.shared
                .record_error(AppError::PermissionDenied("camera".to_string()));
            return;
        }

        device.begin_configuration();

        match device.add_photo_output() {
            Ok(()) => graph.has_photo_output = true,
            Err(e) => self.shared.record_error(e.into()),
        }

        if !device.available_lenses().contains(&CameraLens::Standard) {
            device.commit_configuration();
            self.shared
                .record_error(AppError::HardwareUnavailable("no video device".to_string()));
            return;
        }
        if let Err(e) = device.add_input(CameraLens::Standard) {
            device.commit_configuration();
            self.shared.record_error(e.into());
            return;
        }
        graph.lens = Some(CameraLens::Standard);
        self.apply_frame_rate(&mut graph, CameraLens::Standard, HIGH_FRAME_RATE);

        match device.add_movie_output() {
            Ok(()) => graph.has_movie_output = true,
            Err(e) => self.shared.record_error(e.into()),
        }

        device.commit_configuration();
        device.start_running();
        tracing::info!("Capture session configured: {:?}", *graph);
    }

    /// Begin recording a movie at `frame_rate`. No-op while recording.
    ///
    /// A frame rate no format supports falls back to the default format.
    pub async fn start_recording(&self, frame_rate: u32) {
        let mut graph = self.graph.lock().await;
        if self.is_recording() {
            tracing::debug!("start_recording ignored: already recording");
            return;
        }

        let Some(lens) = graph.lens else {
            self.shared
                .record_error(AppError::HardwareUnavailable("no video input".to_string()));
            return;
        };
        if !graph.has_movie_output {
            self.shared.record_error(
                CaptureError::ConfigurationError("movie output not attached".to_string()).into(),
            );
            return;
        }

        let device = &self.shared.device;
        device.begin_configuration();
        self.apply_frame_rate(&mut graph, lens, frame_rate);
        device.commit_configuration();

        if let Err(e) = std::fs::create_dir_all(&self.shared.output_dir) {
            self.shared.record_error(e.into());
            return;
        }
        let path = self.shared.output_dir.join(artifact_filename(
            ArtifactKind::Video,
            chrono::Local::now().fixed_offset(),
        ));

        if let Err(e) = device.start_movie(&path) {
            self.shared.record_error(e.into());
            return;
        }

        *self.shared.session.write() = Some(RecordingSession::new(path.clone(), graph.frame_rate));
        *self.shared.state.write() = CaptureState::Recording;
        let _ = self
            .shared
            .events
            .send(RecorderEvent::RecordingStarted { path: path.clone() });

        tracing::info!("Recording started at {} fps: {:?}", graph.frame_rate, path);
    }

    /// Ask the movie output to finish. No-op while idle.
    ///
    /// Returns before the file is finalized; `RecordingFinished` follows.
    pub async fn stop_recording(&self) {
        let _graph = self.graph.lock().await;
        if !self.is_recording() {
            tracing::debug!("stop_recording ignored: not recording");
            return;
        }

        self.shared.device.stop_movie();
        *self.shared.state.write() = CaptureState::Idle;
        let session = self.shared.session.write().take();

        if let Some(session) = session {
            tracing::info!(
                "Recording stopped after {}: {:?}",
                format_elapsed(session.elapsed_secs(chrono::Utc::now())),
                session.output_path
            );
            let _ = self.shared.events.send(RecorderEvent::RecordingStopped {
                path: session.output_path,
            });
        }
    }

    /// Swap the video input to the standard or ultra-wide lens.
    ///
    /// Rejected while recording. An absent lens leaves the graph unchanged.
    pub async fn switch_camera(&self, use_ultra_wide: bool) -> SwitchOutcome {
        let mut graph = self.graph.lock().await;
        let lens = CameraLens::from_ultra_wide(use_ultra_wide);

        if self.is_recording() {
            tracing::warn!("Lens switch to {:?} rejected while recording", lens);
            return SwitchOutcome::RejectedWhileRecording;
        }
        if graph.lens == Some(lens) {
            return SwitchOutcome::Unchanged;
        }

        let device = &self.shared.device;
        if !device.available_lenses().contains(&lens) {
            self.shared
                .record_error(AppError::HardwareUnavailable(format!("{:?} lens", lens)));
            return SwitchOutcome::LensUnavailable;
        }

        let previous = graph.lens;
        device.begin_configuration();
        if let Some(current) = previous {
            device.remove_input(current);
        }

        if let Err(e) = device.add_input(lens) {
            if let Some(current) = previous {
                if let Err(restore) = device.add_input(current) {
                    tracing::error!("Failed to restore {:?} input: {}", current, restore);
                    graph.lens = None;
                }
            }
            device.commit_configuration();
            let message = e.to_string();
            self.shared.record_error(e.into());
            return SwitchOutcome::Failed(message);
        }

        graph.lens = Some(lens);
        self.apply_frame_rate(&mut graph, lens, HIGH_FRAME_RATE);
        device.commit_configuration();

        let _ = self.shared.events.send(RecorderEvent::LensSwitched(lens));
        tracing::info!("Switched to {:?} lens", lens);
        SwitchOutcome::Switched
    }

    /// Request a still photo, optionally with an audio snippet.
    ///
    /// The last known fix is captured before the request is issued. Returns
    /// the request id, or `None` if the camera refused the request.
    pub fn capture_photo(&self, with_audio: bool) -> Option<Uuid> {
        let snapshot = self.last_fix.get();
        let request_id = Uuid::new_v4();
        self.shared
            .pending_photos
            .lock()
            .insert(request_id, snapshot);

        if with_audio {
            let audio = self.audio.clone();
            let secs = self.audio_clip_secs;
            tokio::spawn(async move {
                audio.record(secs).await;
            });
        }

        match self.shared.device.capture_photo(request_id) {
            Ok(()) => {
                tracing::debug!(
                    "Photo {} requested ({})",
                    request_id,
                    if snapshot.is_some() { "with location" } else { "no location" }
                );
                Some(request_id)
            }
            Err(e) => {
                self.shared.pending_photos.lock().remove(&request_id);
                self.shared.record_error(e.into());
                None
            }
        }
    }

    /// Make the first format supporting `fps` active, or revert to the
    /// lens default. Caller holds the graph lock inside a configuration
    /// block.
    fn apply_frame_rate(&self, graph: &mut CaptureGraph, lens: CameraLens, fps: u32) -> bool {
        let device = &self.shared.device;
        let formats = device.formats(lens);

        if let Some(format) = first_supporting(&formats, fps) {
            match device.set_active_format(lens, format, fps) {
                Ok(()) => {
                    tracing::debug!("Active format {} at {} fps on {:?}", format.id, fps, lens);
                    graph.active_format = Some(format.id.clone());
                    graph.frame_rate = fps;
                    return true;
                }
                Err(e) => tracing::warn!("Failed to activate format {}: {}", format.id, e),
            }
        } else {
            tracing::warn!("No format on {:?} supports {} fps, using default format", lens, fps);
        }

        device.use_default_format(lens);
        graph.active_format = None;
        graph.frame_rate = self.default_frame_rate;
        false
    }
}

impl Drop for CaptureCoordinator {
    fn drop(&mut self) {
        self.event_loop.abort();
    }
}
