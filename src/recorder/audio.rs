//! Audio snippet recorder
//!
//! Records one fixed-length microphone clip at a time. A new request while a
//! clip is running stops the running clip and starts a fresh one.

use crate::capture::{AudioSettings, MicrophoneDevice, PermissionStatus};
use crate::utils::files::{artifact_filename, ArtifactKind};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

struct ActiveClip {
    generation: u64,
    path: PathBuf,
    countdown: JoinHandle<()>,
}

struct Shared {
    microphone: Arc<dyn MicrophoneDevice>,
    remaining: AtomicU32,
    active: Mutex<Option<ActiveClip>>,
}

impl Shared {
    /// Stop the clip identified by `generation` if it is still the active one
    fn finish(&self, generation: u64) {
        let mut active = self.active.lock();
        if active.as_ref().map(|clip| clip.generation) != Some(generation) {
            return;
        }
        if let Some(clip) = active.take() {
            self.microphone.stop_encoding();
            self.remaining.store(0, Ordering::SeqCst);
            tracing::info!("Audio snippet saved: {:?}", clip.path);
        }
    }
}

/// Fixed-duration microphone clips with a one-second countdown
pub struct AudioSnippetRecorder {
    shared: Arc<Shared>,
    output_dir: PathBuf,
    settings: AudioSettings,
    generation: AtomicU64,
}

impl AudioSnippetRecorder {
    pub fn new(microphone: Arc<dyn MicrophoneDevice>, output_dir: PathBuf) -> Self {
        Self {
            shared: Arc::new(Shared {
                microphone,
                remaining: AtomicU32::new(0),
                active: Mutex::new(None),
            }),
            output_dir,
            settings: AudioSettings::default(),
            generation: AtomicU64::new(0),
        }
    }

    /// Seconds left on the running clip, 0 when idle
    pub fn countdown(&self) -> u32 {
        self.shared.remaining.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.lock().is_some()
    }

    /// File the running clip is written to
    pub fn current_path(&self) -> Option<PathBuf> {
        self.shared.active.lock().as_ref().map(|clip| clip.path.clone())
    }

    /// Record a clip of `duration_secs`.
    ///
    /// Returns the clip path once encoding has started, or `None` when the
    /// microphone is unavailable. The clip is closed by the countdown task.
    pub async fn record(&self, duration_secs: u32) -> Option<PathBuf> {
        if duration_secs == 0 {
            tracing::warn!("Ignoring audio snippet request of zero seconds");
            return None;
        }

        if !self.ensure_permission().await {
            return None;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let path = self
            .output_dir
            .join(artifact_filename(ArtifactKind::Audio, chrono::Local::now().fixed_offset()));

        let mut active = self.shared.active.lock();
        if let Some(previous) = active.take() {
            tracing::info!("Replacing running audio snippet {:?}", previous.path);
            previous.countdown.abort();
            self.shared.microphone.stop_encoding();
        }

        if let Err(e) = std::fs::create_dir_all(&self.output_dir) {
            tracing::warn!("Cannot create audio directory {:?}: {}", self.output_dir, e);
            self.shared.remaining.store(0, Ordering::SeqCst);
            return None;
        }
        if let Err(e) = self.shared.microphone.start_encoding(&path, &self.settings) {
            tracing::warn!("Failed to start audio snippet: {}", e);
            self.shared.remaining.store(0, Ordering::SeqCst);
            return None;
        }

        self.shared.remaining.store(duration_secs, Ordering::SeqCst);
        let countdown = self.spawn_countdown(generation, duration_secs);
        *active = Some(ActiveClip {
            generation,
            path: path.clone(),
            countdown,
        });

        tracing::info!("Recording {}s audio snippet to {:?}", duration_secs, path);
        Some(path)
    }

    async fn ensure_permission(&self) -> bool {
        match self.shared.microphone.permission() {
            PermissionStatus::Granted => true,
            PermissionStatus::Denied => {
                tracing::warn!("Microphone permission denied, skipping audio snippet");
                false
            }
            PermissionStatus::NotDetermined => {
                let granted = self.shared.microphone.request_permission().await;
                if !granted {
                    tracing::warn!("Microphone permission not granted, skipping audio snippet");
                }
                granted
            }
        }
    }

    fn spawn_countdown(&self, generation: u64, duration_secs: u32) -> JoinHandle<()> {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            for remaining in (0..duration_secs).rev() {
                tokio::time::sleep(Duration::from_secs(1)).await;
                shared.remaining.store(remaining, Ordering::SeqCst);
            }
            shared.finish(generation);
        })
    }
}

impl Drop for AudioSnippetRecorder {
    fn drop(&mut self) {
        if let Some(clip) = self.shared.active.lock().take() {
            clip.countdown.abort();
            self.shared.microphone.stop_encoding();
        }
    }
}
