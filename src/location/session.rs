//! Location session
//!
//! Wraps the platform location provider. Fix delivery, periodic sampling and
//! track I/O each run on their own execution context:
//!
//! - the event loop task consumes [`LocationEvent`]s and owns every update to
//!   the last known fix and the distance total
//! - the sampler task hands the newest fix to the track writer once per
//!   sampling interval
//! - the track writer thread does all file I/O
//! - the watchdog task restarts acquisition while no fix has arrived

use super::fix::LocationFix;
use super::provider::{AuthorizationStatus, LocationEvent, LocationProvider};
use super::track_writer::{TrackAppender, TrackSummary, TrackWriter};
use crate::config::RecorderConfig;
use crate::utils::files::{artifact_filename, ArtifactKind};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Shared, lock-guarded "last known fix".
///
/// Readers always get a whole copy; stale reads are possible, torn ones are
/// not.
#[derive(Debug, Clone, Default)]
pub struct LastKnownFix(Arc<RwLock<Option<LocationFix>>>);

impl LastKnownFix {
    /// Copy of the most recent valid fix, if any
    pub fn get(&self) -> Option<LocationFix> {
        *self.0.read()
    }

    fn set(&self, fix: LocationFix) {
        *self.0.write() = Some(fix);
    }
}

/// Snapshot of the session for the status surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationStatus {
    pub authorization: AuthorizationStatus,
    pub logging: bool,
    /// False means the UI shows "no signal"
    pub has_signal: bool,
    pub last_fix: Option<LocationFix>,
    /// Meters traveled in the current (or last) logging session
    pub distance_m: f64,
    /// Acquisition restarts issued by the watchdog in this session
    pub acquisition_restarts: u32,
    pub track_path: Option<PathBuf>,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct Tracking {
    /// Previous valid fix while logging, for distance accumulation
    previous: Option<LocationFix>,
    distance_m: f64,
    /// Incremented for every valid fix
    sequence: u64,
    /// Sequence number of the last fix handed to the track writer
    last_appended: u64,
    fix_since_start: bool,
    /// When the newest valid fix arrived; cleared by a "no fix" report
    last_valid_at: Option<Instant>,
}

struct Shared {
    provider: Arc<dyn LocationProvider>,
    last_fix: LastKnownFix,
    tracking: Mutex<Tracking>,
    authorization: RwLock<AuthorizationStatus>,
    logging: AtomicBool,
    acquisition_wanted: AtomicBool,
    updates_running: AtomicBool,
    restarts: AtomicU32,
    last_error: RwLock<Option<String>>,
    /// A fix older than this no longer counts as signal
    signal_window: Duration,
}

impl Shared {
    fn handle_event(&self, event: LocationEvent) {
        match event {
            LocationEvent::Fixes(fixes) => {
                for fix in fixes {
                    self.handle_fix(fix);
                }
            }
            LocationEvent::AuthorizationChanged(status) => self.handle_authorization(status),
            LocationEvent::Failed(message) => {
                tracing::warn!("Location provider error: {}", message);
                *self.last_error.write() = Some(message);
            }
        }
    }

    fn handle_fix(&self, fix: LocationFix) {
        if !fix.is_valid() {
            tracing::debug!(
                "Discarding invalid fix (accuracy {})",
                fix.horizontal_accuracy
            );
            self.tracking.lock().last_valid_at = None;
            return;
        }

        {
            let mut tracking = self.tracking.lock();
            if self.logging.load(Ordering::SeqCst) {
                if let Some(previous) = tracking.previous {
                    tracking.distance_m += previous.distance_to(&fix);
                }
                tracking.previous = Some(fix);
                tracking.fix_since_start = true;
            }
            tracking.sequence += 1;
            tracking.last_valid_at = Some(Instant::now());
            self.last_fix.set(fix);
        }
    }

    fn handle_authorization(&self, status: AuthorizationStatus) {
        *self.authorization.write() = status;
        tracing::info!("Location authorization changed: {:?}", status);

        if status.is_blocked() {
            tracing::warn!("Location permission denied");
            *self.last_error.write() = Some("Location permission denied".to_string());
            return;
        }

        if self.acquisition_wanted.load(Ordering::SeqCst) {
            self.start_acquisition();
        }
    }

    /// Start updates if permitted; otherwise ask, or record the denial
    fn start_acquisition(&self) {
        let status = self.provider.authorization_status();
        *self.authorization.write() = status;

        if status.is_authorized() {
            if !self.updates_running.swap(true, Ordering::SeqCst) {
                tracing::info!("Starting location updates");
                self.provider.start_updates();
            }
        } else if status.is_blocked() {
            tracing::warn!("Location updates blocked: {:?}", status);
            *self.last_error.write() = Some("Location permission denied".to_string());
        } else {
            tracing::info!("Requesting location authorization");
            self.provider.request_authorization();
        }
    }

    /// Whether a valid fix arrived within the signal window
    fn has_signal(&self) -> bool {
        self.tracking
            .lock()
            .last_valid_at
            .is_some_and(|at| at.elapsed() < self.signal_window)
    }

    fn stop_acquisition(&self) {
        self.acquisition_wanted.store(false, Ordering::SeqCst);
        if self.updates_running.swap(false, Ordering::SeqCst) {
            self.provider.stop_updates();
        }
    }

    /// Newest fix not yet written, if any
    fn take_unwritten_fix(&self) -> Option<LocationFix> {
        let mut tracking = self.tracking.lock();
        if tracking.sequence <= tracking.last_appended {
            return None;
        }
        let fix = self.last_fix.get()?;
        tracking.last_appended = tracking.sequence;
        Some(fix)
    }
}

struct ActiveLog {
    writer: TrackWriter,
    sampler: JoinHandle<()>,
    watchdog: JoinHandle<()>,
}

/// Continuous location acquisition plus track logging
pub struct LocationSession {
    shared: Arc<Shared>,
    event_tx: mpsc::UnboundedSender<LocationEvent>,
    event_loop: JoinHandle<()>,
    active: tokio::sync::Mutex<Option<ActiveLog>>,
    track_path: RwLock<Option<PathBuf>>,
    output_dir: PathBuf,
    creator: String,
    sample_interval: Duration,
    fix_timeout: Duration,
}

impl LocationSession {
    /// Create a session and spawn its event loop on the current runtime
    ///
    /// Zero intervals in `config` are raised to one millisecond.
    pub fn new(provider: Arc<dyn LocationProvider>, config: &RecorderConfig) -> Self {
        let sample_interval = config.sample_interval().max(MIN_INTERVAL);
        let fix_timeout = config.fix_timeout().max(MIN_INTERVAL);
        let shared = Arc::new(Shared {
            authorization: RwLock::new(provider.authorization_status()),
            provider,
            last_fix: LastKnownFix::default(),
            tracking: Mutex::new(Tracking::default()),
            logging: AtomicBool::new(false),
            acquisition_wanted: AtomicBool::new(false),
            updates_running: AtomicBool::new(false),
            restarts: AtomicU32::new(0),
            last_error: RwLock::new(None),
            signal_window: fix_timeout,
        });

        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<LocationEvent>();
        let loop_shared = shared.clone();
        let event_loop = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                loop_shared.handle_event(event);
            }
            tracing::debug!("Location event loop finished");
        });

        Self {
            shared,
            event_tx,
            event_loop,
            active: tokio::sync::Mutex::new(None),
            track_path: RwLock::new(None),
            output_dir: config.output_dir.clone(),
            creator: config.track_creator.clone(),
            sample_interval,
            fix_timeout,
        }
    }

    /// Channel the provider delivers fixes and authorization changes into
    pub fn event_sender(&self) -> mpsc::UnboundedSender<LocationEvent> {
        self.event_tx.clone()
    }

    /// Reader for the last known fix, usable from any context
    pub fn last_known_fix(&self) -> LastKnownFix {
        self.shared.last_fix.clone()
    }

    /// Copy of the most recent valid fix
    pub fn last_fix(&self) -> Option<LocationFix> {
        self.shared.last_fix.get()
    }

    /// Meters traveled while logging
    pub fn distance_traveled(&self) -> f64 {
        self.shared.tracking.lock().distance_m
    }

    pub fn is_logging(&self) -> bool {
        self.shared.logging.load(Ordering::SeqCst)
    }

    /// Begin acquisition and open a new track file. No-op while logging.
    pub async fn start_logging(&self) {
        let mut active = self.active.lock().await;
        if active.is_some() {
            tracing::debug!("start_logging ignored: already logging");
            return;
        }

        let path = self
            .output_dir
            .join(artifact_filename(ArtifactKind::Track, chrono::Local::now().fixed_offset()));
        let writer = TrackWriter::open(path.clone(), &self.creator);

        {
            let mut tracking = self.shared.tracking.lock();
            tracking.previous = None;
            tracking.distance_m = 0.0;
            tracking.fix_since_start = false;
            // Fixes from before this session are not part of its track
            tracking.last_appended = tracking.sequence;
        }
        self.shared.restarts.store(0, Ordering::SeqCst);
        self.shared.logging.store(true, Ordering::SeqCst);
        self.shared.acquisition_wanted.store(true, Ordering::SeqCst);
        self.shared.start_acquisition();

        let sampler = match writer.appender() {
            Some(appender) => self.spawn_sampler(appender),
            None => tokio::spawn(async {}),
        };
        let watchdog = self.spawn_watchdog();

        *self.track_path.write() = Some(path.clone());
        *active = Some(ActiveLog {
            writer,
            sampler,
            watchdog,
        });

        tracing::info!("Location logging started: {:?}", path);
    }

    /// Stop acquisition and finalize the track. No-op while not logging.
    ///
    /// Returns once the footer is on disk.
    pub async fn stop_logging(&self) -> Option<TrackSummary> {
        let mut active = self.active.lock().await;
        let log = active.take()?;

        self.shared.logging.store(false, Ordering::SeqCst);
        self.shared.stop_acquisition();

        log.sampler.abort();
        log.watchdog.abort();
        let _ = log.sampler.await;
        let _ = log.watchdog.await;

        let summary = log.writer.close().await;
        tracing::info!(
            "Location logging stopped: {:?} ({:.1} m traveled)",
            summary.path,
            self.distance_traveled()
        );
        Some(summary)
    }

    /// Snapshot for the status surface
    pub fn status(&self) -> LocationStatus {
        let last_fix = self.shared.last_fix.get();
        LocationStatus {
            authorization: *self.shared.authorization.read(),
            logging: self.is_logging(),
            has_signal: self.shared.has_signal(),
            last_fix,
            distance_m: self.distance_traveled(),
            acquisition_restarts: self.shared.restarts.load(Ordering::SeqCst),
            track_path: self.track_path.read().clone(),
            last_error: self.shared.last_error.read().clone(),
        }
    }

    fn spawn_sampler(&self, appender: TrackAppender) -> JoinHandle<()> {
        let shared = self.shared.clone();
        let period = self.sample_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Some(fix) = shared.take_unwritten_fix() {
                    if !appender.append(fix) {
                        tracing::warn!("Track writer closed, sampler exiting");
                        break;
                    }
                }
            }
        })
    }

    fn spawn_watchdog(&self) -> JoinHandle<()> {
        let shared = self.shared.clone();
        let timeout = self.fix_timeout;

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(timeout).await;
                if !shared.logging.load(Ordering::SeqCst) || shared.tracking.lock().fix_since_start {
                    break;
                }
                if !shared.provider.authorization_status().is_authorized() {
                    continue;
                }
                tracing::warn!("No fix within {:?}, restarting location updates", timeout);
                shared.restarts.fetch_add(1, Ordering::SeqCst);
                shared.provider.stop_updates();
                shared.provider.start_updates();
                shared.updates_running.store(true, Ordering::SeqCst);
            }
        })
    }
}

impl Drop for LocationSession {
    fn drop(&mut self) {
        self.event_loop.abort();
        self.shared.logging.store(false, Ordering::SeqCst);
        self.shared.stop_acquisition();

        if let Ok(mut active) = self.active.try_lock() {
            if let Some(log) = active.take() {
                log.sampler.abort();
                log.watchdog.abort();
                let summary = log.writer.close_blocking();
                tracing::info!("Location session dropped while logging, closed {:?}", summary.path);
            }
        }
    }
}
