//! Video GPS Recorder - video, photos and GPS tracks from one device.
//!
//! This is the core library for the recorder. Platform shells implement the
//! camera, microphone and location collaborator traits, forward their
//! callbacks as events, and drive the recorder through [`commands`].

pub mod capture;
pub mod commands;
pub mod config;
pub mod location;
pub mod media;
pub mod recorder;
pub mod utils;

pub use commands::recording::{RecorderState, RecorderStatus};
pub use config::RecorderConfig;
pub use utils::error::{AppError, AppResult, ErrorResponse};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging.
///
/// `RUST_LOG` overrides the default filter. Later calls are ignored.
pub fn init_tracing() {
    let result = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "video_gps_recorder_lib=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if result.is_ok() {
        tracing::info!("Logging initialized");
    }
}
