//! Error types and handling
//!
//! Common error types used across the application. Component-level errors
//! convert into [`AppError`], which the status surface reports through
//! [`ErrorResponse`] codes instead of failing the caller.

use crate::capture::traits::CaptureError;
use crate::config::ConfigError;
use crate::location::track_writer::TrackWriterError;
use crate::media::geotag::GeotagError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Track error: {0}")]
    Track(#[from] TrackWriterError),

    #[error("Geotag error: {0}")]
    Geotag(#[from] GeotagError),

    #[error("Hardware unavailable: {0}")]
    HardwareUnavailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

/// Error response for the status surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Io(_) => "IO_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Capture(CaptureError::PermissionDenied(_)) => "PERMISSION_DENIED",
            AppError::Capture(CaptureError::DeviceNotFound(_)) => "HARDWARE_UNAVAILABLE",
            AppError::Capture(_) => "CAPTURE_ERROR",
            AppError::Track(_) => "TRACK_ERROR",
            AppError::Geotag(_) => "GEOTAG_ERROR",
            AppError::HardwareUnavailable(_) => "HARDWARE_UNAVAILABLE",
            AppError::PermissionDenied(_) => "PERMISSION_DENIED",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
