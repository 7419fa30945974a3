//! Shared utilities

pub mod disk;
pub mod error;
pub mod files;

pub use error::{AppError, AppResult, ErrorResponse};
