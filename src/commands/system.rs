//! System-related commands
//!
//! Storage status for the "minutes left" indicator.

use super::recording::RecorderState;
use crate::utils::disk::{estimated_minutes_left, free_space_mb};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Storage area capacity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub free_mb: f64,
    pub estimated_minutes_left: u64,
}

impl StorageInfo {
    /// Query the volume holding `dir`
    pub fn query(dir: &Path, mb_per_minute: f64) -> Self {
        let free_mb = free_space_mb(dir);
        Self {
            free_mb,
            estimated_minutes_left: estimated_minutes_left(free_mb, mb_per_minute),
        }
    }
}

/// Get free space and remaining recording time
pub async fn get_storage_info(state: &RecorderState) -> StorageInfo {
    let dir = state.config().output_dir.clone();
    let mb_per_minute = state.config().video_mb_per_minute;

    tokio::task::spawn_blocking(move || StorageInfo::query(&dir, mb_per_minute))
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("Storage query failed: {}", e);
            StorageInfo {
                free_mb: 0.0,
                estimated_minutes_left: 0,
            }
        })
}
