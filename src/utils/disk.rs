//! Storage capacity helpers

use std::path::Path;
use sysinfo::Disks;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Free space in MB on the volume holding `path`, or 0 when unknown
pub fn free_space_mb(path: &Path) -> f64 {
    let disks = Disks::new_with_refreshed_list();
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

    // Most specific mount point wins
    disks
        .list()
        .iter()
        .filter(|disk| canonical.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space() as f64 / BYTES_PER_MB)
        .unwrap_or_else(|| {
            tracing::debug!("No disk found for {:?}", canonical);
            0.0
        })
}

/// Whole minutes of video that fit in `free_mb`
pub fn estimated_minutes_left(free_mb: f64, mb_per_minute: f64) -> u64 {
    if free_mb <= 0.0 || mb_per_minute <= 0.0 {
        return 0;
    }
    (free_mb / mb_per_minute).floor() as u64
}
