//! Artifact files in the storage area
//!
//! Naming conventions, enumeration for the media browser, and the
//! age-based retention purge run at launch.

use crate::location::fix::haversine_distance;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Kind of media artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Video,
    Photo,
    Track,
    Audio,
}

impl ArtifactKind {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Photo => "photo",
            Self::Track => "track",
            Self::Audio => "mic",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Video => "mov",
            Self::Photo => "jpg",
            Self::Track => "gpx",
            Self::Audio => "m4a",
        }
    }

    /// Classify a file by extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "mov" | "mp4" | "m4v" => Some(Self::Video),
            "jpg" | "jpeg" | "png" | "heic" => Some(Self::Photo),
            "gpx" => Some(Self::Track),
            "m4a" => Some(Self::Audio),
            _ => None,
        }
    }
}

/// File name for a new artifact created at `now`.
///
/// - video and track: `video_2025-06-09T14-03-22.123-GMT+2.mov`
/// - photo: `photo_<epoch-millis>.jpg`
/// - audio: `mic_2025-06-09_14-03-22-123.m4a`
pub fn artifact_filename(kind: ArtifactKind, now: DateTime<FixedOffset>) -> String {
    match kind {
        ArtifactKind::Video | ArtifactKind::Track => format!(
            "{}_{}-{}.{}",
            kind.prefix(),
            now.format("%Y-%m-%dT%H-%M-%S%.3f"),
            tz_abbreviation(now.offset().local_minus_utc()),
            kind.extension()
        ),
        ArtifactKind::Photo => format!(
            "{}_{}.{}",
            kind.prefix(),
            now.timestamp_millis(),
            kind.extension()
        ),
        ArtifactKind::Audio => format!(
            "{}_{}.{}",
            kind.prefix(),
            now.format("%Y-%m-%d_%H-%M-%S-%3f"),
            kind.extension()
        ),
    }
}

/// GMT-offset style abbreviation without colons (`GMT`, `GMT-4`, `GMT+0530`)
pub fn tz_abbreviation(offset_seconds: i32) -> String {
    if offset_seconds == 0 {
        return "GMT".to_string();
    }
    let sign = if offset_seconds < 0 { '-' } else { '+' };
    let total_minutes = offset_seconds.unsigned_abs() / 60;
    let (hours, minutes) = (total_minutes / 60, total_minutes % 60);
    if minutes == 0 {
        format!("GMT{}{}", sign, hours)
    } else {
        format!("GMT{}{:02}{:02}", sign, hours, minutes)
    }
}

/// One file in the storage area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaArtifact {
    pub path: PathBuf,
    pub name: String,
    pub kind: ArtifactKind,
    pub created: DateTime<Utc>,
    pub size_bytes: u64,
    /// False for a track left without its footer by an unclean shutdown
    pub complete: bool,
    /// Path length in meters, tracks only
    pub distance_m: Option<f64>,
}

/// Enumerate artifacts in `dir`, newest first
pub fn list_artifacts(dir: &Path) -> io::Result<Vec<MediaArtifact>> {
    let mut items = Vec::new();

    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        if name.starts_with('.') || name.ends_with(".tmp") {
            continue;
        }
        let Some(kind) = ArtifactKind::from_path(&path) else {
            continue;
        };
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }

        let created = creation_time(&metadata).unwrap_or_else(|_| SystemTime::now());
        let (complete, distance_m) = match kind {
            ArtifactKind::Track => (
                is_finalized_track(&path).unwrap_or(false),
                track_distance(&path).ok(),
            ),
            _ => (true, None),
        };

        items.push(MediaArtifact {
            path,
            name,
            kind,
            created: DateTime::<Utc>::from(created),
            size_bytes: metadata.len(),
            complete,
            distance_m,
        });
    }

    items.sort_by(|a, b| b.created.cmp(&a.created));
    Ok(items)
}

/// Delete artifacts whose creation time is at least `max_age` before `now`.
///
/// Only recognized artifact kinds are touched. Failures on individual files
/// are logged and skipped. Returns the number of files removed.
pub fn purge_older_than(dir: &Path, max_age: Duration, now: SystemTime) -> io::Result<usize> {
    let mut removed = 0;

    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if ArtifactKind::from_path(&path).is_none() {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let Ok(created) = creation_time(&metadata) else {
            continue;
        };
        let age = now.duration_since(created).unwrap_or_default();
        if age < max_age {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("Purged {:?} (age {:?})", path, age);
                removed += 1;
            }
            Err(e) => tracing::warn!("Failed to purge {:?}: {}", path, e),
        }
    }

    if removed > 0 {
        tracing::info!("Purged {} old artifacts from {:?}", removed, dir);
    }
    Ok(removed)
}

/// Remove a single artifact; other files are refused
pub fn delete_artifact(path: &Path) -> io::Result<()> {
    if ArtifactKind::from_path(path).is_none() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a media artifact: {}", path.display()),
        ));
    }
    fs::remove_file(path)?;
    tracing::info!("Deleted {:?}", path);
    Ok(())
}

/// Whether a track file ends with the GPX footer
pub fn is_finalized_track(path: &Path) -> io::Result<bool> {
    let mut file = fs::File::open(path)?;
    let len = file.metadata()?.len();
    let tail_len = len.min(64);
    file.seek(SeekFrom::Start(len - tail_len))?;

    let mut tail = Vec::with_capacity(tail_len as usize);
    file.read_to_end(&mut tail)?;
    let tail = String::from_utf8_lossy(&tail);
    Ok(tail.trim_end().ends_with("</gpx>"))
}

/// Sum of great-circle distances between consecutive `trkpt` positions.
///
/// Works on partial tracks too; points with unreadable coordinates are skipped.
pub fn track_distance(path: &Path) -> io::Result<f64> {
    let text = fs::read_to_string(path)?;
    let mut total = 0.0;
    let mut previous: Option<(f64, f64)> = None;

    for element in text.split("<trkpt").skip(1) {
        let Some(point) = attribute(element, "lat").zip(attribute(element, "lon")) else {
            continue;
        };
        if let Some((lat, lon)) = previous {
            total += haversine_distance(lat, lon, point.0, point.1);
        }
        previous = Some(point);
    }
    Ok(total)
}

/// Numeric value of `name="..."` within the opening tag
fn attribute(element: &str, name: &str) -> Option<f64> {
    let tag = &element[..element.find('>')?];
    let needle = format!(" {}=\"", name);
    let start = tag.find(&needle)? + needle.len();
    let end = start + tag[start..].find('"')?;
    tag[start..end].parse().ok()
}

fn creation_time(metadata: &fs::Metadata) -> io::Result<SystemTime> {
    metadata.created().or_else(|_| metadata.modified())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn at(offset_secs: i32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(offset_secs)
            .unwrap()
            .with_ymd_and_hms(2025, 6, 9, 14, 3, 22)
            .unwrap()
    }

    #[test]
    fn test_video_and_track_names() {
        assert_eq!(
            artifact_filename(ArtifactKind::Video, at(2 * 3600)),
            "video_2025-06-09T14-03-22.000-GMT+2.mov"
        );
        assert_eq!(
            artifact_filename(ArtifactKind::Track, at(-4 * 3600)),
            "track_2025-06-09T14-03-22.000-GMT-4.gpx"
        );
    }

    #[test]
    fn test_photo_and_audio_names() {
        let now = at(0);
        assert_eq!(
            artifact_filename(ArtifactKind::Photo, now),
            format!("photo_{}.jpg", now.timestamp_millis())
        );
        assert_eq!(
            artifact_filename(ArtifactKind::Audio, now),
            "mic_2025-06-09_14-03-22-000.m4a"
        );
    }

    #[test]
    fn test_tz_abbreviation() {
        assert_eq!(tz_abbreviation(0), "GMT");
        assert_eq!(tz_abbreviation(5 * 3600 + 30 * 60), "GMT+0530");
        assert_eq!(tz_abbreviation(-3 * 3600), "GMT-3");
    }

    #[test]
    fn test_list_skips_unknown_and_flags_partial_tracks() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("video_a.mov"), b"movie").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
        fs::write(dir.path().join("track_ok.gpx"), "<gpx>\n</gpx>\n").unwrap();
        fs::write(dir.path().join("track_partial.gpx"), "<gpx>\n<trk>").unwrap();

        let items = list_artifacts(dir.path()).unwrap();
        assert_eq!(items.len(), 3);

        let ok = items.iter().find(|i| i.name == "track_ok.gpx").unwrap();
        let partial = items.iter().find(|i| i.name == "track_partial.gpx").unwrap();
        assert!(ok.complete);
        assert!(!partial.complete);
        assert_eq!(ok.kind, ArtifactKind::Track);
        assert_eq!(ok.distance_m, Some(0.0));
        let video = items.iter().find(|i| i.kind == ArtifactKind::Video).unwrap();
        assert_eq!(video.distance_m, None);
    }

    #[test]
    fn test_track_distance_from_written_track() {
        use crate::location::{LocationFix, TrackWriter};

        let dir = tempdir().unwrap();
        let path = dir.path().join("track_walk.gpx");
        let fixes = [
            LocationFix::new(51.5007, -0.1246, 10.0, 5.0),
            LocationFix::new(51.5014, -0.1419, 12.0, 5.0),
            LocationFix::new(51.5055, -0.0754, 8.0, 5.0),
        ];

        let writer = TrackWriter::open(path.clone(), "test");
        for fix in fixes {
            writer.append(fix);
        }
        assert_eq!(writer.close_blocking().points_written, 3);

        let expected = fixes[0].distance_to(&fixes[1]) + fixes[1].distance_to(&fixes[2]);
        let measured = track_distance(&path).unwrap();
        // Coordinates go through decimal text, so allow a few centimeters
        assert!((measured - expected).abs() < 0.05, "{} vs {}", measured, expected);

        let listed = list_artifacts(dir.path()).unwrap();
        assert_eq!(listed.len(), 1);
        let distance = listed[0].distance_m.unwrap();
        assert!((distance - measured).abs() < 1e-9);
        assert!(listed[0].complete);
    }

    #[test]
    fn test_purge_only_touches_old_artifacts() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("photo_1.jpg"), b"jpeg").unwrap();
        fs::write(dir.path().join("keep.txt"), b"other").unwrap();

        let week = Duration::from_secs(7 * 24 * 3600);
        assert_eq!(purge_older_than(dir.path(), week, SystemTime::now()).unwrap(), 0);

        let later = SystemTime::now() + Duration::from_secs(8 * 24 * 3600);
        assert_eq!(purge_older_than(dir.path(), week, later).unwrap(), 1);
        assert!(!dir.path().join("photo_1.jpg").exists());
        assert!(dir.path().join("keep.txt").exists());
    }

    #[test]
    fn test_delete_refuses_non_artifacts() {
        let dir = tempdir().unwrap();
        let other = dir.path().join("config.json");
        fs::write(&other, b"{}").unwrap();
        assert!(delete_artifact(&other).is_err());
        assert!(other.exists());
    }
}
