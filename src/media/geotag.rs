//! Photo geotagging
//!
//! Builds an EXIF GPS block from a location fix and merges it into a JPEG's
//! existing metadata. Only the APP1 Exif segment is rewritten; every other
//! segment and the entropy-coded image data are carried over unchanged.

use crate::location::LocationFix;
use crate::utils::files::{artifact_filename, ArtifactKind};
use bytes::Bytes;
use chrono::{DateTime, FixedOffset, Timelike, Utc};
use exif::experimental::Writer;
use exif::{Context, Field, In, Rational, Tag, Value};
use img_parts::jpeg::Jpeg;
use img_parts::ImageEXIF;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{Cursor, ErrorKind};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Geotagging errors
#[derive(Error, Debug)]
pub enum GeotagError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("EXIF error: {0}")]
    Exif(#[from] exif::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

const SECONDS_DENOM: u32 = 1_000_000;
const ALTITUDE_DENOM: u32 = 1_000;
const CENTI: u32 = 100;

/// GPS block derived from one fix, following EXIF conventions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpsMetadata {
    /// Absolute latitude in degrees
    pub latitude: f64,
    /// `N` or `S`
    pub latitude_ref: char,
    /// Absolute longitude in degrees
    pub longitude: f64,
    /// `E` or `W`
    pub longitude_ref: char,
    /// Absolute altitude in meters
    pub altitude: f64,
    pub below_sea_level: bool,
    /// When the fix was taken
    pub timestamp: DateTime<Utc>,
    /// Horizontal accuracy used as dilution of precision
    pub dop: f64,
    pub speed_kmh: Option<f64>,
    /// Degrees from true north
    pub direction: Option<f64>,
}

/// Build the GPS block for a fix
pub fn gps_metadata(fix: &LocationFix) -> GpsMetadata {
    GpsMetadata {
        latitude: fix.latitude.abs(),
        latitude_ref: if fix.latitude >= 0.0 { 'N' } else { 'S' },
        longitude: fix.longitude.abs(),
        longitude_ref: if fix.longitude >= 0.0 { 'E' } else { 'W' },
        altitude: fix.altitude.abs(),
        below_sea_level: fix.altitude < 0.0,
        timestamp: fix.timestamp,
        dop: fix.horizontal_accuracy,
        speed_kmh: fix.has_speed().then(|| fix.speed * 3.6),
        direction: fix.has_heading().then_some(fix.heading),
    }
}

impl GpsMetadata {
    /// Seconds within the minute in hundredths, truncated so it stays below 6000
    fn centiseconds(&self) -> u32 {
        self.timestamp.second() * 100 + (self.timestamp.nanosecond() % 1_000_000_000) / 10_000_000
    }

    /// UTC `HH:mm:ss.SS`
    pub fn time_stamp(&self) -> String {
        let centis = self.centiseconds();
        format!(
            "{:02}:{:02}:{:02}.{:02}",
            self.timestamp.hour(),
            self.timestamp.minute(),
            centis / 100,
            centis % 100
        )
    }

    /// UTC `yyyy:MM:dd`
    pub fn date_stamp(&self) -> String {
        self.timestamp.format("%Y:%m:%d").to_string()
    }

    /// EXIF fields for the GPS IFD
    pub fn to_fields(&self) -> Vec<Field> {
        let mut fields = vec![
            gps_field(Tag::GPSVersionID, Value::Byte(vec![2, 3, 0, 0])),
            gps_field(Tag::GPSLatitudeRef, ascii(&self.latitude_ref.to_string())),
            gps_field(Tag::GPSLatitude, Value::Rational(to_dms(self.latitude).to_vec())),
            gps_field(Tag::GPSLongitudeRef, ascii(&self.longitude_ref.to_string())),
            gps_field(Tag::GPSLongitude, Value::Rational(to_dms(self.longitude).to_vec())),
            gps_field(
                Tag::GPSAltitudeRef,
                Value::Byte(vec![u8::from(self.below_sea_level)]),
            ),
            gps_field(
                Tag::GPSAltitude,
                Value::Rational(vec![rational(self.altitude, ALTITUDE_DENOM)]),
            ),
            gps_field(
                Tag::GPSTimeStamp,
                Value::Rational(vec![
                    Rational { num: self.timestamp.hour(), denom: 1 },
                    Rational { num: self.timestamp.minute(), denom: 1 },
                    Rational { num: self.centiseconds(), denom: CENTI },
                ]),
            ),
            gps_field(Tag::GPSDateStamp, ascii(&self.date_stamp())),
            gps_field(Tag::GPSDOP, Value::Rational(vec![rational(self.dop, CENTI)])),
        ];

        if let Some(speed) = self.speed_kmh {
            fields.push(gps_field(Tag::GPSSpeedRef, ascii("K")));
            fields.push(gps_field(Tag::GPSSpeed, Value::Rational(vec![rational(speed, CENTI)])));
        }
        if let Some(direction) = self.direction {
            fields.push(gps_field(Tag::GPSImgDirectionRef, ascii("T")));
            fields.push(gps_field(
                Tag::GPSImgDirection,
                Value::Rational(vec![rational(direction, CENTI)]),
            ));
        }

        fields
    }
}

/// Merge a GPS block for `fix` into `jpeg`, replacing any previous GPS data
pub fn embed_gps(jpeg: &[u8], fix: &LocationFix) -> Result<Vec<u8>, GeotagError> {
    let mut image = Jpeg::from_bytes(Bytes::copy_from_slice(jpeg))
        .map_err(|e| GeotagError::InvalidImage(e.to_string()))?;

    let existing = match image.exif() {
        Some(raw) => Some(exif::Reader::new().read_raw(raw.to_vec())?),
        None => None,
    };

    let thumbnail = existing.as_ref().and_then(thumbnail_bytes);
    let little_endian = existing.as_ref().map(|e| e.little_endian()).unwrap_or(false);

    let mut fields: Vec<Field> = existing
        .as_ref()
        .map(|e| {
            e.fields()
                .filter(|field| keep_field(field, thumbnail.is_some()))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    fields.extend(gps_metadata(fix).to_fields());

    let mut writer = Writer::new();
    for field in &fields {
        writer.push_field(field);
    }
    if let Some(thumb) = thumbnail.as_deref() {
        writer.set_jpeg(thumb, In::THUMBNAIL);
    }
    let mut tiff = Cursor::new(Vec::new());
    writer.write(&mut tiff, little_endian)?;

    image.set_exif(Some(Bytes::from(tiff.into_inner())));
    Ok(image.encoder().bytes().to_vec())
}

/// Write a processed photo to its final `photo_<epoch-millis>.jpg` name.
///
/// With no location snapshot the photo is written untouched. A failed merge
/// is logged and the untagged photo is written instead.
pub fn persist_photo(
    data: Vec<u8>,
    snapshot: Option<&LocationFix>,
    dir: &Path,
    now: DateTime<FixedOffset>,
) -> Result<PathBuf, GeotagError> {
    let bytes = match snapshot {
        None => {
            tracing::debug!("No location at shutter time, saving photo without GPS");
            data
        }
        Some(fix) => match embed_gps(&data, fix) {
            Ok(tagged) => tagged,
            Err(e) => {
                tracing::warn!("Failed to geotag photo, saving without GPS: {}", e);
                data
            }
        },
    };

    fs::create_dir_all(dir)?;
    let staging = dir.join(format!(".{}.jpg.tmp", Uuid::new_v4()));
    fs::write(&staging, &bytes)?;

    let name = artifact_filename(ArtifactKind::Photo, now);
    match claim_name(dir, &name) {
        Ok(path) => {
            // Replaces the empty placeholder claimed above
            if let Err(e) = fs::rename(&staging, &path) {
                let _ = fs::remove_file(&staging);
                let _ = fs::remove_file(&path);
                return Err(e.into());
            }
            tracing::info!("Saved photo to {:?}", path);
            Ok(path)
        }
        Err(e) => {
            let _ = fs::remove_file(&staging);
            Err(e.into())
        }
    }
}

/// Atomically reserve `name` in `dir`, or `<stem>-<n>.jpg` if taken
fn claim_name(dir: &Path, name: &str) -> std::io::Result<PathBuf> {
    let stem = name.trim_end_matches(".jpg");
    for n in 0..1000u32 {
        let candidate = if n == 0 {
            dir.join(name)
        } else {
            dir.join(format!("{stem}-{n}.jpg"))
        };
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free photo name for {}", name),
    ))
}

fn keep_field(field: &Field, has_thumbnail: bool) -> bool {
    if field.tag.context() == Context::Gps || matches!(field.value, Value::Unknown(..)) {
        return false;
    }
    if field.ifd_num == In::THUMBNAIL {
        if !has_thumbnail {
            return false;
        }
    } else if field.ifd_num != In::PRIMARY {
        return false;
    }
    !matches!(
        field.tag,
        Tag::ExifIFDPointer
            | Tag::GPSInfoIFDPointer
            | Tag::InteropIFDPointer
            | Tag::JPEGInterchangeFormat
            | Tag::JPEGInterchangeFormatLength
            | Tag::StripOffsets
            | Tag::StripByteCounts
    )
}

fn thumbnail_bytes(exif: &exif::Exif) -> Option<Vec<u8>> {
    let offset = exif
        .get_field(Tag::JPEGInterchangeFormat, In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    let len = exif
        .get_field(Tag::JPEGInterchangeFormatLength, In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    exif.buf().get(offset..offset.checked_add(len)?).map(<[u8]>::to_vec)
}

fn gps_field(tag: Tag, value: Value) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value,
    }
}

fn ascii(text: &str) -> Value {
    Value::Ascii(vec![text.as_bytes().to_vec()])
}

fn rational(value: f64, denom: u32) -> Rational {
    let num = (value.max(0.0) * f64::from(denom)).round();
    Rational {
        num: num.min(f64::from(u32::MAX)) as u32,
        denom,
    }
}

/// Degrees, minutes, seconds of an absolute angle
fn to_dms(value: f64) -> [Rational; 3] {
    let degrees = value.trunc();
    let minutes_total = (value - degrees) * 60.0;
    let minutes = minutes_total.trunc();
    let seconds = (minutes_total - minutes) * 60.0;
    [
        Rational { num: degrees as u32, denom: 1 },
        Rational { num: minutes as u32, denom: 1 },
        truncated(seconds, SECONDS_DENOM),
    ]
}

/// Like [`rational`] but rounds down, for sexagesimal parts that must stay
/// below 60
fn truncated(value: f64, denom: u32) -> Rational {
    let num = (value.max(0.0) * f64::from(denom)).floor();
    Rational {
        num: num.min(f64::from(60 * denom - 1)) as u32,
        denom,
    }
}
