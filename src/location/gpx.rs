//! GPX 1.1 text fragments
//!
//! The track file is written as a stream: [`header`] once, one
//! [`trackpoint`] line per sample, then [`FOOTER`] once.

use super::fix::LocationFix;
use chrono::{DateTime, SecondsFormat, Utc};

/// GPX 1.1 namespace
pub const GPX_NAMESPACE: &str = "http://www.topografix.com/GPX/1/1";

/// Closes the segment, track and document opened by [`header`]
pub const FOOTER: &str = "    </trkseg>\n  </trk>\n</gpx>\n";

/// XML declaration, root element and the opening of the single track segment
pub fn header(creator: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <gpx version=\"1.1\" creator=\"{}\" xmlns=\"{}\">\n  \
         <trk>\n    <name>Track</name>\n    <trkseg>\n",
        escape_xml(creator),
        GPX_NAMESPACE
    )
}

/// One `trkpt` element on its own line
pub fn trackpoint(fix: &LocationFix) -> String {
    format!(
        "      <trkpt lat=\"{}\" lon=\"{}\"><ele>{}</ele><time>{}</time></trkpt>\n",
        format_decimal(fix.latitude),
        format_decimal(fix.longitude),
        format_decimal(fix.altitude),
        format_time(&fix.timestamp)
    )
}

/// ISO-8601 UTC timestamp with millisecond fraction
pub fn format_time(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Plain decimal notation as required by `xsd:decimal`.
///
/// Always carries a fractional part (`40.0`, not `40`) and never an exponent.
pub fn format_decimal(value: f64) -> String {
    if !value.is_finite() {
        return "0.0".to_string();
    }
    let text = format!("{}", value);
    if text.contains('.') {
        text
    } else {
        format!("{}.0", text)
    }
}

/// Escape the five XML special characters
pub fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
