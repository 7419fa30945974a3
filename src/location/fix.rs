//! Location fixes
//!
//! A fix is one position and velocity sample reported by the location
//! provider. Consumers only ever see copies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// One reported position sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationFix {
    /// Degrees, positive north
    pub latitude: f64,

    /// Degrees, positive east
    pub longitude: f64,

    /// Meters above sea level
    pub altitude: f64,

    /// Radius of uncertainty in meters; negative means no fix
    pub horizontal_accuracy: f64,

    /// Meters per second; negative means unknown
    pub speed: f64,

    /// Degrees from true north; negative means unknown
    pub heading: f64,

    /// When the provider took the sample
    pub timestamp: DateTime<Utc>,
}

impl LocationFix {
    /// Create a fix with unknown speed and heading
    pub fn new(latitude: f64, longitude: f64, altitude: f64, horizontal_accuracy: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
            horizontal_accuracy,
            speed: -1.0,
            heading: -1.0,
            timestamp: Utc::now(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_motion(mut self, speed: f64, heading: f64) -> Self {
        self.speed = speed;
        self.heading = heading;
        self
    }

    /// Whether the fix can be used at all.
    ///
    /// Negative accuracy is the provider's sentinel for "no fix". Non-finite
    /// coordinates are rejected as well since they cannot be serialized.
    pub fn is_valid(&self) -> bool {
        self.horizontal_accuracy >= 0.0
            && self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    pub fn has_speed(&self) -> bool {
        self.speed.is_finite() && self.speed >= 0.0
    }

    pub fn has_heading(&self) -> bool {
        self.heading.is_finite() && self.heading >= 0.0
    }

    /// Great-circle distance to another fix in meters
    pub fn distance_to(&self, other: &LocationFix) -> f64 {
        haversine_distance(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

/// Haversine great-circle distance between two coordinates, in meters
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}
