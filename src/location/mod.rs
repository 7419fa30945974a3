//! Location acquisition and GPS track logging
//!
//! - [`LocationSession`] owns the provider, the last known fix and the
//!   distance total
//! - [`TrackWriter`] serializes the GPX track file on its own thread

pub mod fix;
pub mod gpx;
pub mod provider;
pub mod session;
pub mod track_writer;

pub use fix::LocationFix;
pub use provider::{AuthorizationStatus, LocationEvent, LocationProvider};
pub use session::{LastKnownFix, LocationSession, LocationStatus};
pub use track_writer::{TrackSummary, TrackWriter};
