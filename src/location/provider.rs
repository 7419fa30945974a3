//! Location provider contract
//!
//! The platform location service is an external collaborator. It is told to
//! start or stop and reports back by sending [`LocationEvent`] messages into
//! the session's channel.

use super::fix::LocationFix;
use serde::{Deserialize, Serialize};

/// Authorization state for location access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthorizationStatus {
    /// The user has not been asked yet
    #[default]
    NotDetermined,
    /// Access is blocked by policy
    Restricted,
    /// The user refused access
    Denied,
    /// Access granted while the app is in use
    AuthorizedWhenInUse,
    /// Access granted at all times
    AuthorizedAlways,
}

impl AuthorizationStatus {
    pub fn is_authorized(self) -> bool {
        matches!(self, Self::AuthorizedWhenInUse | Self::AuthorizedAlways)
    }

    pub fn is_blocked(self) -> bool {
        matches!(self, Self::Restricted | Self::Denied)
    }
}

/// Messages delivered by the provider
#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    /// One or more fixes, oldest first
    Fixes(Vec<LocationFix>),
    /// Authorization changed
    AuthorizationChanged(AuthorizationStatus),
    /// Provider reported a failure; acquisition may continue
    Failed(String),
}

/// Platform location service
pub trait LocationProvider: Send + Sync {
    /// Current authorization
    fn authorization_status(&self) -> AuthorizationStatus;

    /// Prompt the user; the answer arrives as `AuthorizationChanged`
    fn request_authorization(&self);

    /// Begin continuous fix delivery
    fn start_updates(&self);

    /// Stop fix delivery
    fn stop_updates(&self);
}
