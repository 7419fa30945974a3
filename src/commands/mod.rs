//! Command handlers
//!
//! The entry points a platform shell calls from its UI. Each takes the shared
//! [`recording::RecorderState`].

pub mod recording;
pub mod system;
