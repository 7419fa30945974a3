//! Media post-processing

pub mod geotag;

pub use geotag::{embed_gps, gps_metadata, persist_photo, GeotagError, GpsMetadata};
