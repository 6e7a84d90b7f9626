//! Common types and utilities shared across the station map crates.

pub mod bbox;
pub mod error;
pub mod geo;
pub mod station;

pub use bbox::BoundingBox;
pub use error::{ErrorKind, StationError, StationResult};
pub use geo::{GeoPoint, RadiusRange};
pub use station::{Station, StationDraft, StationId, DEFAULT_CAPACITY};
