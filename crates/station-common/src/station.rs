//! Station records as exchanged with the station service.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{StationError, StationResult};
use crate::geo::GeoPoint;

/// Capacity assumed when none is given.
pub const DEFAULT_CAPACITY: u32 = 20;

/// Identifier assigned by the station service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationId(pub i64);

impl std::fmt::Display for StationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted dock station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,

    /// Human-readable station code (e.g. "STATION-1A2B3C4D").
    #[serde(
        rename = "station_id",
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub code: Option<String>,

    pub name: String,
    pub latitude: f64,
    pub longitude: f64,

    #[serde(default = "default_capacity", deserialize_with = "null_as_default_capacity")]
    pub capacity: u32,

    #[serde(default, deserialize_with = "blank_as_none")]
    pub address: Option<String>,

    /// Distance from the query center in km. Only present in query results.
    #[serde(rename = "distance", default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

impl Station {
    /// Build the record the service holds after accepting `draft`.
    pub fn from_draft(id: StationId, code: Option<String>, draft: &StationDraft) -> Self {
        Self {
            id,
            code,
            name: draft.name.clone(),
            latitude: draft.latitude,
            longitude: draft.longitude,
            capacity: draft.capacity,
            address: draft.address.clone(),
            distance_km: None,
        }
    }

    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Payload for creating or updating a station. Has no identity yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationDraft {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl StationDraft {
    pub fn new(name: impl Into<String>, position: GeoPoint) -> Self {
        Self {
            name: name.into(),
            latitude: position.latitude,
            longitude: position.longitude,
            capacity: DEFAULT_CAPACITY,
            address: None,
        }
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        let address = address.into();
        self.address = if address.trim().is_empty() {
            None
        } else {
            Some(address)
        };
        self
    }

    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    /// Check the invariants the service expects before sending.
    pub fn validate(&self) -> StationResult<()> {
        if self.name.trim().is_empty() {
            return Err(StationError::invalid_field("name", "must not be empty"));
        }
        self.position().validate()
    }
}

fn default_capacity() -> u32 {
    DEFAULT_CAPACITY
}

fn null_as_default_capacity<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u32>::deserialize(deserializer)?.unwrap_or(DEFAULT_CAPACITY))
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}
