//! Geographic primitives: WGS84 points, great-circle distance and search radius bounds.

use serde::{Deserialize, Serialize};

use crate::error::{StationError, StationResult};

/// Mean Earth radius used for haversine distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Approximate length of one degree of latitude.
pub const KM_PER_DEGREE: f64 = 111.32;

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// True when both coordinates are finite and inside the WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Check the coordinate ranges, naming the offending field.
    pub fn validate(&self) -> StationResult<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(StationError::invalid_field(
                "latitude",
                format!("{} is outside [-90, 90]", self.latitude),
            ));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(StationError::invalid_field(
                "longitude",
                format!("{} is outside [-180, 180]", self.longitude),
            ));
        }
        Ok(())
    }

    /// Great-circle distance to another point in kilometres (haversine).
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let lat1_rad = self.latitude.to_radians();
        let lat2_rad = other.latitude.to_radians();
        let delta_lat = (other.latitude - self.latitude).to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();

        EARTH_RADIUS_KM * c
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// Inclusive range of search radii, in whole kilometres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadiusRange {
    pub min_km: u32,
    pub max_km: u32,
}

impl Default for RadiusRange {
    fn default() -> Self {
        Self {
            min_km: 1,
            max_km: 10,
        }
    }
}

impl RadiusRange {
    /// Clamp raw slider input into the range.
    pub fn clamp(&self, km: i64) -> u32 {
        km.clamp(self.min_km as i64, self.max_km as i64) as u32
    }

    pub fn contains(&self, km: u32) -> bool {
        (self.min_km..=self.max_km).contains(&km)
    }
}
