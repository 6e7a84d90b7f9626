//! Geographic bounding boxes, used to describe the visible map frame.

use serde::{Deserialize, Serialize};

use crate::geo::{GeoPoint, KM_PER_DEGREE};

/// A geographic bounding box in degrees (EPSG:4326).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Box extending `half_extent_km` from `center` in every direction.
    ///
    /// Longitude span widens with latitude; clamped to the WGS84 ranges.
    pub fn around(center: GeoPoint, half_extent_km: f64) -> Self {
        let lat_rad = center.latitude.to_radians();

        let deg_per_km_lat = 1.0 / KM_PER_DEGREE;
        // Avoid division by zero near the poles
        let deg_per_km_lon = 1.0 / (KM_PER_DEGREE * lat_rad.cos().max(0.01));

        let delta_lat = half_extent_km * deg_per_km_lat;
        let delta_lon = half_extent_km * deg_per_km_lon;

        Self::new(
            (center.longitude - delta_lon).max(-180.0),
            (center.latitude - delta_lat).max(-90.0),
            (center.longitude + delta_lon).min(180.0),
            (center.latitude + delta_lat).min(90.0),
        )
    }

    /// Width of the bounding box in degrees of longitude.
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Height of the bounding box in degrees of latitude.
    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Midpoint of the box.
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    /// Check if a point lies within this box (edges included).
    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.longitude >= self.min_lon
            && point.longitude <= self.max_lon
            && point.latitude >= self.min_lat
            && point.latitude <= self.max_lat
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.5},{:.5},{:.5},{:.5}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}
