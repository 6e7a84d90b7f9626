//! Common test fixtures for station map tests.
//!
//! Coordinates are real places in central Paris so distances stay plausible.

use std::io::Write;

use station_common::{GeoPoint, Station, StationId};
use tempfile::NamedTempFile;

/// Well-known positions.
pub mod places {
    use station_common::GeoPoint;

    /// Default map center (Hôtel de Ville area).
    pub const PARIS: GeoPoint = GeoPoint {
        latitude: 48.8566,
        longitude: 2.3522,
    };

    pub const LOUVRE: GeoPoint = GeoPoint {
        latitude: 48.8606,
        longitude: 2.3376,
    };

    pub const BASTILLE: GeoPoint = GeoPoint {
        latitude: 48.8533,
        longitude: 2.3692,
    };

    /// About 4.2 km west of the default center.
    pub const TOUR_EIFFEL: GeoPoint = GeoPoint {
        latitude: 48.8584,
        longitude: 2.2945,
    };

    /// Well outside any radius around Paris.
    pub const VERSAILLES: GeoPoint = GeoPoint {
        latitude: 48.8049,
        longitude: 2.1204,
    };
}

/// A station at `position` with default capacity and no address.
pub fn station(id: i64, name: &str, position: GeoPoint) -> Station {
    Station {
        id: StationId(id),
        code: Some(format!("STATION-{:08X}", id)),
        name: name.to_string(),
        latitude: position.latitude,
        longitude: position.longitude,
        capacity: 20,
        address: None,
        distance_km: None,
    }
}

/// "Station A": id 1, just north-east of the default center.
pub fn station_a() -> Station {
    Station {
        capacity: 35,
        address: Some("1 rue de Rivoli".to_string()),
        ..station(1, "Station A", GeoPoint::new(48.8570, 2.3530))
    }
}

/// Three stations within 5 km of the default center.
pub fn sample_stations() -> Vec<Station> {
    vec![
        station_a(),
        station(2, "Louvre - Rivoli", places::LOUVRE),
        station(3, "Bastille", places::BASTILLE),
    ]
}

/// Write `contents` to a temporary `.yaml` file that lives as long as the handle.
pub fn temp_yaml(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("create temp config file");
    file.write_all(contents.as_bytes())
        .expect("write temp config file");
    file
}
