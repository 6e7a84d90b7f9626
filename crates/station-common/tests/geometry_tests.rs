//! Geometry and wire-format tests for station-common.

use station_common::{BoundingBox, GeoPoint, RadiusRange, Station, StationDraft, StationId};
use test_utils::{assert_approx_eq, assert_point_approx_eq};

// ============================================================================
// Distances
// ============================================================================

#[test]
fn test_distance_is_symmetric() {
    let a = GeoPoint::new(48.8566, 2.3522);
    let b = GeoPoint::new(48.8606, 2.3376);
    assert_approx_eq!(a.distance_km(&b), b.distance_km(&a), 1e-9);
}

#[test]
fn test_short_distance_in_paris() {
    // Hôtel de Ville to the Louvre
    let d = GeoPoint::new(48.8566, 2.3522).distance_km(&GeoPoint::new(48.8606, 2.3376));
    assert_approx_eq!(d, 1.16, 0.05);
}

#[test]
fn test_zero_distance() {
    let p = GeoPoint::new(48.8566, 2.3522);
    assert_approx_eq!(p.distance_km(&p), 0.0, 1e-12);
}

// ============================================================================
// Bounding boxes
// ============================================================================

#[test]
fn test_frame_around_center_contains_nearby_points() {
    let center = GeoPoint::new(48.8566, 2.3522);
    let frame = BoundingBox::around(center, 5.0);

    assert_point_approx_eq!(frame.center(), center, 1e-9);
    assert!(frame.contains(&GeoPoint::new(48.8606, 2.3376)));
    assert!(!frame.contains(&GeoPoint::new(48.8049, 2.1204)));
}

#[test]
fn test_frame_is_wider_in_degrees_than_tall_at_mid_latitudes() {
    let frame = BoundingBox::around(GeoPoint::new(48.8566, 2.3522), 5.0);
    assert!(frame.width() > frame.height());
    assert_approx_eq!(frame.height(), 10.0 / 111.32, 1e-9);
}

#[test]
fn test_frame_is_clamped_at_the_poles() {
    let frame = BoundingBox::around(GeoPoint::new(89.99, 0.0), 50.0);
    assert!(frame.max_lat <= 90.0);
    assert!(frame.min_lon >= -180.0);
    assert!(frame.max_lon <= 180.0);
}

// ============================================================================
// Radius range
// ============================================================================

#[test]
fn test_radius_clamping() {
    let range = RadiusRange::default();
    assert_eq!(range.clamp(-3), 1);
    assert_eq!(range.clamp(0), 1);
    assert_eq!(range.clamp(5), 5);
    assert_eq!(range.clamp(10), 10);
    assert_eq!(range.clamp(250), 10);
    assert!(range.contains(7));
    assert!(!range.contains(11));
}

// ============================================================================
// Wire format
// ============================================================================

#[test]
fn test_query_result_decodes_with_distance_and_code() {
    let json = r#"[{
        "id": 1,
        "station_id": "16107",
        "name": "Station A",
        "latitude": 48.857,
        "longitude": 2.353,
        "capacity": 35,
        "address": "",
        "distance": 1.2
    }]"#;
    let stations: Vec<Station> = serde_json::from_str(json).unwrap();

    assert_eq!(stations.len(), 1);
    let s = &stations[0];
    assert_eq!(s.id, StationId(1));
    assert_eq!(s.code.as_deref(), Some("16107"));
    assert_eq!(s.address, None);
    assert_approx_eq!(s.distance_km.unwrap(), 1.2, 1e-12);
}

#[test]
fn test_missing_or_null_capacity_defaults_to_twenty() {
    let a: Station = serde_json::from_str(
        r#"{"id": 2, "name": "B", "latitude": 48.0, "longitude": 2.0}"#,
    )
    .unwrap();
    let b: Station = serde_json::from_str(
        r#"{"id": 3, "name": "C", "latitude": 48.0, "longitude": 2.0, "capacity": null}"#,
    )
    .unwrap();
    assert_eq!(a.capacity, 20);
    assert_eq!(b.capacity, 20);
}

#[test]
fn test_draft_payload_omits_missing_address() {
    let draft = StationDraft::new("Nation", GeoPoint::new(48.8483, 2.3958)).with_address("  ");
    let value = serde_json::to_value(&draft).unwrap();

    assert_eq!(value["name"], "Nation");
    assert_eq!(value["capacity"], 20);
    assert!(value.get("address").is_none());
}

#[test]
fn test_draft_validation() {
    assert!(StationDraft::new("Nation", GeoPoint::new(48.8, 2.3)).validate().is_ok());
    assert!(StationDraft::new("   ", GeoPoint::new(48.8, 2.3)).validate().is_err());
    assert!(StationDraft::new("Nowhere", GeoPoint::new(91.0, 2.3)).validate().is_err());
}
