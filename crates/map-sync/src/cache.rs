//! The last successfully loaded set of stations.

use station_common::{Station, StationId};

/// Stations currently displayed, in the order the service returned them.
///
/// Every change bumps `revision`, which the marker manager uses to decide
/// whether a rebuild is due.
#[derive(Debug, Default, Clone)]
pub struct StationCache {
    stations: Vec<Station>,
    revision: u64,
}

impl StationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole set with a query result.
    pub fn replace(&mut self, stations: Vec<Station>) {
        self.stations = stations;
        self.revision += 1;
    }

    /// Insert a station, or replace the one with the same id in place.
    pub fn upsert(&mut self, station: Station) {
        match self.stations.iter_mut().find(|s| s.id == station.id) {
            Some(existing) => *existing = station,
            None => self.stations.push(station),
        }
        self.revision += 1;
    }

    pub fn remove(&mut self, id: StationId) -> Option<Station> {
        let index = self.stations.iter().position(|s| s.id == id)?;
        self.revision += 1;
        Some(self.stations.remove(index))
    }

    pub fn get(&self, id: StationId) -> Option<&Station> {
        self.stations.iter().find(|s| s.id == id)
    }

    pub fn contains(&self, id: StationId) -> bool {
        self.get(id).is_some()
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn ids(&self) -> Vec<StationId> {
        self.stations.iter().map(|s| s.id).collect()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use station_common::GeoPoint;

    fn station(id: i64, name: &str) -> Station {
        Station {
            id: StationId(id),
            code: None,
            name: name.to_string(),
            latitude: 48.85,
            longitude: 2.35,
            capacity: 20,
            address: None,
            distance_km: None,
        }
    }

    #[test]
    fn test_replace_is_wholesale() {
        let mut cache = StationCache::new();
        cache.replace(vec![station(1, "A"), station(2, "B")]);
        cache.replace(vec![station(3, "C")]);

        assert_eq!(cache.ids(), vec![StationId(3)]);
        assert_eq!(cache.revision(), 2);
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut cache = StationCache::new();
        cache.replace(vec![station(1, "A"), station(2, "B")]);

        cache.upsert(Station {
            name: "B2".to_string(),
            ..station(2, "B")
        });
        cache.upsert(station(3, "C"));

        assert_eq!(cache.ids(), vec![StationId(1), StationId(2), StationId(3)]);
        assert_eq!(cache.get(StationId(2)).map(|s| s.name.as_str()), Some("B2"));
    }

    #[test]
    fn test_remove_unknown_id_keeps_revision() {
        let mut cache = StationCache::new();
        cache.replace(vec![station(1, "A")]);
        let revision = cache.revision();

        assert!(cache.remove(StationId(9)).is_none());
        assert_eq!(cache.revision(), revision);

        let removed = cache.remove(StationId(1)).unwrap();
        assert_eq!(removed.position(), GeoPoint::new(48.85, 2.35));
        assert!(cache.is_empty());
    }
}
