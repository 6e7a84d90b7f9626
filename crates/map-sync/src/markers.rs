//! Marker and popup lifecycle.
//!
//! Markers are rebuilt from scratch on every cache change: all current ones
//! are removed from the surface, then exactly one is added per cached station.
//! Each rebuild starts a new generation, and a marker's key carries the
//! generation it was built in, so a click on a marker from an earlier build
//! resolves to nothing instead of to whatever station now has that id.
//!
//! At most one popup is open. It holds a snapshot of its station taken when it
//! opened; its actions act on that snapshot, not on later cache contents.

use std::collections::HashSet;

use station_common::{GeoPoint, Station, StationId};
use tracing::debug;

use crate::cache::StationCache;
use crate::surface::MapSurface;

/// Identity of a marker within one build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerKey {
    pub generation: u64,
    pub station: StationId,
}

impl std::fmt::Display for MarkerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "marker {}#{}", self.station, self.generation)
    }
}

/// Identity of one opened popup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PopupKey(pub u64);

impl std::fmt::Display for PopupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "popup #{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub key: MarkerKey,
    pub position: GeoPoint,
    pub title: String,
}

/// What a station popup shows.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupContent {
    pub station: StationId,
    pub title: String,
    pub code: Option<String>,
    pub capacity: u32,
    pub address: Option<String>,
    pub distance_km: Option<f64>,
}

impl PopupContent {
    pub fn for_station(station: &Station) -> Self {
        Self {
            station: station.id,
            title: station.name.clone(),
            code: station.code.clone(),
            capacity: station.capacity,
            address: station.address.clone(),
            distance_km: station.distance_km,
        }
    }

    /// Text lines in display order.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![self.title.clone()];
        if let Some(code) = &self.code {
            lines.push(format!("Code: {}", code));
        }
        lines.push(format!("Capacity: {} bikes", self.capacity));
        lines.push(format!(
            "Address: {}",
            self.address.as_deref().unwrap_or("not provided")
        ));
        if let Some(distance) = self.distance_km {
            lines.push(format!("Distance: {:.2} km", distance));
        }
        lines
    }
}

/// The popup currently on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPopup {
    pub key: PopupKey,
    /// Station as it was when the popup opened.
    pub station: Station,
}

#[derive(Debug, Default)]
pub struct MarkerManager {
    generation: u64,
    markers: Vec<Marker>,
    built_revision: Option<u64>,
    popup: Option<OpenPopup>,
    popups_opened: u64,
}

impl MarkerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild if the cache changed since the last build. Returns whether it did.
    pub fn sync(&mut self, cache: &StationCache, surface: &mut dyn MapSurface) -> bool {
        if self.built_revision == Some(cache.revision()) {
            return false;
        }
        self.rebuild(cache, surface);
        true
    }

    /// Tear down every marker and build one per cached station.
    ///
    /// The open popup survives only if its station is still cached.
    pub fn rebuild(&mut self, cache: &StationCache, surface: &mut dyn MapSurface) {
        for marker in self.markers.drain(..) {
            surface.remove_marker(marker.key);
        }
        self.generation += 1;

        let mut seen = HashSet::new();
        for station in cache.stations() {
            if !seen.insert(station.id) {
                debug!(station = %station.id, "Duplicate station in cache, skipping marker");
                continue;
            }
            let marker = Marker {
                key: MarkerKey {
                    generation: self.generation,
                    station: station.id,
                },
                position: station.position(),
                title: station.name.clone(),
            };
            surface.add_marker(&marker);
            self.markers.push(marker);
        }

        let orphaned = self
            .popup
            .as_ref()
            .map(|p| p.station.id)
            .filter(|id| !cache.contains(*id));
        if let Some(id) = orphaned {
            debug!(station = %id, "Station left the map, closing its popup");
            self.close_popup(surface);
        }

        self.built_revision = Some(cache.revision());
        debug!(
            generation = self.generation,
            markers = self.markers.len(),
            "Markers rebuilt"
        );
    }

    /// Station behind a clicked marker, if the marker is from the current build.
    pub fn resolve_click(&self, key: MarkerKey) -> Option<StationId> {
        if key.generation != self.generation {
            return None;
        }
        self.markers
            .iter()
            .find(|m| m.key == key)
            .map(|m| m.key.station)
    }

    /// Open a popup for `station`, closing any open one first.
    pub fn open_popup(&mut self, station: &Station, surface: &mut dyn MapSurface) -> PopupKey {
        self.close_popup(surface);

        self.popups_opened += 1;
        let key = PopupKey(self.popups_opened);
        surface.open_popup(key, &PopupContent::for_station(station));
        self.popup = Some(OpenPopup {
            key,
            station: station.clone(),
        });
        key
    }

    /// The open popup, if `key` still names it.
    pub fn resolve_popup(&self, key: PopupKey) -> Option<&OpenPopup> {
        self.popup.as_ref().filter(|p| p.key == key)
    }

    pub fn close_popup(&mut self, surface: &mut dyn MapSurface) -> Option<OpenPopup> {
        let open = self.popup.take()?;
        surface.close_popup(open.key);
        Some(open)
    }

    /// Close the popup if it belongs to `station`.
    pub fn close_popup_for(&mut self, station: StationId, surface: &mut dyn MapSurface) -> bool {
        if self.popup.as_ref().map(|p| p.station.id) != Some(station) {
            return false;
        }
        self.close_popup(surface).is_some()
    }

    /// Remove everything from the surface.
    pub fn clear(&mut self, surface: &mut dyn MapSurface) {
        self.close_popup(surface);
        for marker in self.markers.drain(..) {
            surface.remove_marker(marker.key);
        }
        self.built_revision = None;
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn marker_for(&self, station: StationId) -> Option<&Marker> {
        self.markers.iter().find(|m| m.key.station == station)
    }

    pub fn popup(&self) -> Option<&OpenPopup> {
        self.popup.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::FormView;
    use crate::surface::Notice;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Canvas {
        markers: HashMap<MarkerKey, Marker>,
        popup: Option<PopupKey>,
        popups_closed: Vec<PopupKey>,
    }

    impl MapSurface for Canvas {
        fn add_marker(&mut self, marker: &Marker) {
            self.markers.insert(marker.key, marker.clone());
        }
        fn remove_marker(&mut self, key: MarkerKey) {
            self.markers.remove(&key);
        }
        fn open_popup(&mut self, key: PopupKey, _content: &PopupContent) {
            assert!(self.popup.is_none(), "popup opened over another one");
            self.popup = Some(key);
        }
        fn close_popup(&mut self, key: PopupKey) {
            assert_eq!(self.popup, Some(key));
            self.popup = None;
            self.popups_closed.push(key);
        }
        fn fly_to(&mut self, _center: GeoPoint, _zoom: f64) {}
        fn show_notice(&mut self, _notice: &Notice) {}
        fn clear_notice(&mut self) {}
        fn show_form(&mut self, _form: &FormView) {}
        fn close_form(&mut self) {}
        fn confirm_delete(&mut self, _station: &Station) {}
        fn close_confirmation(&mut self) {}
    }

    fn station(id: i64) -> Station {
        Station {
            id: StationId(id),
            code: None,
            name: format!("Station {}", id),
            latitude: 48.85 + id as f64 * 0.001,
            longitude: 2.35,
            capacity: 20,
            address: None,
            distance_km: Some(0.5),
        }
    }

    fn cache_of(ids: &[i64]) -> StationCache {
        let mut cache = StationCache::new();
        cache.replace(ids.iter().map(|&id| station(id)).collect());
        cache
    }

    #[test]
    fn test_rebuild_keeps_one_marker_per_station() {
        let mut canvas = Canvas::default();
        let mut manager = MarkerManager::new();

        manager.rebuild(&cache_of(&[1, 2, 3]), &mut canvas);
        manager.rebuild(&cache_of(&[2, 3, 4]), &mut canvas);
        manager.rebuild(&cache_of(&[2, 3, 4]), &mut canvas);

        assert_eq!(canvas.markers.len(), 3);
        assert_eq!(manager.marker_count(), 3);
        let mut ids: Vec<i64> = canvas.markers.keys().map(|k| k.station.0).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn test_duplicate_ids_get_a_single_marker() {
        let mut canvas = Canvas::default();
        let mut manager = MarkerManager::new();
        let mut cache = StationCache::new();
        cache.replace(vec![station(1), station(1)]);

        manager.rebuild(&cache, &mut canvas);
        assert_eq!(canvas.markers.len(), 1);
    }

    #[test]
    fn test_click_from_previous_build_resolves_to_nothing() {
        let mut canvas = Canvas::default();
        let mut manager = MarkerManager::new();

        manager.rebuild(&cache_of(&[1]), &mut canvas);
        let old_key = manager.marker_for(StationId(1)).unwrap().key;
        assert_eq!(manager.resolve_click(old_key), Some(StationId(1)));

        manager.rebuild(&cache_of(&[1]), &mut canvas);
        assert_eq!(manager.resolve_click(old_key), None);
        let new_key = manager.marker_for(StationId(1)).unwrap().key;
        assert_eq!(manager.resolve_click(new_key), Some(StationId(1)));
    }

    #[test]
    fn test_sync_skips_unchanged_cache() {
        let mut canvas = Canvas::default();
        let mut manager = MarkerManager::new();
        let cache = cache_of(&[1, 2]);

        assert!(manager.sync(&cache, &mut canvas));
        let generation = manager.generation();
        assert!(!manager.sync(&cache, &mut canvas));
        assert_eq!(manager.generation(), generation);
    }

    #[test]
    fn test_opening_a_popup_disposes_the_previous_one() {
        let mut canvas = Canvas::default();
        let mut manager = MarkerManager::new();

        let first = manager.open_popup(&station(1), &mut canvas);
        let second = manager.open_popup(&station(2), &mut canvas);

        assert_ne!(first, second);
        assert_eq!(canvas.popups_closed, vec![first]);
        assert!(manager.resolve_popup(first).is_none());
        assert_eq!(
            manager.resolve_popup(second).map(|p| p.station.id),
            Some(StationId(2))
        );
    }

    #[test]
    fn test_popup_closes_when_its_station_leaves_the_cache() {
        let mut canvas = Canvas::default();
        let mut manager = MarkerManager::new();
        manager.rebuild(&cache_of(&[1, 2]), &mut canvas);

        let key = manager.open_popup(&station(1), &mut canvas);
        manager.rebuild(&cache_of(&[1, 2]), &mut canvas);
        assert!(manager.resolve_popup(key).is_some());

        manager.rebuild(&cache_of(&[2]), &mut canvas);
        assert!(manager.popup().is_none());
        assert_eq!(canvas.popup, None);
    }

    #[test]
    fn test_popup_lines() {
        let content = PopupContent {
            code: Some("16107".to_string()),
            ..PopupContent::for_station(&station(1))
        };
        assert_eq!(
            content.lines(),
            vec![
                "Station 1".to_string(),
                "Code: 16107".to_string(),
                "Capacity: 20 bikes".to_string(),
                "Address: not provided".to_string(),
                "Distance: 0.50 km".to_string(),
            ]
        );
    }
}
