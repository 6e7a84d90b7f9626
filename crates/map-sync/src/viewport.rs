//! Viewport state: where the map is centered and how far to search.
//!
//! Changes are published on a `watch` channel. The reconciler subscribes to
//! it and debounces; other observers (a status line, tests) may subscribe too.

use std::sync::Arc;

use station_common::{GeoPoint, RadiusRange};
use tokio::sync::watch;
use tracing::debug;

/// Snapshot of the map view that drives station queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub center: GeoPoint,
    pub radius_km: u32,
    pub zoom: f64,
}

/// Owner of the current viewport. Clones share the same state.
#[derive(Debug, Clone)]
pub struct ViewportState {
    tx: Arc<watch::Sender<Viewport>>,
    range: RadiusRange,
}

impl ViewportState {
    /// Start at `initial`; its radius is clamped into `range`.
    pub fn new(initial: Viewport, range: RadiusRange) -> Self {
        let initial = Viewport {
            radius_km: range.clamp(initial.radius_km as i64),
            ..initial
        };
        let (tx, _rx) = watch::channel(initial);
        Self {
            tx: Arc::new(tx),
            range,
        }
    }

    pub fn current(&self) -> Viewport {
        *self.tx.borrow()
    }

    /// Record the settled center after a pan or zoom gesture.
    ///
    /// Returns whether anything changed; observers are only notified on change.
    pub fn set_center(&self, center: GeoPoint, zoom: f64) -> bool {
        self.tx.send_if_modified(|viewport| {
            if viewport.center == center && viewport.zoom == zoom {
                return false;
            }
            debug!(center = %center, zoom, "Viewport center changed");
            viewport.center = center;
            viewport.zoom = zoom;
            true
        })
    }

    /// Apply raw radius input, clamped into the configured range.
    ///
    /// Returns the radius actually stored.
    pub fn set_radius(&self, raw_km: i64) -> u32 {
        let radius = self.range.clamp(raw_km);
        self.tx.send_if_modified(|viewport| {
            if viewport.radius_km == radius {
                return false;
            }
            debug!(requested = raw_km, radius, "Viewport radius changed");
            viewport.radius_km = radius;
            true
        });
        radius
    }

    pub fn subscribe(&self) -> watch::Receiver<Viewport> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paris() -> Viewport {
        Viewport {
            center: GeoPoint::new(48.8566, 2.3522),
            radius_km: 5,
            zoom: 13.0,
        }
    }

    #[test]
    fn test_radius_is_clamped() {
        let state = ViewportState::new(paris(), RadiusRange::default());
        assert_eq!(state.set_radius(0), 1);
        assert_eq!(state.set_radius(-4), 1);
        assert_eq!(state.set_radius(25), 10);
        assert_eq!(state.current().radius_km, 10);
    }

    #[test]
    fn test_initial_radius_is_clamped() {
        let state = ViewportState::new(
            Viewport {
                radius_km: 40,
                ..paris()
            },
            RadiusRange::default(),
        );
        assert_eq!(state.current().radius_km, 10);
    }

    #[tokio::test]
    async fn test_only_real_changes_notify() {
        let state = ViewportState::new(paris(), RadiusRange::default());
        let mut rx = state.subscribe();

        assert!(!state.set_center(GeoPoint::new(48.8566, 2.3522), 13.0));
        state.set_radius(5);
        assert!(!rx.has_changed().unwrap());

        assert!(state.set_center(GeoPoint::new(48.86, 2.35), 14.0));
        assert!(rx.has_changed().unwrap());
        let seen = *rx.borrow_and_update();
        assert_eq!(seen.center, GeoPoint::new(48.86, 2.35));
        assert_eq!(seen.zoom, 14.0);
    }

    #[test]
    fn test_subscriber_is_woken_by_change() {
        let state = ViewportState::new(paris(), RadiusRange::default());
        let mut rx = state.subscribe();

        let mut changed = tokio_test::task::spawn(rx.changed());
        tokio_test::assert_pending!(changed.poll());

        state.set_radius(8);
        assert!(changed.is_woken());
        tokio_test::assert_ready_ok!(changed.poll());
        drop(changed);

        assert_eq!(rx.borrow().radius_km, 8);
    }
}
