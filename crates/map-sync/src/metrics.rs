//! Counters for reloads, mutations and markers.
//!
//! Every event is counted twice: in process atomics readable through
//! [`SyncMetrics::snapshot`], and through the `metrics` facade for whatever
//! recorder the binary installs.

use std::sync::atomic::{AtomicU64, Ordering};

use metrics::{counter, gauge};
use serde::Serialize;

use crate::mutation::MutationKind;

#[derive(Debug, Default)]
pub struct SyncMetrics {
    reloads_issued: AtomicU64,
    reloads_applied: AtomicU64,
    reloads_stale: AtomicU64,
    reloads_failed: AtomicU64,
    reload_retries: AtomicU64,
    mutations_succeeded: AtomicU64,
    mutations_failed: AtomicU64,
    marker_rebuilds: AtomicU64,
    markers: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SyncMetricsSnapshot {
    pub reloads_issued: u64,
    pub reloads_applied: u64,
    pub reloads_stale: u64,
    pub reloads_failed: u64,
    pub reload_retries: u64,
    pub mutations_succeeded: u64,
    pub mutations_failed: u64,
    pub marker_rebuilds: u64,
    pub markers: u64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_reload_issued(&self) {
        self.reloads_issued.fetch_add(1, Ordering::Relaxed);
        counter!("station_reloads_issued_total").increment(1);
    }

    pub fn record_reload_applied(&self) {
        self.reloads_applied.fetch_add(1, Ordering::Relaxed);
        counter!("station_reloads_total", "outcome" => "applied").increment(1);
    }

    pub fn record_reload_stale(&self) {
        self.reloads_stale.fetch_add(1, Ordering::Relaxed);
        counter!("station_reloads_total", "outcome" => "stale").increment(1);
    }

    pub fn record_reload_failed(&self, will_retry: bool) {
        self.reloads_failed.fetch_add(1, Ordering::Relaxed);
        counter!("station_reloads_total", "outcome" => "failed").increment(1);
        if will_retry {
            self.reload_retries.fetch_add(1, Ordering::Relaxed);
            counter!("station_reload_retries_total").increment(1);
        }
    }

    pub fn record_mutation(&self, kind: MutationKind, succeeded: bool) {
        let outcome = if succeeded {
            self.mutations_succeeded.fetch_add(1, Ordering::Relaxed);
            "succeeded"
        } else {
            self.mutations_failed.fetch_add(1, Ordering::Relaxed);
            "failed"
        };
        counter!(
            "station_mutations_total",
            "kind" => kind.as_str(),
            "outcome" => outcome
        )
        .increment(1);
    }

    pub fn record_markers_rebuilt(&self, count: usize) {
        self.marker_rebuilds.fetch_add(1, Ordering::Relaxed);
        self.markers.store(count as u64, Ordering::Relaxed);
        gauge!("station_markers").set(count as f64);
    }

    pub fn snapshot(&self) -> SyncMetricsSnapshot {
        SyncMetricsSnapshot {
            reloads_issued: self.reloads_issued.load(Ordering::Relaxed),
            reloads_applied: self.reloads_applied.load(Ordering::Relaxed),
            reloads_stale: self.reloads_stale.load(Ordering::Relaxed),
            reloads_failed: self.reloads_failed.load(Ordering::Relaxed),
            reload_retries: self.reload_retries.load(Ordering::Relaxed),
            mutations_succeeded: self.mutations_succeeded.load(Ordering::Relaxed),
            mutations_failed: self.mutations_failed.load(Ordering::Relaxed),
            marker_rebuilds: self.marker_rebuilds.load(Ordering::Relaxed),
            markers: self.markers.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts_without_recorder() {
        let metrics = SyncMetrics::new();
        metrics.record_reload_issued();
        metrics.record_reload_applied();
        metrics.record_reload_failed(true);
        metrics.record_reload_failed(false);
        metrics.record_mutation(MutationKind::Delete, true);
        metrics.record_markers_rebuilt(3);
        metrics.record_markers_rebuilt(2);

        let snap = metrics.snapshot();
        assert_eq!(snap.reloads_issued, 1);
        assert_eq!(snap.reloads_failed, 2);
        assert_eq!(snap.reload_retries, 1);
        assert_eq!(snap.mutations_succeeded, 1);
        assert_eq!(snap.marker_rebuilds, 2);
        assert_eq!(snap.markers, 2);
    }
}
