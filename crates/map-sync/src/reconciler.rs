//! Reload scheduling for the station cache.
//!
//! The reconciler decides *when* a query is sent and *whether* its result is
//! applied; it performs no I/O itself. The event loop turns each
//! [`ReloadTicket`] into a repository call and hands the result back through
//! [`Reconciler::complete`].
//!
//! Rules:
//! - viewport changes arm a debounce deadline; only its expiry issues a query
//! - at most one query is outstanding; requests made meanwhile collapse into a
//!   single trailing query sent when it completes
//! - every query carries a sequence number and only the latest issued one may
//!   touch the cache; anything older is discarded on arrival
//! - forced reloads skip the debounce and supersede whatever is in flight
//! - a failed query leaves the cache as it was

use std::time::Duration;

use station_common::{GeoPoint, Station, StationError, StationResult};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::StationCache;
use crate::config::SyncConfig;
use crate::mutation::MutationOutcome;
use crate::viewport::Viewport;

/// A query the event loop must send.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReloadTicket {
    pub seq: u64,
    pub center: GeoPoint,
    pub radius_km: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReloadOutcome {
    /// The cache now holds `count` stations.
    Applied { count: usize },
    /// Superseded by a newer query; ignored.
    Stale,
    /// Cache untouched. `retry_in` is set when a retry has been scheduled.
    Failed {
        error: StationError,
        retry_in: Option<Duration>,
    },
}

/// Result of handing a query response back to the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub outcome: ReloadOutcome,
    /// Trailing query to send now, if requests were coalesced meanwhile.
    pub follow_up: Option<ReloadTicket>,
}

pub struct Reconciler {
    cache: StationCache,
    config: SyncConfig,
    last_issued: u64,
    in_flight: Option<u64>,
    trailing: bool,
    debounce_deadline: Option<Instant>,
    retry_deadline: Option<Instant>,
    retry_attempt: u32,
}

impl Reconciler {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            cache: StationCache::new(),
            config,
            last_issued: 0,
            in_flight: None,
            trailing: false,
            debounce_deadline: None,
            retry_deadline: None,
            retry_attempt: 0,
        }
    }

    pub fn cache(&self) -> &StationCache {
        &self.cache
    }

    /// True while a query whose result will be applied is outstanding.
    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn last_issued(&self) -> u64 {
        self.last_issued
    }

    pub fn debounce_deadline(&self) -> Option<Instant> {
        self.debounce_deadline
    }

    pub fn retry_deadline(&self) -> Option<Instant> {
        self.retry_deadline
    }

    /// The viewport changed: (re)arm the debounce deadline.
    ///
    /// A pending retry is dropped; the debounced query replaces it.
    pub fn viewport_changed(&mut self, now: Instant) {
        self.debounce_deadline = Some(now + self.config.debounce());
        self.clear_retry();
    }

    /// The debounce deadline passed.
    pub fn debounce_elapsed(&mut self, viewport: &Viewport) -> Option<ReloadTicket> {
        self.debounce_deadline = None;
        self.request(viewport)
    }

    /// The retry deadline passed.
    pub fn retry_elapsed(&mut self, viewport: &Viewport) -> Option<ReloadTicket> {
        self.retry_deadline = None;
        self.request(viewport)
    }

    /// Reload now, skipping the debounce. Anything in flight becomes stale.
    pub fn force(&mut self, viewport: &Viewport) -> ReloadTicket {
        self.debounce_deadline = None;
        self.clear_retry();
        if let Some(seq) = self.in_flight {
            debug!(superseded = seq, "Forced reload supersedes in-flight query");
        }
        self.issue(viewport)
    }

    /// Drop every pending query, deadline and in-flight result.
    pub fn cancel_pending(&mut self) {
        if let Some(seq) = self.in_flight.take() {
            debug!(seq, "In-flight query invalidated");
        }
        self.trailing = false;
        self.debounce_deadline = None;
        self.clear_retry();
    }

    /// Apply a confirmed mutation to the cache ahead of the next reload.
    ///
    /// Queries sent before the mutation are invalidated so they cannot
    /// overwrite the result. Returns whether the cache changed.
    pub fn apply_local(&mut self, outcome: &MutationOutcome) -> bool {
        self.cancel_pending();
        match outcome {
            MutationOutcome::Created(station) | MutationOutcome::Updated(station) => {
                self.cache.upsert(station.clone());
                true
            }
            MutationOutcome::Deleted(id) => self.cache.remove(*id).is_some(),
        }
    }

    /// Hand back the result of query `seq`.
    pub fn complete(
        &mut self,
        seq: u64,
        result: StationResult<Vec<Station>>,
        viewport: &Viewport,
        now: Instant,
    ) -> Completion {
        if self.in_flight != Some(seq) {
            debug!(seq, latest = self.last_issued, "Discarding stale query result");
            return Completion {
                outcome: ReloadOutcome::Stale,
                follow_up: None,
            };
        }
        self.in_flight = None;

        let outcome = match result {
            Ok(stations) => {
                let count = stations.len();
                self.cache.replace(stations);
                self.retry_attempt = 0;
                info!(seq, count, "Station cache replaced");
                ReloadOutcome::Applied { count }
            }
            Err(error) => {
                let retry_in = self.schedule_retry(&error, now);
                warn!(
                    seq,
                    error = %error,
                    retry_in_ms = retry_in.map(|d| d.as_millis() as u64),
                    "Station reload failed, keeping previous stations"
                );
                ReloadOutcome::Failed { error, retry_in }
            }
        };

        let follow_up = if self.trailing {
            self.clear_retry();
            Some(self.issue(viewport))
        } else {
            None
        };

        Completion { outcome, follow_up }
    }

    fn request(&mut self, viewport: &Viewport) -> Option<ReloadTicket> {
        if let Some(seq) = self.in_flight {
            debug!(in_flight = seq, "Reload coalesced behind in-flight query");
            self.trailing = true;
            return None;
        }
        Some(self.issue(viewport))
    }

    fn issue(&mut self, viewport: &Viewport) -> ReloadTicket {
        self.last_issued += 1;
        self.in_flight = Some(self.last_issued);
        self.trailing = false;
        ReloadTicket {
            seq: self.last_issued,
            center: viewport.center,
            radius_km: viewport.radius_km,
        }
    }

    fn schedule_retry(&mut self, error: &StationError, now: Instant) -> Option<Duration> {
        if !error.is_retryable() || self.retry_attempt >= self.config.max_reload_retries {
            self.retry_attempt = 0;
            return None;
        }
        let delay = self.config.retry_delay(self.retry_attempt);
        self.retry_attempt += 1;
        self.retry_deadline = Some(now + delay);
        Some(delay)
    }

    fn clear_retry(&mut self) {
        self.retry_deadline = None;
        self.retry_attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use station_common::StationId;

    fn viewport() -> Viewport {
        Viewport {
            center: GeoPoint::new(48.8566, 2.3522),
            radius_km: 5,
            zoom: 13.0,
        }
    }

    fn station(id: i64) -> Station {
        Station {
            id: StationId(id),
            code: None,
            name: format!("Station {}", id),
            latitude: 48.85,
            longitude: 2.35,
            capacity: 20,
            address: None,
            distance_km: None,
        }
    }

    #[test]
    fn test_request_while_in_flight_is_coalesced() {
        let mut r = Reconciler::new(SyncConfig::default());
        let vp = viewport();
        let now = Instant::now();

        let first = r.debounce_elapsed(&vp).unwrap();
        assert!(r.debounce_elapsed(&vp).is_none());
        assert!(r.debounce_elapsed(&vp).is_none());

        let done = r.complete(first.seq, Ok(vec![station(1)]), &vp, now);
        assert_eq!(done.outcome, ReloadOutcome::Applied { count: 1 });
        let trailing = done.follow_up.unwrap();
        assert_eq!(trailing.seq, first.seq + 1);

        let done = r.complete(trailing.seq, Ok(vec![]), &vp, now);
        assert!(done.follow_up.is_none());
        assert!(!r.is_loading());
    }

    #[test]
    fn test_older_result_is_discarded_in_any_order() {
        let mut r = Reconciler::new(SyncConfig::default());
        let vp = viewport();
        let now = Instant::now();

        let old = r.force(&vp);
        let new = r.force(&vp);

        // Newer arrives first, older afterwards
        r.complete(new.seq, Ok(vec![station(2)]), &vp, now);
        let late = r.complete(old.seq, Ok(vec![station(1)]), &vp, now);

        assert_eq!(late.outcome, ReloadOutcome::Stale);
        assert_eq!(r.cache().ids(), vec![StationId(2)]);
    }

    #[test]
    fn test_failure_keeps_cache_and_schedules_retry() {
        let mut r = Reconciler::new(SyncConfig::default());
        let vp = viewport();
        let now = Instant::now();

        let t = r.force(&vp);
        r.complete(t.seq, Ok(vec![station(1), station(2), station(3)]), &vp, now);

        let t = r.force(&vp);
        let done = r.complete(t.seq, Err(StationError::Timeout), &vp, now);
        assert_eq!(
            done.outcome,
            ReloadOutcome::Failed {
                error: StationError::Timeout,
                retry_in: Some(Duration::from_secs(1)),
            }
        );
        assert_eq!(r.cache().len(), 3);
        assert_eq!(r.retry_deadline(), Some(now + Duration::from_secs(1)));
    }

    #[test]
    fn test_retries_stop_after_limit() {
        let mut r = Reconciler::new(SyncConfig::default());
        let vp = viewport();
        let now = Instant::now();

        let mut delays = Vec::new();
        let mut ticket = r.force(&vp);
        for _ in 0..3 {
            let done = r.complete(ticket.seq, Err(StationError::Network("down".into())), &vp, now);
            match done.outcome {
                ReloadOutcome::Failed { retry_in, .. } => delays.push(retry_in),
                other => panic!("unexpected outcome: {:?}", other),
            }
            match r.retry_elapsed(&vp) {
                Some(t) => ticket = t,
                None => break,
            }
        }
        assert_eq!(
            delays,
            vec![Some(Duration::from_secs(1)), Some(Duration::from_secs(2)), None]
        );
    }

    #[test]
    fn test_auth_failure_is_not_retried() {
        let mut r = Reconciler::new(SyncConfig::default());
        let vp = viewport();
        let t = r.force(&vp);
        let done = r.complete(t.seq, Err(StationError::SessionExpired), &vp, Instant::now());
        assert!(matches!(
            done.outcome,
            ReloadOutcome::Failed { retry_in: None, .. }
        ));
        assert_eq!(r.retry_deadline(), None);
    }

    #[test]
    fn test_local_apply_invalidates_in_flight_query() {
        let mut r = Reconciler::new(SyncConfig::default());
        let vp = viewport();
        let now = Instant::now();

        let t = r.force(&vp);
        r.complete(t.seq, Ok(vec![station(1)]), &vp, now);

        let before = r.force(&vp);
        assert!(r.apply_local(&MutationOutcome::Created(station(7))));
        assert_eq!(r.cache().ids(), vec![StationId(1), StationId(7)]);

        // The pre-mutation result would have dropped station 7
        let late = r.complete(before.seq, Ok(vec![station(1)]), &vp, now);
        assert_eq!(late.outcome, ReloadOutcome::Stale);
        assert!(r.cache().contains(StationId(7)));
    }

    #[test]
    fn test_viewport_change_arms_debounce_and_drops_retry() {
        let mut r = Reconciler::new(SyncConfig::default());
        let vp = viewport();
        let now = Instant::now();

        let t = r.force(&vp);
        r.complete(t.seq, Err(StationError::Timeout), &vp, now);
        assert!(r.retry_deadline().is_some());

        r.viewport_changed(now);
        assert_eq!(r.debounce_deadline(), Some(now + Duration::from_millis(300)));
        assert_eq!(r.retry_deadline(), None);
    }
}
