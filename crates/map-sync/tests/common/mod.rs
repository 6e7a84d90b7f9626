//! Common helpers for map-sync integration tests.
//!
//! Provides:
//! - `RecordingSurface`, a `MapSurface` that records what it was told and
//!   panics on lifecycle violations (two popups, two markers for one station)
//! - `Harness`, which runs a `StationMap` against a `FakeRepository`

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use map_sync::{
    FormView, MapEvent, MapSurface, Marker, MarkerKey, Notice, PopupContent, PopupKey,
    SessionEnd, StationMap, SyncConfig, SyncMetrics, ViewportState,
};
use station_common::{BoundingBox, GeoPoint, Station, StationId};
use test_utils::FakeRepository;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub struct SurfaceState {
    pub markers: HashMap<MarkerKey, Marker>,
    pub markers_added: usize,
    pub markers_removed: usize,
    pub popup: Option<(PopupKey, PopupContent)>,
    pub popups_closed: Vec<PopupKey>,
    pub fly_tos: Vec<(GeoPoint, f64)>,
    pub bounds: Option<BoundingBox>,
    pub notice: Option<Notice>,
    pub notices: Vec<Notice>,
    pub loading: bool,
    pub station_count: Option<usize>,
    pub operator: Option<String>,
    pub form: Option<FormView>,
    pub forms_closed: usize,
    pub confirmation: Option<Station>,
}

impl SurfaceState {
    pub fn marker_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.markers.keys().map(|k| k.station.0).collect();
        ids.sort_unstable();
        ids
    }

    pub fn marker_key(&self, id: i64) -> Option<MarkerKey> {
        self.markers.keys().find(|k| k.station == StationId(id)).copied()
    }

    pub fn popup_key(&self) -> Option<PopupKey> {
        self.popup.as_ref().map(|(key, _)| *key)
    }

    pub fn popup_station(&self) -> Option<i64> {
        self.popup.as_ref().map(|(_, content)| content.station.0)
    }
}

/// Cloneable handle; clones share the recorded state.
#[derive(Clone, Default)]
pub struct RecordingSurface {
    state: Arc<Mutex<SurfaceState>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Surface that reports `bounds` as the visible frame.
    pub fn with_bounds(bounds: BoundingBox) -> Self {
        let surface = Self::new();
        surface.state().bounds = Some(bounds);
        surface
    }

    pub fn state(&self) -> MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap()
    }
}

impl MapSurface for RecordingSurface {
    fn add_marker(&mut self, marker: &Marker) {
        let mut state = self.state();
        assert!(
            !state.markers.keys().any(|k| k.station == marker.key.station),
            "second marker added for station {}",
            marker.key.station
        );
        state.markers.insert(marker.key, marker.clone());
        state.markers_added += 1;
    }

    fn remove_marker(&mut self, key: MarkerKey) {
        let mut state = self.state();
        assert!(state.markers.remove(&key).is_some(), "removed unknown {}", key);
        state.markers_removed += 1;
    }

    fn open_popup(&mut self, key: PopupKey, content: &PopupContent) {
        let mut state = self.state();
        assert!(state.popup.is_none(), "popup opened over an open one");
        state.popup = Some((key, content.clone()));
    }

    fn close_popup(&mut self, key: PopupKey) {
        let mut state = self.state();
        assert_eq!(state.popup_key(), Some(key), "closed a popup that is not open");
        state.popup = None;
        state.popups_closed.push(key);
    }

    fn fly_to(&mut self, center: GeoPoint, zoom: f64) {
        self.state().fly_tos.push((center, zoom));
    }

    fn visible_bounds(&self) -> Option<BoundingBox> {
        self.state().bounds
    }

    fn show_notice(&mut self, notice: &Notice) {
        let mut state = self.state();
        state.notice = Some(notice.clone());
        state.notices.push(notice.clone());
    }

    fn clear_notice(&mut self) {
        self.state().notice = None;
    }

    fn set_loading(&mut self, loading: bool) {
        self.state().loading = loading;
    }

    fn set_station_count(&mut self, count: usize) {
        self.state().station_count = Some(count);
    }

    fn set_operator(&mut self, username: Option<&str>) {
        self.state().operator = username.map(str::to_string);
    }

    fn show_form(&mut self, form: &FormView) {
        self.state().form = Some(form.clone());
    }

    fn close_form(&mut self) {
        let mut state = self.state();
        state.form = None;
        state.forms_closed += 1;
    }

    fn confirm_delete(&mut self, station: &Station) {
        self.state().confirmation = Some(station.clone());
    }

    fn close_confirmation(&mut self) {
        self.state().confirmation = None;
    }
}

/// A running `StationMap` with handles to everything around it.
pub struct Harness {
    pub repo: Arc<FakeRepository>,
    pub surface: RecordingSurface,
    pub metrics: Arc<SyncMetrics>,
    pub viewport: ViewportState,
    events: mpsc::Sender<MapEvent>,
    handle: JoinHandle<SessionEnd>,
}

impl Harness {
    /// Spawn the map and let the initial load finish.
    pub async fn start(repo: FakeRepository, surface: RecordingSurface) -> Self {
        Self::start_with(repo, surface, SyncConfig::default()).await
    }

    pub async fn start_with(
        repo: FakeRepository,
        surface: RecordingSurface,
        config: SyncConfig,
    ) -> Self {
        let repo = Arc::new(repo);
        let map = StationMap::new(Arc::clone(&repo), surface.clone(), config);
        let metrics = map.metrics();
        let viewport = map.viewport();
        let (events, rx) = mpsc::channel(64);
        let handle = tokio::spawn(map.run(rx));
        settle().await;

        Self {
            repo,
            surface,
            metrics,
            viewport,
            events,
            handle,
        }
    }

    /// Deliver an event and let the map react.
    pub async fn send(&self, event: MapEvent) {
        self.events.send(event).await.unwrap();
        settle().await;
    }

    pub fn surface(&self) -> MutexGuard<'_, SurfaceState> {
        self.surface.state()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the loop to stop on its own.
    pub async fn ended(self) -> SessionEnd {
        self.handle.await.unwrap()
    }

    /// Close the event channel and wait for the loop to stop.
    pub async fn close(self) -> SessionEnd {
        drop(self.events);
        self.handle.await.unwrap()
    }
}

/// Let every task run until it blocks, advancing the paused clock by 1 ms.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Advance the paused clock, firing any timers on the way.
pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
