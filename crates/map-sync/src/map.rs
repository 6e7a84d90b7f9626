//! The station map event loop.
//!
//! `StationMap` owns the viewport, the reconciler, the marker manager and the
//! mutation controller, and is the only place they are touched. Everything
//! reaches it as a message: user input from the surface, repository results
//! from the tasks it spawned, viewport notifications, timer expiries and
//! session changes. Each message is handled to completion before the next, so
//! no state is shared with the spawned tasks.

use std::sync::Arc;

use station_client::{SessionState, StationRepository};
use station_common::{BoundingBox, GeoPoint, Station, StationError, StationResult};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::markers::{MarkerKey, MarkerManager, PopupKey};
use crate::metrics::SyncMetrics;
use crate::mutation::{
    Attempt, FormField, MutationController, MutationKind, MutationOutcome, MutationRequest,
};
use crate::reconciler::{ReloadOutcome, ReloadTicket, Reconciler};
use crate::surface::{MapSurface, Notice};
use crate::viewport::{Viewport, ViewportState};

/// Input reported by the surface.
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    /// A pan or zoom gesture settled.
    MoveEnd { center: GeoPoint, zoom: f64 },
    /// Raw radius slider value, in km.
    RadiusInput(i64),
    MarkerClicked(MarkerKey),
    /// Click on empty map. `modifier` is true when shift was held.
    MapClicked { at: GeoPoint, modifier: bool },
    PopupAction(PopupKey, PopupCommand),
    /// The "new station" button.
    NewStation,
    FormInput(FormField, String),
    FormSubmit,
    FormCancel,
    DeleteConfirmed,
    DeleteCancelled,
    DismissNotice,
    /// Reload now.
    Refresh,
    Logout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupCommand {
    Edit,
    Delete,
    Close,
}

/// Why the event loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The operator logged out.
    LoggedOut,
    /// The service rejected the credential.
    Revoked,
    /// The event channel closed.
    Closed,
}

enum Internal {
    Reload {
        seq: u64,
        result: StationResult<Vec<Station>>,
    },
    Mutation {
        attempt: u64,
        kind: MutationKind,
        result: StationResult<MutationOutcome>,
    },
}

/// Waiting for a fly-to to settle before reloading.
struct Recenter {
    target: GeoPoint,
    deadline: Instant,
}

pub struct StationMap<R, S> {
    repo: Arc<R>,
    surface: S,
    config: SyncConfig,
    viewport: ViewportState,
    viewport_changes: watch::Receiver<Viewport>,
    reconciler: Reconciler,
    markers: MarkerManager,
    mutations: MutationController,
    metrics: Arc<SyncMetrics>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    recenter: Option<Recenter>,
}

impl<R, S> StationMap<R, S>
where
    R: StationRepository + 'static,
    S: MapSurface,
{
    pub fn new(repo: Arc<R>, surface: S, config: SyncConfig) -> Self {
        let viewport = ViewportState::new(
            Viewport {
                center: config.initial_center,
                radius_km: config.initial_radius_km,
                zoom: config.initial_zoom,
            },
            config.radius_range,
        );
        let viewport_changes = viewport.subscribe();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        Self {
            repo,
            surface,
            reconciler: Reconciler::new(config.clone()),
            config,
            viewport,
            viewport_changes,
            markers: MarkerManager::new(),
            mutations: MutationController::new(),
            metrics: Arc::new(SyncMetrics::new()),
            internal_tx,
            internal_rx,
            recenter: None,
        }
    }

    /// Shared handle to the viewport, for observers.
    pub fn viewport(&self) -> ViewportState {
        self.viewport.clone()
    }

    pub fn metrics(&self) -> Arc<SyncMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run until logout, session revocation, or the event channel closing.
    pub async fn run(mut self, mut events: mpsc::Receiver<MapEvent>) -> SessionEnd {
        let mut session = self.repo.session().subscribe();
        let initial = session.borrow_and_update().clone();
        if let Some(end) = session_end(&initial) {
            warn!(?end, "Station map started without a signed-in session");
            return end;
        }

        let username = self.repo.session().username();
        self.surface.set_operator(username.as_deref());
        info!(
            username = username.as_deref().unwrap_or_default(),
            center = %self.viewport.current().center,
            radius_km = self.viewport.current().radius_km,
            "Station map started"
        );
        self.reload_now();

        let end = loop {
            let debounce_at = self.reconciler.debounce_deadline();
            let retry_at = self.reconciler.retry_deadline();
            let recenter_at = self.recenter.as_ref().map(|r| r.deadline);

            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        if let Some(end) = self.handle_event(event) {
                            break end;
                        }
                    }
                    None => break SessionEnd::Closed,
                },
                Some(internal) = self.internal_rx.recv() => self.handle_internal(internal),
                Ok(()) = self.viewport_changes.changed() => {
                    self.viewport_changes.borrow_and_update();
                    self.reconciler.viewport_changed(Instant::now());
                }
                _ = sleep_until_some(debounce_at) => self.on_debounce_elapsed(),
                _ = sleep_until_some(retry_at) => self.on_retry_elapsed(),
                _ = sleep_until_some(recenter_at) => self.on_recenter_timeout(),
                changed = session.changed() => {
                    if changed.is_err() {
                        break SessionEnd::Closed;
                    }
                    let state = session.borrow_and_update().clone();
                    if let Some(end) = session_end(&state) {
                        break end;
                    }
                }
            }
        };

        self.teardown(end)
    }

    fn handle_event(&mut self, event: MapEvent) -> Option<SessionEnd> {
        match event {
            MapEvent::MoveEnd { center, zoom } => self.on_move_end(center, zoom),
            MapEvent::RadiusInput(raw) => {
                self.viewport.set_radius(raw);
            }
            MapEvent::MarkerClicked(key) => self.on_marker_clicked(key),
            MapEvent::MapClicked { at, modifier } => {
                if modifier {
                    self.open_create_form(Some(at));
                } else {
                    self.markers.close_popup(&mut self.surface);
                }
            }
            MapEvent::PopupAction(key, command) => self.on_popup_action(key, command),
            MapEvent::NewStation => self.open_create_form(None),
            MapEvent::FormInput(field, value) => {
                if self.mutations.input(field, value) {
                    self.render_form();
                }
            }
            MapEvent::FormSubmit => self.on_form_submit(),
            MapEvent::FormCancel => {
                if self.mutations.cancel_form() {
                    self.surface.close_form();
                }
            }
            MapEvent::DeleteConfirmed => {
                if let Some(attempt) = self.mutations.confirm_delete() {
                    self.surface.close_confirmation();
                    self.dispatch_mutation(attempt);
                }
            }
            MapEvent::DeleteCancelled => {
                if self.mutations.cancel_delete() {
                    self.surface.close_confirmation();
                }
            }
            MapEvent::DismissNotice => self.surface.clear_notice(),
            MapEvent::Refresh => self.reload_now(),
            MapEvent::Logout => {
                self.repo.session().sign_out();
                return Some(SessionEnd::LoggedOut);
            }
        }
        None
    }

    fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::Reload { seq, result } => self.on_reload_done(seq, result),
            Internal::Mutation {
                attempt,
                kind,
                result,
            } => self.on_mutation_done(attempt, kind, result),
        }
    }

    // === Viewport ===

    fn on_move_end(&mut self, center: GeoPoint, zoom: f64) {
        if !center.is_valid() {
            warn!(center = %center, "Ignoring move to an invalid position");
            return;
        }
        self.viewport.set_center(center, zoom);
        if self.recenter.take().is_some() {
            debug!(center = %center, "Recenter settled");
            self.reload_now();
        }
    }

    fn on_recenter_timeout(&mut self) {
        if let Some(recenter) = self.recenter.take() {
            warn!(destination = %recenter.target, "Map did not report the end of the move, reloading at the target");
            self.viewport
                .set_center(recenter.target, self.config.recenter_zoom);
            self.reload_now();
        }
    }

    /// Bring `target` into view, then reload.
    ///
    /// When it is already visible the reload happens immediately; otherwise
    /// the surface flies there and the reload waits for the move to settle.
    fn recenter_on(&mut self, target: GeoPoint) {
        let frame = self.surface.visible_bounds().unwrap_or_else(|| {
            BoundingBox::around(
                self.viewport.current().center,
                self.config.frame_half_extent_km,
            )
        });
        if frame.contains(&target) {
            self.reload_now();
            return;
        }

        info!(destination = %target, frame = %frame, "New station is off screen, recentering");
        self.surface.fly_to(target, self.config.recenter_zoom);
        self.recenter = Some(Recenter {
            target,
            deadline: Instant::now() + self.config.recenter_timeout(),
        });
    }

    // === Reloads ===

    /// Reload without waiting for the debounce window.
    fn reload_now(&mut self) {
        // A change already applied must not also arm the debounce
        self.viewport_changes.borrow_and_update();
        let ticket = self.reconciler.force(&self.viewport.current());
        self.dispatch_reload(ticket);
    }

    fn on_debounce_elapsed(&mut self) {
        if let Some(ticket) = self.reconciler.debounce_elapsed(&self.viewport.current()) {
            self.dispatch_reload(ticket);
        }
    }

    fn on_retry_elapsed(&mut self) {
        if let Some(ticket) = self.reconciler.retry_elapsed(&self.viewport.current()) {
            debug!(seq = ticket.seq, "Retrying station reload");
            self.dispatch_reload(ticket);
        }
    }

    fn dispatch_reload(&mut self, ticket: ReloadTicket) {
        debug!(
            seq = ticket.seq,
            center = %ticket.center,
            radius_km = ticket.radius_km,
            "Reloading stations"
        );
        self.metrics.record_reload_issued();
        self.surface.set_loading(true);

        let repo = Arc::clone(&self.repo);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = repo.query_stations(ticket.center, ticket.radius_km).await;
            // The loop may already have stopped; then nobody needs the result
            let _ = tx.send(Internal::Reload {
                seq: ticket.seq,
                result,
            });
        });
    }

    fn on_reload_done(&mut self, seq: u64, result: StationResult<Vec<Station>>) {
        let completion =
            self.reconciler
                .complete(seq, result, &self.viewport.current(), Instant::now());

        match completion.outcome {
            ReloadOutcome::Applied { .. } => {
                self.metrics.record_reload_applied();
                self.refresh_markers();
            }
            ReloadOutcome::Stale => self.metrics.record_reload_stale(),
            ReloadOutcome::Failed { error, retry_in } => {
                self.metrics.record_reload_failed(retry_in.is_some());
                self.surface.show_notice(&Notice::from_error(&error));
            }
        }

        if let Some(ticket) = completion.follow_up {
            self.dispatch_reload(ticket);
        }
        self.surface.set_loading(self.reconciler.is_loading());
    }

    fn refresh_markers(&mut self) {
        let cache = self.reconciler.cache();
        if self.markers.sync(cache, &mut self.surface) {
            self.metrics.record_markers_rebuilt(self.markers.marker_count());
        }
        self.surface.set_station_count(cache.len());
    }

    // === Markers and popups ===

    fn on_marker_clicked(&mut self, key: MarkerKey) {
        let Some(id) = self.markers.resolve_click(key) else {
            debug!(%key, "Click on a marker from an earlier build ignored");
            return;
        };
        let Some(station) = self.reconciler.cache().get(id).cloned() else {
            return;
        };
        self.markers.open_popup(&station, &mut self.surface);
    }

    fn on_popup_action(&mut self, key: PopupKey, command: PopupCommand) {
        let Some(open) = self.markers.resolve_popup(key).cloned() else {
            debug!(%key, ?command, "Action on a closed popup ignored");
            return;
        };
        match command {
            PopupCommand::Close => {
                self.markers.close_popup(&mut self.surface);
            }
            PopupCommand::Edit => {
                if self.mutations.open_edit(&open.station) {
                    self.markers.close_popup(&mut self.surface);
                    self.render_form();
                }
            }
            PopupCommand::Delete => {
                if self.mutations.request_delete(&open.station) {
                    self.surface.confirm_delete(&open.station);
                }
            }
        }
    }

    // === Mutations ===

    fn open_create_form(&mut self, at: Option<GeoPoint>) {
        let confirming = self.mutations.pending_delete().is_some();
        if self.mutations.open_create(at) {
            if confirming {
                self.surface.close_confirmation();
            }
            self.markers.close_popup(&mut self.surface);
            self.render_form();
        }
    }

    fn on_form_submit(&mut self) {
        match self.mutations.submit() {
            Ok(Some(attempt)) => self.dispatch_mutation(attempt),
            Ok(None) => {}
            Err(error) => {
                debug!(error = %error, "Form rejected before sending");
                self.render_form();
            }
        }
    }

    fn dispatch_mutation(&mut self, attempt: Attempt) {
        let kind = attempt.request.kind();
        info!(attempt = attempt.id, kind = kind.as_str(), "Submitting station change");
        if kind != MutationKind::Delete {
            self.render_form();
        }

        let repo = Arc::clone(&self.repo);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = match attempt.request {
                MutationRequest::Create(draft) => repo
                    .create_station(&draft)
                    .await
                    .map(MutationOutcome::Created),
                MutationRequest::Update(id, draft) => repo
                    .update_station(id, &draft)
                    .await
                    .map(MutationOutcome::Updated),
                MutationRequest::Delete(id) => repo
                    .delete_station(id)
                    .await
                    .map(|()| MutationOutcome::Deleted(id)),
            };
            let _ = tx.send(Internal::Mutation {
                attempt: attempt.id,
                kind,
                result,
            });
        });
    }

    fn on_mutation_done(
        &mut self,
        attempt: u64,
        kind: MutationKind,
        result: StationResult<MutationOutcome>,
    ) {
        if !self.mutations.complete(attempt, &result) {
            debug!(attempt, "Completion for an abandoned attempt ignored");
            return;
        }
        self.metrics.record_mutation(kind, result.is_ok());

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(attempt, kind = kind.as_str(), error = %error, "Station change failed");
                self.report_mutation_failure(kind, &error);
                return;
            }
        };

        info!(attempt, kind = kind.as_str(), "Station change confirmed");
        if kind != MutationKind::Delete {
            self.surface.close_form();
        }
        self.surface.show_notice(&Notice::info(success_message(&outcome)));

        if let MutationOutcome::Deleted(id) = &outcome {
            self.markers.close_popup_for(*id, &mut self.surface);
        }
        self.reconciler.apply_local(&outcome);
        self.refresh_markers();

        match outcome {
            MutationOutcome::Created(station) => self.recenter_on(station.position()),
            _ => self.reload_now(),
        }
        self.surface.set_loading(self.reconciler.is_loading());
    }

    /// Form failures stay inline; delete failures have no form and get a notice.
    fn report_mutation_failure(&mut self, kind: MutationKind, error: &StationError) {
        match kind {
            MutationKind::Delete => self.surface.show_notice(&Notice::from_error(error)),
            MutationKind::Create | MutationKind::Update => self.render_form(),
        }
    }

    fn render_form(&mut self) {
        if let Some(view) = self.mutations.view() {
            self.surface.show_form(&view);
        }
    }

    fn teardown(mut self, end: SessionEnd) -> SessionEnd {
        self.reconciler.cancel_pending();
        self.recenter = None;
        if self.mutations.form().is_some() {
            self.surface.close_form();
        }
        if self.mutations.pending_delete().is_some() {
            self.surface.close_confirmation();
        }
        self.mutations.reset();
        self.markers.clear(&mut self.surface);
        self.surface.set_loading(false);
        self.surface.set_operator(None);
        if end == SessionEnd::Revoked {
            self.surface
                .show_notice(&Notice::from_error(&StationError::SessionExpired));
        }
        info!(?end, "Station map stopped");
        end
    }
}

fn session_end(state: &SessionState) -> Option<SessionEnd> {
    match state {
        SessionState::SignedIn(_) => None,
        SessionState::SignedOut => Some(SessionEnd::LoggedOut),
        SessionState::Revoked => Some(SessionEnd::Revoked),
    }
}

fn success_message(outcome: &MutationOutcome) -> String {
    match outcome {
        MutationOutcome::Created(station) => format!("Station '{}' created", station.name),
        MutationOutcome::Updated(station) => format!("Station '{}' updated", station.name),
        MutationOutcome::Deleted(id) => format!("Station {} deleted", id),
    }
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
