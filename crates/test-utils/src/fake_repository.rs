//! In-memory stand-in for the station service.
//!
//! Behaves like the real service for the happy path (radius filtering with
//! distances, id assignment, bearer checks) and lets tests script latency and
//! failures per call kind. Latency uses `tokio::time::sleep`, so it follows a
//! paused test clock.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use station_client::{Credential, HealthStatus, Session, StationRepository};
use station_common::{
    GeoPoint, RadiusRange, Station, StationDraft, StationError, StationId, StationResult,
};

pub const FAKE_USERNAME: &str = "admin";
pub const FAKE_PASSWORD: &str = "admin123";

/// Which operation a scripted behavior applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Login,
    Health,
    Query,
    Get,
    Create,
    Update,
    Delete,
}

/// A call observed by the fake, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum RepoCall {
    Login { username: String },
    Health,
    Query { center: GeoPoint, radius_km: u32 },
    Get(StationId),
    Create(StationDraft),
    Update(StationId, StationDraft),
    Delete(StationId),
}

impl RepoCall {
    pub fn kind(&self) -> CallKind {
        match self {
            RepoCall::Login { .. } => CallKind::Login,
            RepoCall::Health => CallKind::Health,
            RepoCall::Query { .. } => CallKind::Query,
            RepoCall::Get(_) => CallKind::Get,
            RepoCall::Create(_) => CallKind::Create,
            RepoCall::Update(_, _) => CallKind::Update,
            RepoCall::Delete(_) => CallKind::Delete,
        }
    }
}

#[derive(Default)]
struct FakeState {
    stations: BTreeMap<StationId, Station>,
    next_id: i64,
    valid_token: Option<String>,
    calls: Vec<RepoCall>,
    failures: HashMap<CallKind, VecDeque<StationError>>,
    delays: HashMap<CallKind, VecDeque<Duration>>,
    latency: Duration,
    tokens_issued: u64,
}

/// In-memory `StationRepository`.
pub struct FakeRepository {
    session: Session,
    radius_range: RadiusRange,
    state: Mutex<FakeState>,
}

impl Default for FakeRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRepository {
    /// Empty store with a fresh, signed-out session.
    pub fn new() -> Self {
        Self::with_session(Session::new())
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            session,
            radius_range: RadiusRange::default(),
            state: Mutex::new(FakeState {
                next_id: 1,
                ..FakeState::default()
            }),
        }
    }

    /// Store seeded with `stations`, already signed in as the fake operator.
    pub fn signed_in_with(stations: Vec<Station>) -> Self {
        let repo = Self::new();
        repo.seed(stations);
        repo.sign_in();
        repo
    }

    /// Issue a valid token and store it in the session, bypassing `login`.
    pub fn sign_in(&self) -> Credential {
        let credential = self.issue_token(FAKE_USERNAME);
        self.session.sign_in(credential.clone());
        credential
    }

    /// Replace the stored stations. Ids continue after the highest seeded id.
    pub fn seed(&self, stations: Vec<Station>) {
        let mut state = self.lock();
        state.stations = stations.into_iter().map(|s| (s.id, s)).collect();
        state.next_id = state.stations.keys().map(|id| id.0).max().unwrap_or(0) + 1;
    }

    /// Insert or replace one station directly, as another operator would.
    pub fn put(&self, station: Station) {
        let mut state = self.lock();
        if station.id.0 >= state.next_id {
            state.next_id = station.id.0 + 1;
        }
        state.stations.insert(station.id, station);
    }

    /// Stations currently stored, ordered by id.
    pub fn stations(&self) -> Vec<Station> {
        self.lock().stations.values().cloned().collect()
    }

    /// Fail the next call of `kind` with `error`. Queued errors are used in order.
    pub fn fail_next(&self, kind: CallKind, error: StationError) {
        self.lock().failures.entry(kind).or_default().push_back(error);
    }

    /// Delay the next call of `kind` by `delay`, on top of the base latency.
    pub fn delay_next(&self, kind: CallKind, delay: Duration) {
        self.lock().delays.entry(kind).or_default().push_back(delay);
    }

    /// Base latency applied to every call.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Make the service forget the current token, as after a server-side expiry.
    pub fn expire_token(&self) {
        self.lock().valid_token = None;
    }

    pub fn calls(&self) -> Vec<RepoCall> {
        self.lock().calls.clone()
    }

    pub fn calls_of(&self, kind: CallKind) -> Vec<RepoCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.kind() == kind)
            .cloned()
            .collect()
    }

    /// `(center, radius)` of every query, in order.
    pub fn queries(&self) -> Vec<(GeoPoint, u32)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                RepoCall::Query { center, radius_km } => Some((*center, *radius_km)),
                _ => None,
            })
            .collect()
    }

    pub fn query_count(&self) -> usize {
        self.calls_of(CallKind::Query).len()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake repository state poisoned")
    }

    fn issue_token(&self, username: &str) -> Credential {
        let mut state = self.lock();
        state.tokens_issued += 1;
        let token = format!("fake-token-{}", state.tokens_issued);
        state.valid_token = Some(token.clone());
        Credential::new(token, username)
    }

    /// Record the call and take its scripted delay and failure.
    fn enter(&self, call: RepoCall) -> Ticket {
        let kind = call.kind();
        let mut state = self.lock();
        state.calls.push(call);
        let extra = state
            .delays
            .get_mut(&kind)
            .and_then(|q| q.pop_front())
            .unwrap_or_default();
        let failure = state.failures.get_mut(&kind).and_then(|q| q.pop_front());
        Ticket {
            delay: state.latency + extra,
            failure,
            token: self.session.bearer_token(),
        }
    }

    /// Whether the service would process the request at all.
    fn admit(&self, ticket: &mut Ticket) -> StationResult<()> {
        if let Some(err) = ticket.failure.take() {
            return Err(err);
        }
        let Some(presented) = &ticket.token else {
            return Err(StationError::NotAuthenticated);
        };
        match self.lock().valid_token.as_deref() {
            Some(valid) if presented == valid => Ok(()),
            _ => Err(StationError::SessionExpired),
        }
    }

    /// Deliver a response after the ticket's delay.
    ///
    /// The request was processed on arrival; only the response is late. A
    /// rejected token revokes the session on delivery, as the real client does.
    async fn deliver<T>(&self, ticket: Ticket, result: StationResult<T>) -> StationResult<T> {
        if !ticket.delay.is_zero() {
            tokio::time::sleep(ticket.delay).await;
        }
        if let (Err(StationError::SessionExpired), Some(token)) = (&result, &ticket.token) {
            self.session.revoke(token);
        }
        result
    }

    fn find(&self, center: GeoPoint, radius_km: u32) -> Vec<Station> {
        let radius = self.radius_range.clamp(radius_km as i64) as f64;
        let mut found: Vec<Station> = self
            .lock()
            .stations
            .values()
            .filter_map(|station| {
                let distance = center.distance_km(&station.position());
                (distance <= radius).then(|| Station {
                    distance_km: Some((distance * 100.0).round() / 100.0),
                    ..station.clone()
                })
            })
            .collect();
        found.sort_by(|a, b| {
            a.distance_km
                .partial_cmp(&b.distance_km)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        found
    }

    fn insert(&self, draft: &StationDraft) -> StationResult<Station> {
        if draft.name.trim().is_empty() {
            return Err(StationError::Rejected(
                "Champs requis : name, latitude, longitude".to_string(),
            ));
        }
        let mut state = self.lock();
        let id = StationId(state.next_id);
        state.next_id += 1;
        let station = Station::from_draft(id, Some(format!("STATION-{:08X}", id.0)), draft);
        state.stations.insert(id, station.clone());
        Ok(station)
    }

    fn replace(&self, id: StationId, draft: &StationDraft) -> StationResult<Station> {
        let mut state = self.lock();
        let code = state
            .stations
            .get(&id)
            .ok_or(StationError::NotFound(id))?
            .code
            .clone();
        let station = Station::from_draft(id, code, draft);
        state.stations.insert(id, station.clone());
        Ok(station)
    }

    fn remove(&self, id: StationId) -> StationResult<()> {
        self.lock()
            .stations
            .remove(&id)
            .map(|_| ())
            .ok_or(StationError::NotFound(id))
    }
}

/// Scripted behavior taken for one call.
struct Ticket {
    delay: Duration,
    failure: Option<StationError>,
    token: Option<String>,
}

#[async_trait]
impl StationRepository for FakeRepository {
    fn session(&self) -> &Session {
        &self.session
    }

    async fn login(&self, username: &str, password: &str) -> StationResult<Credential> {
        let mut ticket = self.enter(RepoCall::Login {
            username: username.to_string(),
        });
        // Login carries no bearer token
        ticket.token = None;
        let result = match ticket.failure.take() {
            Some(err) => Err(err),
            None if username != FAKE_USERNAME || password != FAKE_PASSWORD => {
                Err(StationError::InvalidCredentials)
            }
            None => Ok(()),
        };
        self.deliver(ticket, result).await?;

        let credential = self.issue_token(username);
        self.session.sign_in(credential.clone());
        Ok(credential)
    }

    async fn health(&self) -> StationResult<HealthStatus> {
        let mut ticket = self.enter(RepoCall::Health);
        ticket.token = None;
        let result = match ticket.failure.take() {
            Some(err) => Err(err),
            None => Ok(HealthStatus {
                status: "OK".to_string(),
                message: Some("fake station service".to_string()),
            }),
        };
        self.deliver(ticket, result).await
    }

    async fn query_stations(
        &self,
        center: GeoPoint,
        radius_km: u32,
    ) -> StationResult<Vec<Station>> {
        let mut ticket = self.enter(RepoCall::Query { center, radius_km });
        let result = self
            .admit(&mut ticket)
            .map(|()| self.find(center, radius_km));
        self.deliver(ticket, result).await
    }

    async fn get_station(&self, id: StationId) -> StationResult<Station> {
        let mut ticket = self.enter(RepoCall::Get(id));
        let result = self.admit(&mut ticket).and_then(|()| {
            self.lock()
                .stations
                .get(&id)
                .cloned()
                .ok_or(StationError::NotFound(id))
        });
        self.deliver(ticket, result).await
    }

    async fn create_station(&self, draft: &StationDraft) -> StationResult<Station> {
        let mut ticket = self.enter(RepoCall::Create(draft.clone()));
        let result = self.admit(&mut ticket).and_then(|()| self.insert(draft));
        self.deliver(ticket, result).await
    }

    async fn update_station(&self, id: StationId, draft: &StationDraft) -> StationResult<Station> {
        let mut ticket = self.enter(RepoCall::Update(id, draft.clone()));
        let result = self
            .admit(&mut ticket)
            .and_then(|()| self.replace(id, draft));
        self.deliver(ticket, result).await
    }

    async fn delete_station(&self, id: StationId) -> StationResult<()> {
        let mut ticket = self.enter(RepoCall::Delete(id));
        let result = self.admit(&mut ticket).and_then(|()| self.remove(id));
        self.deliver(ticket, result).await
    }
}
