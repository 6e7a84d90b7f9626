//! The request/response boundary to the station service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use station_common::{GeoPoint, Station, StationDraft, StationId, StationResult};

use crate::session::{Credential, Session};

/// Liveness report from `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Operations offered by the station service.
///
/// Implementations attach the session's bearer token to every call except
/// `login` and `health`, and revoke the session when the service rejects it.
#[async_trait]
pub trait StationRepository: Send + Sync {
    /// Session this repository reads its credential from.
    fn session(&self) -> &Session;

    /// Exchange credentials for a bearer token and store it in the session.
    async fn login(&self, username: &str, password: &str) -> StationResult<Credential>;

    async fn health(&self) -> StationResult<HealthStatus>;

    /// Stations within `radius_km` of `center`, nearest first, with distances.
    async fn query_stations(&self, center: GeoPoint, radius_km: u32)
        -> StationResult<Vec<Station>>;

    async fn get_station(&self, id: StationId) -> StationResult<Station>;

    async fn create_station(&self, draft: &StationDraft) -> StationResult<Station>;

    async fn update_station(&self, id: StationId, draft: &StationDraft) -> StationResult<Station>;

    async fn delete_station(&self, id: StationId) -> StationResult<()>;
}
