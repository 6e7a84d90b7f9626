//! reqwest-backed implementation of `StationRepository`.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use station_common::{GeoPoint, Station, StationDraft, StationError, StationId, StationResult};
use tracing::{debug, info, instrument, warn};

use crate::config::ClientConfig;
use crate::repository::{HealthStatus, StationRepository};
use crate::session::{Credential, Session};

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    access_token: String,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Serialize)]
struct StationQuery {
    lat: f64,
    lon: f64,
    radius: u32,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Body of a create/update response.
///
/// Some deployments echo the full record, others only acknowledge with the
/// new id and station code.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MutationReply {
    Full(Station),
    Ack {
        #[serde(default)]
        id: Option<StationId>,
        #[serde(default, rename = "station_id")]
        code: Option<String>,
    },
}

/// HTTP client for the station service.
pub struct HttpStationRepository {
    client: Client,
    config: ClientConfig,
    session: Session,
}

impl HttpStationRepository {
    /// Create a client bound to `session`. The session is the only place the
    /// credential is read from.
    pub fn new(config: ClientConfig, session: Session) -> StationResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| StationError::Network(format!("Failed to create HTTP client: {}", e)))?;

        info!(base_url = %config.base_url, "Station client initialized");

        Ok(Self {
            client,
            config,
            session,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Attach the bearer token, send, and map failure statuses.
    ///
    /// Nothing is sent without a credential. A 401 revokes the session for
    /// every holder of it, not just this caller.
    async fn send_authorized(
        &self,
        request: RequestBuilder,
        target: Option<StationId>,
    ) -> StationResult<Response> {
        let Some(token) = self.session.bearer_token() else {
            return Err(StationError::NotAuthenticated);
        };

        let response = request
            .bearer_auth(&token)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            self.session.revoke(&token);
            return Err(StationError::SessionExpired);
        }

        if !status.is_success() {
            return Err(error_from_response(response, target).await);
        }

        Ok(response)
    }
}

#[async_trait]
impl StationRepository for HttpStationRepository {
    fn session(&self) -> &Session {
        &self.session
    }

    #[instrument(skip(self, password))]
    async fn login(&self, username: &str, password: &str) -> StationResult<Credential> {
        let response = self
            .client
            .post(self.config.endpoint("login"))
            .json(&LoginRequest { username, password })
            .send()
            .await
            .map_err(|e| StationError::LoginFailed(transport_error(e).to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!("Login rejected");
            return Err(StationError::InvalidCredentials);
        }
        if !status.is_success() {
            let err = error_from_response(response, None).await;
            return Err(StationError::LoginFailed(err.to_string()));
        }

        let body: LoginResponse = read_json(response)
            .await
            .map_err(|e| StationError::LoginFailed(e.to_string()))?;

        let credential = Credential::new(
            body.access_token,
            body.username.unwrap_or_else(|| username.to_string()),
        );
        self.session.sign_in(credential.clone());
        Ok(credential)
    }

    #[instrument(skip(self))]
    async fn health(&self) -> StationResult<HealthStatus> {
        let response = self
            .client
            .get(self.config.endpoint("health"))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(error_from_response(response, None).await);
        }
        read_json(response).await
    }

    #[instrument(skip(self, center), fields(center = %center))]
    async fn query_stations(
        &self,
        center: GeoPoint,
        radius_km: u32,
    ) -> StationResult<Vec<Station>> {
        let radius = self.config.radius_range.clamp(radius_km as i64);
        if radius != radius_km {
            debug!(requested = radius_km, radius, "Radius clamped to configured range");
        }

        let request = self
            .client
            .get(self.config.endpoint("stations"))
            .query(&StationQuery {
                lat: center.latitude,
                lon: center.longitude,
                radius,
            });

        let response = self.send_authorized(request, None).await?;
        let stations: Vec<Station> = read_json(response).await?;
        debug!(count = stations.len(), "Stations received");
        Ok(stations)
    }

    #[instrument(skip(self))]
    async fn get_station(&self, id: StationId) -> StationResult<Station> {
        let request = self
            .client
            .get(self.config.endpoint(&format!("stations/{}", id)));
        let response = self.send_authorized(request, Some(id)).await?;
        read_json(response).await
    }

    #[instrument(skip(self, draft), fields(name = %draft.name))]
    async fn create_station(&self, draft: &StationDraft) -> StationResult<Station> {
        let request = self
            .client
            .post(self.config.endpoint("stations"))
            .json(draft);
        let response = self.send_authorized(request, None).await?;

        match read_reply(response).await? {
            MutationReply::Full(station) => Ok(station),
            MutationReply::Ack { id: Some(id), code } => Ok(Station::from_draft(id, code, draft)),
            MutationReply::Ack { id: None, .. } => Err(StationError::Decode(
                "create response did not include an id".to_string(),
            )),
        }
    }

    #[instrument(skip(self, draft))]
    async fn update_station(&self, id: StationId, draft: &StationDraft) -> StationResult<Station> {
        let request = self
            .client
            .put(self.config.endpoint(&format!("stations/{}", id)))
            .json(draft);
        let response = self.send_authorized(request, Some(id)).await?;

        match read_reply(response).await? {
            MutationReply::Full(station) => Ok(station),
            MutationReply::Ack { code, .. } => Ok(Station::from_draft(id, code, draft)),
        }
    }

    #[instrument(skip(self))]
    async fn delete_station(&self, id: StationId) -> StationResult<()> {
        let request = self
            .client
            .delete(self.config.endpoint(&format!("stations/{}", id)));
        self.send_authorized(request, Some(id)).await?;
        Ok(())
    }
}

fn transport_error(err: reqwest::Error) -> StationError {
    if err.is_timeout() {
        StationError::Timeout
    } else {
        StationError::Network(err.to_string())
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> StationResult<T> {
    let bytes = response.bytes().await.map_err(transport_error)?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn read_reply(response: Response) -> StationResult<MutationReply> {
    let bytes = response.bytes().await.map_err(transport_error)?;
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(MutationReply::Ack {
            id: None,
            code: None,
        });
    }
    Ok(serde_json::from_slice(&bytes)?)
}

async fn error_from_response(response: Response, target: Option<StationId>) -> StationError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());

    match (status, target) {
        (StatusCode::BAD_REQUEST, _) | (StatusCode::UNPROCESSABLE_ENTITY, _) => {
            StationError::Rejected(message)
        }
        (StatusCode::NOT_FOUND, Some(id)) => StationError::NotFound(id),
        _ => StationError::Server {
            status: status.as_u16(),
            message,
        },
    }
}

/// Pull a human-readable message out of an error body.
fn error_message(body: &str) -> Option<String> {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = parsed.error.or(parsed.message) {
            return Some(message);
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed.starts_with('<') {
        None
    } else {
        Some(trimmed.chars().take(200).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_prefers_error_field() {
        assert_eq!(
            error_message(r#"{"error": "Champs requis : name, latitude, longitude"}"#).as_deref(),
            Some("Champs requis : name, latitude, longitude")
        );
        assert_eq!(
            error_message(r#"{"message": "Station non trouvée"}"#).as_deref(),
            Some("Station non trouvée")
        );
        assert_eq!(error_message("  "), None);
        assert_eq!(error_message("<html>oops</html>"), None);
        assert_eq!(error_message("plain text").as_deref(), Some("plain text"));
    }

    #[test]
    fn test_reply_accepts_full_record() {
        let reply: MutationReply = serde_json::from_str(
            r#"{"id": 4, "name": "A", "latitude": 1.0, "longitude": 2.0, "capacity": 12}"#,
        )
        .unwrap();
        assert!(matches!(reply, MutationReply::Full(ref s) if s.capacity == 12));
    }

    #[test]
    fn test_reply_accepts_acknowledgement() {
        let reply: MutationReply = serde_json::from_str(
            r#"{"message": "Station créée", "id": 42, "station_id": "STATION-1A2B3C4D"}"#,
        )
        .unwrap();
        match reply {
            MutationReply::Ack { id, code } => {
                assert_eq!(id, Some(StationId(42)));
                assert_eq!(code.as_deref(), Some("STATION-1A2B3C4D"));
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }
}
