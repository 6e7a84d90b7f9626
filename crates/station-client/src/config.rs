//! Client configuration: where the station service lives and how long to wait for it.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use station_common::RadiusRange;

/// Connection settings for the station service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API root; endpoint paths (`/login`, `/stations`, ...) are appended to it.
    pub base_url: String,

    /// Whole-request timeout. Calls fail rather than hang past this.
    pub request_timeout_secs: u64,

    /// TCP connect timeout.
    pub connect_timeout_secs: u64,

    /// Radii outside this range are clamped before a query is sent.
    pub radius_range: RadiusRange,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            request_timeout_secs: 10,
            connect_timeout_secs: 5,
            radius_range: RadiusRange::default(),
        }
    }
}

impl ClientConfig {
    /// Build from environment variables, falling back to defaults.
    ///
    /// Environment variables: STATION_API_URL, STATION_REQUEST_TIMEOUT_SECS,
    /// STATION_CONNECT_TIMEOUT_SECS, STATION_MIN_RADIUS_KM, STATION_MAX_RADIUS_KM
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("STATION_API_URL").unwrap_or(defaults.base_url),
            request_timeout_secs: env_parse("STATION_REQUEST_TIMEOUT_SECS")
                .unwrap_or(defaults.request_timeout_secs),
            connect_timeout_secs: env_parse("STATION_CONNECT_TIMEOUT_SECS")
                .unwrap_or(defaults.connect_timeout_secs),
            radius_range: RadiusRange {
                min_km: env_parse("STATION_MIN_RADIUS_KM")
                    .unwrap_or(defaults.radius_range.min_km),
                max_km: env_parse("STATION_MAX_RADIUS_KM")
                    .unwrap_or(defaults.radius_range.max_km),
            },
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Join an endpoint path onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
