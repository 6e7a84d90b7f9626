//! Map synchronization settings.
//!
//! Loaded from environment variables (`SyncConfig::from_env`) or from a YAML
//! file (`SyncConfig::from_file`). Missing keys fall back to the defaults.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use station_common::{GeoPoint, RadiusRange};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Map center before the operator pans.
    pub initial_center: GeoPoint,

    /// Search radius before the operator moves the slider, in km.
    pub initial_radius_km: u32,

    /// Zoom level reported before the first move.
    pub initial_zoom: f64,

    pub radius_range: RadiusRange,

    /// Quiet period after the last viewport change before a reload is sent.
    pub debounce_ms: u64,

    /// Retries of a reload that failed with a network error.
    pub max_reload_retries: u32,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,

    /// Zoom used when flying to a newly created station.
    pub recenter_zoom: f64,

    /// How long to wait for the fly-to to settle before reloading anyway.
    pub recenter_timeout_ms: u64,

    /// Half extent of the visual frame, used when the surface cannot report bounds.
    pub frame_half_extent_km: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            initial_center: GeoPoint::new(48.8566, 2.3522),
            initial_radius_km: 5,
            initial_zoom: 13.0,
            radius_range: RadiusRange::default(),
            debounce_ms: 300,
            max_reload_retries: 2,
            initial_retry_delay_ms: 1000,
            max_retry_delay_ms: 8000,
            recenter_zoom: 15.0,
            recenter_timeout_ms: 3000,
            frame_half_extent_km: 5.0,
        }
    }
}

impl SyncConfig {
    /// Build from environment variables, falling back to defaults.
    ///
    /// Environment variables: STATION_MAP_CENTER_LAT, STATION_MAP_CENTER_LON,
    /// STATION_MAP_RADIUS_KM, STATION_DEBOUNCE_MS, STATION_RELOAD_RETRIES,
    /// STATION_RETRY_DELAY_MS, STATION_MAX_RETRY_DELAY_MS, STATION_RECENTER_ZOOM,
    /// STATION_RECENTER_TIMEOUT_MS
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            initial_center: GeoPoint::new(
                env_parse("STATION_MAP_CENTER_LAT").unwrap_or(defaults.initial_center.latitude),
                env_parse("STATION_MAP_CENTER_LON").unwrap_or(defaults.initial_center.longitude),
            ),
            initial_radius_km: env_parse("STATION_MAP_RADIUS_KM")
                .unwrap_or(defaults.initial_radius_km),
            debounce_ms: env_parse("STATION_DEBOUNCE_MS").unwrap_or(defaults.debounce_ms),
            max_reload_retries: env_parse("STATION_RELOAD_RETRIES")
                .unwrap_or(defaults.max_reload_retries),
            initial_retry_delay_ms: env_parse("STATION_RETRY_DELAY_MS")
                .unwrap_or(defaults.initial_retry_delay_ms),
            max_retry_delay_ms: env_parse("STATION_MAX_RETRY_DELAY_MS")
                .unwrap_or(defaults.max_retry_delay_ms),
            recenter_zoom: env_parse("STATION_RECENTER_ZOOM").unwrap_or(defaults.recenter_zoom),
            recenter_timeout_ms: env_parse("STATION_RECENTER_TIMEOUT_MS")
                .unwrap_or(defaults.recenter_timeout_ms),
            ..defaults
        }
    }

    /// Load from a YAML file and validate.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read sync config from {:?}", path))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse sync config from {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.initial_center.is_valid() {
            anyhow::bail!("initial_center {} is not a valid position", self.initial_center);
        }
        if self.radius_range.min_km == 0 || self.radius_range.min_km > self.radius_range.max_km {
            anyhow::bail!(
                "radius_range {}..={} is empty or starts at zero",
                self.radius_range.min_km,
                self.radius_range.max_km
            );
        }
        if !self.radius_range.contains(self.initial_radius_km) {
            anyhow::bail!(
                "initial_radius_km {} is outside {}..={}",
                self.initial_radius_km,
                self.radius_range.min_km,
                self.radius_range.max_km
            );
        }
        if self.initial_retry_delay_ms > self.max_retry_delay_ms {
            anyhow::bail!("initial_retry_delay_ms exceeds max_retry_delay_ms");
        }
        if self.recenter_timeout_ms == 0 {
            anyhow::bail!("recenter_timeout_ms must be positive");
        }
        if self.frame_half_extent_km.is_nan() || self.frame_half_extent_km <= 0.0 {
            anyhow::bail!("frame_half_extent_km must be positive");
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Backoff before retry number `attempt` (0-based): doubles each time, capped.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self.initial_retry_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_retry_delay_ms))
    }

    pub fn recenter_timeout(&self) -> Duration {
        Duration::from_millis(self.recenter_timeout_ms)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
