//! Console configuration: client connection plus map sync settings.

use std::path::Path;

use anyhow::{Context, Result};
use map_sync::SyncConfig;
use serde::{Deserialize, Serialize};
use station_client::ClientConfig;

/// Everything the console needs, as one YAML document.
///
/// ```yaml
/// client:
///   base_url: http://localhost:5000/api
///   request_timeout_secs: 10
/// sync:
///   debounce_ms: 300
///   initial_radius_km: 5
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub client: ClientConfig,
    pub sync: SyncConfig,
}

impl ConsoleConfig {
    /// Load from `path` when given, otherwise from the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::from_env(),
        };
        config.sync.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Self {
        Self {
            client: ClientConfig::from_env(),
            sync: SyncConfig::from_env(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read console config: {}", path.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse console config: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::temp_yaml;

    #[test]
    fn test_load_partial_file() {
        let file = temp_yaml(
            "client:\n  base_url: http://velib.test/api\nsync:\n  debounce_ms: 150\n",
        );
        let config = ConsoleConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.client.base_url, "http://velib.test/api");
        assert_eq!(config.client.request_timeout_secs, 10);
        assert_eq!(config.sync.debounce_ms, 150);
        assert_eq!(config.sync.initial_radius_km, 5);
    }

    #[test]
    fn test_load_rejects_invalid_sync_settings() {
        let file = temp_yaml("sync:\n  initial_radius_km: 50\n");
        assert!(ConsoleConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_missing_file_names_the_path() {
        let err = ConsoleConfig::load(Some(Path::new("/nonexistent/console.yaml"))).unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/console.yaml"));
    }
}
