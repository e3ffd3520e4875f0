//! Sync configuration stored in ~/.repspheres/suis.json
//!
//! Every field is defaulted so a missing or partial file still yields a
//! working configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::Collection;

/// Shortest polling period accepted; anything lower is clamped.
pub const MIN_REFRESH_INTERVAL_MS: u64 = 1_000;

fn default_refresh_interval_ms() -> u64 {
    30_000
}

fn default_ticker_refresh_interval_ms() -> u64 {
    10_000
}

fn default_insight_limit() -> usize {
    10
}

fn default_realtime_collections() -> Vec<Collection> {
    vec![Collection::Insights, Collection::Notifications]
}

fn default_true() -> bool {
    true
}

fn default_time_period() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    #[serde(default = "default_ticker_refresh_interval_ms")]
    pub ticker_refresh_interval_ms: u64,
    #[serde(default = "default_insight_limit")]
    pub insight_limit: usize,
    /// Collections that get a push subscription when realtime is enabled.
    #[serde(default = "default_realtime_collections")]
    pub realtime_collections: Vec<Collection>,
    #[serde(default = "default_true")]
    pub enable_realtime: bool,
    #[serde(default = "default_true")]
    pub auto_refresh: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval_ms(),
            ticker_refresh_interval_ms: default_ticker_refresh_interval_ms(),
            insight_limit: default_insight_limit(),
            realtime_collections: default_realtime_collections(),
            enable_realtime: true,
            auto_refresh: true,
            user_id: None,
            gateway: None,
        }
    }
}

impl SyncConfig {
    /// Default accessor options derived from this config.
    pub fn options(&self) -> IntelligenceOptions {
        IntelligenceOptions {
            user_id: self.user_id.clone(),
            auto_refresh: self.auto_refresh,
            refresh_interval_ms: self.refresh_interval_ms,
            enable_realtime: self.enable_realtime,
        }
    }
}

/// Remote store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Analytics window requested from the remote store.
    #[serde(default = "default_time_period")]
    pub time_period: String,
}

/// Options accepted by the general-purpose intelligence accessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntelligenceOptions {
    pub user_id: Option<String>,
    pub auto_refresh: bool,
    pub refresh_interval_ms: u64,
    pub enable_realtime: bool,
}

impl Default for IntelligenceOptions {
    fn default() -> Self {
        SyncConfig::default().options()
    }
}

impl IntelligenceOptions {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    /// Ticker preset: the ticker must feel live, so it polls on the faster
    /// ticker interval.
    pub fn ticker(user_id: Option<String>, config: &SyncConfig) -> Self {
        Self {
            user_id,
            auto_refresh: true,
            refresh_interval_ms: config.ticker_refresh_interval_ms,
            enable_realtime: config.enable_realtime,
        }
    }

    /// Preset shared by the rep and region analytics feeds.
    pub fn analytics(user_id: Option<String>, config: &SyncConfig) -> Self {
        Self {
            user_id,
            auto_refresh: true,
            refresh_interval_ms: config.refresh_interval_ms,
            enable_realtime: config.enable_realtime,
        }
    }

    /// Polling period, clamped to `MIN_REFRESH_INTERVAL_MS`.
    pub fn refresh_interval(&self) -> Duration {
        if self.refresh_interval_ms < MIN_REFRESH_INTERVAL_MS {
            log::warn!(
                "Config: refresh interval {}ms below minimum, using {}ms",
                self.refresh_interval_ms,
                MIN_REFRESH_INTERVAL_MS
            );
        }
        Duration::from_millis(self.refresh_interval_ms.max(MIN_REFRESH_INTERVAL_MS))
    }
}

/// Get the canonical config file path (~/.repspheres/suis.json)
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::HomeDirNotFound)?;
    Ok(home.join(".repspheres").join("suis.json"))
}

/// Load config from the canonical path, falling back to defaults when the
/// file does not exist.
pub fn load_config() -> Result<SyncConfig, ConfigError> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<SyncConfig, ConfigError> {
    if !path.exists() {
        log::info!("Config: {} not found, using defaults", path.display());
        return Ok(SyncConfig::default());
    }

    let content = fs::read_to_string(path)?;
    let config: SyncConfig = serde_json::from_str(&content)?;

    if let Some(gateway) = &config.gateway {
        url::Url::parse(&gateway.base_url).map_err(|e| ConfigError::InvalidUrl {
            url: gateway.base_url.clone(),
            reason: e.to_string(),
        })?;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("suis.json")).unwrap();
        assert_eq!(config.refresh_interval_ms, 30_000);
        assert_eq!(config.ticker_refresh_interval_ms, 10_000);
        assert_eq!(
            config.realtime_collections,
            vec![Collection::Insights, Collection::Notifications]
        );
        assert!(config.gateway.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults_for_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"refreshIntervalMs": 60000, "realtimeCollections": ["analytics"],
                "gateway": {{"baseUrl": "https://store.example.com"}}}}"#
        )
        .unwrap();

        let config = load_config_from(file.path()).unwrap();
        assert_eq!(config.refresh_interval_ms, 60_000);
        assert_eq!(config.insight_limit, 10);
        assert_eq!(config.realtime_collections, vec![Collection::Analytics]);
        assert_eq!(config.gateway.unwrap().time_period, "daily");
    }

    #[test]
    fn test_invalid_gateway_url_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"gateway": {{"baseUrl": "not a url"}}}}"#).unwrap();
        assert!(matches!(
            load_config_from(file.path()),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_ticker_preset_is_faster() {
        let config = SyncConfig::default();
        let ticker = IntelligenceOptions::ticker(Some("rep-1".into()), &config);
        let analytics = IntelligenceOptions::analytics(Some("rep-1".into()), &config);
        assert!(ticker.refresh_interval() < analytics.refresh_interval());
    }

    #[test]
    fn test_refresh_interval_clamped() {
        let options = IntelligenceOptions {
            refresh_interval_ms: 5,
            ..IntelligenceOptions::default()
        };
        assert_eq!(options.refresh_interval(), Duration::from_millis(1_000));
    }
}
