//! TOML-loadable `ClusterConfig`, mirroring `sio_core::config`'s seconds-based encoding
//! of its durations for the same reason: TOML has no native `Duration` scalar.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::adapter::ClusterConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(String, String),
    #[error("failed to parse config file {0}: {1}")]
    Parse(String, String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusterConfigToml {
    pub peer_timeout_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ClusterConfigToml {
    fn default() -> Self {
        ClusterConfigToml::from(&ClusterConfig::default())
    }
}

impl From<&ClusterConfig> for ClusterConfigToml {
    fn from(cfg: &ClusterConfig) -> Self {
        ClusterConfigToml {
            peer_timeout_secs: cfg.peer_timeout.as_secs(),
            heartbeat_interval_secs: cfg.heartbeat_interval.as_secs(),
            request_timeout_secs: cfg.request_timeout.as_secs(),
        }
    }
}

impl From<ClusterConfigToml> for ClusterConfig {
    fn from(raw: ClusterConfigToml) -> Self {
        ClusterConfig {
            peer_timeout: Duration::from_secs(raw.peer_timeout_secs),
            heartbeat_interval: Duration::from_secs(raw.heartbeat_interval_secs),
            request_timeout: Duration::from_secs(raw.request_timeout_secs),
        }
    }
}

pub fn load_cluster_config(path: Option<&str>) -> Result<ClusterConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(ClusterConfig::default());
    };
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_owned(), e.to_string()))?;
    let raw: ClusterConfigToml = toml::from_str(&text).map_err(|e| ConfigError::Parse(path.to_owned(), e.to_string()))?;
    Ok(raw.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_yields_defaults() {
        let cfg = load_cluster_config(None).unwrap();
        assert_eq!(cfg.peer_timeout, ClusterConfig::default().peer_timeout);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults_for_missing_fields() {
        let raw: ClusterConfigToml = toml::from_str("heartbeat_interval_secs = 2\n").unwrap();
        let cfg: ClusterConfig = raw.into();
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(2));
        assert_eq!(cfg.peer_timeout, ClusterConfig::default().peer_timeout);
    }
}
