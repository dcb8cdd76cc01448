//! TOML-loadable configuration, mirroring `shell-pool-shpool`'s `Config`/`read_config`
//! file-then-defaults pattern, adapted to durations expressed as seconds so they round-trip
//! through TOML's scalar types instead of `Duration`'s serde struct form.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::server::ServerConfig;
use crate::socket::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(String, String),
    #[error("failed to parse config file {0}: {1}")]
    Parse(String, String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfigToml {
    pub connect_timeout_secs: u64,
    pub max_disconnection_duration_secs: u64,
    pub recovery_enabled: bool,
    pub retry_max_retries: Option<u32>,
    pub retry_after_secs: Option<u64>,
    pub session_sweep_interval_secs: u64,
}

impl Default for ServerConfigToml {
    fn default() -> Self {
        ServerConfigToml::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for ServerConfigToml {
    fn from(cfg: &ServerConfig) -> Self {
        ServerConfigToml {
            connect_timeout_secs: cfg.connect_timeout.as_secs(),
            max_disconnection_duration_secs: cfg.max_disconnection_duration.as_secs(),
            recovery_enabled: cfg.recovery_enabled,
            retry_max_retries: cfg.retry_policy.map(|p| p.max_retries),
            retry_after_secs: cfg.retry_policy.map(|p| p.retry_after.as_secs()),
            session_sweep_interval_secs: cfg.session_sweep_interval.as_secs(),
        }
    }
}

impl From<ServerConfigToml> for ServerConfig {
    fn from(raw: ServerConfigToml) -> Self {
        ServerConfig {
            connect_timeout: Duration::from_secs(raw.connect_timeout_secs),
            max_disconnection_duration: Duration::from_secs(raw.max_disconnection_duration_secs),
            recovery_enabled: raw.recovery_enabled,
            retry_policy: match (raw.retry_max_retries, raw.retry_after_secs) {
                (Some(max_retries), Some(retry_after_secs)) => Some(RetryPolicy {
                    max_retries,
                    retry_after: Duration::from_secs(retry_after_secs),
                }),
                _ => None,
            },
            session_sweep_interval: Duration::from_secs(raw.session_sweep_interval_secs),
        }
    }
}

/// Load a `ServerConfig` from a TOML file, or the built-in defaults if `path` is `None`.
pub fn load_server_config(path: Option<&str>) -> Result<ServerConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(ServerConfig::default());
    };
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_owned(), e.to_string()))?;
    let raw: ServerConfigToml = toml::from_str(&text).map_err(|e| ConfigError::Parse(path.to_owned(), e.to_string()))?;
    Ok(raw.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_yields_defaults() {
        let cfg = load_server_config(None).unwrap();
        assert_eq!(cfg.connect_timeout, ServerConfig::default().connect_timeout);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults_for_missing_fields() {
        let raw: ServerConfigToml = toml::from_str("recovery_enabled = true\n").unwrap();
        let cfg: ServerConfig = raw.into();
        assert!(cfg.recovery_enabled);
        assert_eq!(cfg.session_sweep_interval, ServerConfig::default().session_sweep_interval);
    }

    #[test]
    fn round_trips_a_full_table() {
        let toml_src = r#"
            connect_timeout_secs = 10
            max_disconnection_duration_secs = 30
            recovery_enabled = true
            retry_max_retries = 3
            retry_after_secs = 2
            session_sweep_interval_secs = 15
        "#;
        let raw: ServerConfigToml = toml::from_str(toml_src).unwrap();
        let cfg: ServerConfig = raw.into();
        assert_eq!(cfg.connect_timeout, Duration::from_secs(10));
        assert_eq!(cfg.retry_policy.unwrap().max_retries, 3);
    }
}
