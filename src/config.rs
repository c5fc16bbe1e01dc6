//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Runtime configuration for the tutorial bot.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Path of the YAML tutorial flow script.
    pub flow_path: PathBuf,
    /// How often the completed-session sweep runs (`None` disables it).
    pub reap_interval: Option<Duration>,
    /// How long a completed session is kept before the sweep may drop it.
    pub completed_retention: Duration,
    /// Matrix delivery, when configured. Otherwise messages go to the CLI.
    pub matrix: Option<MatrixConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            flow_path: PathBuf::from("./tutorial.yml"),
            reap_interval: Some(Duration::from_secs(3600)), // 1 hour
            completed_retention: Duration::from_secs(600),  // 10 minutes
            matrix: None,
        }
    }
}

impl ServiceConfig {
    /// Build the configuration from `RIOTBOT_*` and `MATRIX_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let flow_path = std::env::var("RIOTBOT_FLOW_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.flow_path);

        let reap_interval = match std::env::var("RIOTBOT_REAP_INTERVAL_SECS") {
            Ok(raw) => match parse_secs("RIOTBOT_REAP_INTERVAL_SECS", &raw)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            Err(_) => defaults.reap_interval,
        };

        let completed_retention = match std::env::var("RIOTBOT_COMPLETED_RETENTION_SECS") {
            Ok(raw) => Duration::from_secs(parse_secs("RIOTBOT_COMPLETED_RETENTION_SECS", &raw)?),
            Err(_) => defaults.completed_retention,
        };

        Ok(Self {
            flow_path,
            reap_interval,
            completed_retention,
            matrix: MatrixConfig::from_env(),
        })
    }
}

fn parse_secs(key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{raw:?} is not a number of seconds ({e})"),
    })
}

/// Matrix client-server API credentials.
#[derive(Debug, Clone)]
pub struct MatrixConfig {
    pub homeserver_url: String,
    pub access_token: SecretString,
}

impl MatrixConfig {
    /// Returns `None` unless both the homeserver URL and the token are set.
    pub fn from_env() -> Option<Self> {
        let homeserver_url = std::env::var("MATRIX_HOMESERVER_URL").ok()?;
        let access_token = std::env::var("MATRIX_ACCESS_TOKEN").ok()?;
        if homeserver_url.trim().is_empty() || access_token.trim().is_empty() {
            return None;
        }
        Some(Self {
            homeserver_url: homeserver_url.trim_end_matches('/').to_string(),
            access_token: SecretString::from(access_token),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.flow_path, PathBuf::from("./tutorial.yml"));
        assert_eq!(config.reap_interval, Some(Duration::from_secs(3600)));
        assert_eq!(config.completed_retention, Duration::from_secs(600));
        assert!(config.matrix.is_none());
    }

    #[test]
    fn parse_secs_accepts_whitespace() {
        assert_eq!(parse_secs("K", " 42 ").unwrap(), 42);
    }

    #[test]
    fn parse_secs_rejects_garbage() {
        let err = parse_secs("RIOTBOT_REAP_INTERVAL_SECS", "soon").unwrap_err();
        match err {
            ConfigError::InvalidValue { key, .. } => {
                assert_eq!(key, "RIOTBOT_REAP_INTERVAL_SECS")
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
