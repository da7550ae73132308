//! Client configuration management.
//!
//! Consolidates all environment variable reads. Command-line values override
//! the environment.

use std::{str::FromStr, time::Duration};
use table_sync::{
    ConnectionConfig, PresentationConfig,
    entities::{PlayerId, TableId},
};

/// Server used when neither `--server` nor `TS_SERVER_URL` is given.
pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:6969/ws";

/// Complete client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint of the table server
    pub server_url: String,
    /// Table to watch
    pub table_id: TableId,
    /// Local identity, used to find our own seat
    pub player: Option<PlayerId>,
    pub connection: ConnectionConfig,
    pub presentation: PresentationConfig,
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub server_url: Option<String>,
    pub table_id: Option<TableId>,
    pub player: Option<String>,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns error if the table is not given anywhere or a value is invalid
    pub fn from_env(overrides: CliOverrides) -> Result<Self, ConfigError> {
        Self::from_lookup(overrides, |key| std::env::var(key).ok())
    }

    /// Load configuration from `lookup` instead of the process environment.
    pub fn from_lookup<L>(overrides: CliOverrides, lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let server_url = overrides
            .server_url
            .or_else(|| lookup("TS_SERVER_URL"))
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());

        let table_id = match overrides.table_id {
            Some(table_id) => table_id,
            None => {
                let raw = lookup("TS_TABLE_ID").ok_or_else(|| ConfigError::MissingRequired {
                    var: "TS_TABLE_ID".to_string(),
                    hint: "Pass --table ID or export TS_TABLE_ID".to_string(),
                })?;
                raw.parse().map_err(|_| ConfigError::Invalid {
                    var: "TS_TABLE_ID".to_string(),
                    reason: format!("'{raw}' is not a table id"),
                })?
            }
        };

        let player = overrides
            .player
            .or_else(|| lookup("TS_PLAYER"))
            .filter(|name| !name.trim().is_empty())
            .map(|name| PlayerId::new(name.trim()));

        let defaults = ConnectionConfig::default();
        let connection = ConnectionConfig {
            heartbeat_interval: Duration::from_secs(parse_env_or(
                &lookup,
                "TS_HEARTBEAT_SECS",
                defaults.heartbeat_interval.as_secs(),
            )),
            base_delay: Duration::from_millis(parse_env_or(
                &lookup,
                "TS_RECONNECT_BASE_MS",
                defaults.base_delay.as_millis() as u64,
            )),
            max_delay: Duration::from_millis(parse_env_or(
                &lookup,
                "TS_RECONNECT_MAX_MS",
                defaults.max_delay.as_millis() as u64,
            )),
            max_retries: parse_env_or(&lookup, "TS_RECONNECT_MAX_RETRIES", defaults.max_retries),
            max_missed_pongs: lookup("TS_MAX_MISSED_PONGS").and_then(|v| v.parse().ok()),
            ..defaults
        };

        let config = ClientConfig {
            server_url,
            table_id,
            player,
            connection,
            presentation: PresentationConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.server_url.starts_with("ws://") || self.server_url.starts_with("wss://")) {
            return Err(ConfigError::Invalid {
                var: "TS_SERVER_URL".to_string(),
                reason: format!("'{}' is not a ws:// or wss:// URL", self.server_url),
            });
        }

        self.connection.validate()?;
        self.presentation.validate()?;
        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },

    #[error(transparent)]
    Library(#[from] table_sync::ConfigError),
}

/// Helper to parse an environment variable with default fallback
fn parse_env_or<L, T>(lookup: &L, key: &str, default: T) -> T
where
    L: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)], overrides: CliOverrides) -> Result<ClientConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(overrides, |key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("TS_TABLE_ID", "4")], CliOverrides::default()).unwrap();
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
        assert_eq!(config.table_id, 4);
        assert_eq!(config.player, None);
        assert_eq!(config.connection.base_delay, Duration::from_millis(1000));
        assert_eq!(config.connection.max_retries, 10);
        assert_eq!(config.connection.max_missed_pongs, None);
    }

    #[test]
    fn test_environment_values() {
        let config = load(
            &[
                ("TS_SERVER_URL", "wss://poker.example/ws"),
                ("TS_TABLE_ID", "12"),
                ("TS_PLAYER", "alice"),
                ("TS_HEARTBEAT_SECS", "5"),
                ("TS_RECONNECT_BASE_MS", "250"),
                ("TS_RECONNECT_MAX_MS", "8000"),
                ("TS_RECONNECT_MAX_RETRIES", "3"),
                ("TS_MAX_MISSED_PONGS", "2"),
            ],
            CliOverrides::default(),
        )
        .unwrap();

        assert_eq!(config.server_url, "wss://poker.example/ws");
        assert_eq!(config.player, Some(PlayerId::new("alice")));
        assert_eq!(config.connection.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.connection.base_delay, Duration::from_millis(250));
        assert_eq!(config.connection.max_delay, Duration::from_millis(8000));
        assert_eq!(config.connection.max_retries, 3);
        assert_eq!(config.connection.max_missed_pongs, Some(2));
    }

    #[test]
    fn test_overrides_win() {
        let config = load(
            &[("TS_TABLE_ID", "1"), ("TS_PLAYER", "alice")],
            CliOverrides {
                server_url: Some("ws://localhost:9000/ws".to_string()),
                table_id: Some(7),
                player: Some("bob".to_string()),
            },
        )
        .unwrap();
        assert_eq!(config.server_url, "ws://localhost:9000/ws");
        assert_eq!(config.table_id, 7);
        assert_eq!(config.player, Some(PlayerId::new("bob")));
    }

    #[test]
    fn test_unparseable_numbers_fall_back() {
        let config = load(
            &[("TS_TABLE_ID", "1"), ("TS_RECONNECT_MAX_RETRIES", "lots")],
            CliOverrides::default(),
        )
        .unwrap();
        assert_eq!(config.connection.max_retries, 10);
    }

    #[test]
    fn test_missing_table() {
        let err = load(&[], CliOverrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));
        assert!(err.to_string().contains("TS_TABLE_ID"));
    }

    #[test]
    fn test_invalid_values() {
        let err = load(&[("TS_TABLE_ID", "main")], CliOverrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        let err = load(
            &[("TS_TABLE_ID", "1"), ("TS_SERVER_URL", "http://localhost")],
            CliOverrides::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("ws://"));

        let err = load(
            &[
                ("TS_TABLE_ID", "1"),
                ("TS_RECONNECT_BASE_MS", "5000"),
                ("TS_RECONNECT_MAX_MS", "1000"),
            ],
            CliOverrides::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Library(_)));
    }
}
