/**
 * Server Configuration
 *
 * Configuration is read in three layers, later layers winning:
 *
 * 1. Built-in defaults (`ServerConfig::default()`)
 * 2. An optional TOML file named by `RELAY_CONFIG`
 * 3. Environment variables (`SERVER_PORT`, `DATABASE_URL`, `JWT_SECRET`,
 *    `DEV_AUTH_BYPASS`, `PRESENCE_INTERVAL_SECS`, `RELAY_DIFF_STRATEGY`)
 *
 * # Database
 *
 * The PostgreSQL store is optional. When `DATABASE_URL` is missing, or the
 * pool cannot be created, `load_database` returns `None` and the server runs
 * on the in-memory store instead.
 *
 * # Example
 *
 * ```toml
 * port = 3000
 *
 * [auth]
 * jwt_secret = "change-me"
 *
 * [relay]
 * presence_interval_secs = 5
 * diff_strategy = "id_set"
 * ```
 */
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use sqlx::PgPool;
use thiserror::Error;

use crate::backend::relay::DiffStrategy;

/// Configuration loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

impl ConfigError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Tuning knobs of the event relay
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Seconds between presence samples
    pub presence_interval_secs: u64,
    /// Seconds between SSE keep-alive comments
    pub keep_alive_secs: u64,
    /// Upper bound on one stream, 0 disables it
    pub max_session_secs: u64,
    pub diff_strategy: DiffStrategy,
    /// Stop sampling presence once the change listener has failed
    pub stop_presence_when_degraded: bool,
    /// Frames buffered per subscriber before the session waits on the client
    pub channel_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            presence_interval_secs: 5,
            keep_alive_secs: 15,
            max_session_secs: 4 * 60 * 60,
            diff_strategy: DiffStrategy::default(),
            stop_presence_when_degraded: false,
            channel_capacity: 64,
        }
    }
}

impl RelayConfig {
    /// Presence poll period, never shorter than one second
    pub fn presence_interval(&self) -> Duration {
        Duration::from_secs(self.presence_interval_secs.max(1))
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(1))
    }

    /// Per-subscriber frame buffer; a zero-capacity channel cannot exist
    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity.max(1)
    }

    pub fn max_session_duration(&self) -> Option<Duration> {
        match self.max_session_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Caller identification settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Accept `X-Dev-User-Id` in place of a token. Never enable in production.
    pub dev_bypass: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "dev-secret-change-in-production".to_string(),
            dev_bypass: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub auth: AuthConfig,
    pub relay: RelayConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: None,
            auth: AuthConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults, then `RELAY_CONFIG`, then environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("RELAY_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply overrides from a key lookup (the process environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("SERVER_PORT") {
            self.port = port
                .parse()
                .map_err(|_| ConfigError::invalid("SERVER_PORT", format!("not a port: {}", port)))?;
        }
        if let Some(url) = lookup("DATABASE_URL").filter(|url| !url.is_empty()) {
            self.database_url = Some(url);
        }
        if let Some(secret) = lookup("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(flag) = lookup("DEV_AUTH_BYPASS") {
            self.auth.dev_bypass = matches!(flag.trim().to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(secs) = lookup("PRESENCE_INTERVAL_SECS") {
            self.relay.presence_interval_secs = secs.parse().map_err(|_| {
                ConfigError::invalid("PRESENCE_INTERVAL_SECS", format!("not a number: {}", secs))
            })?;
        }
        if let Some(strategy) = lookup("RELAY_DIFF_STRATEGY") {
            self.relay.diff_strategy = strategy
                .parse()
                .map_err(|e: String| ConfigError::invalid("RELAY_DIFF_STRATEGY", e))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay.presence_interval_secs == 0 {
            return Err(ConfigError::invalid("relay.presence_interval_secs", "must be at least 1"));
        }
        if self.relay.keep_alive_secs == 0 {
            return Err(ConfigError::invalid("relay.keep_alive_secs", "must be at least 1"));
        }
        if self.relay.channel_capacity == 0 {
            return Err(ConfigError::invalid("relay.channel_capacity", "must be at least 1"));
        }
        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigError::invalid("auth.jwt_secret", "must not be empty"));
        }
        if self.auth.dev_bypass {
            tracing::warn!("[Server] Dev auth bypass is enabled, X-Dev-User-Id is trusted");
        }
        Ok(())
    }
}

/// Database configuration result
///
/// Contains the connection pool when configured and reachable, `None` otherwise.
pub type DatabaseConfig = Option<PgPool>;

/// Connect to PostgreSQL if a URL is configured
///
/// Errors are logged and turn into `None`; the server then falls back to the
/// in-memory store.
pub async fn load_database(database_url: Option<&str>) -> DatabaseConfig {
    let database_url = match database_url {
        Some(url) => url,
        None => {
            tracing::warn!("[Server] DATABASE_URL not set, using the in-memory store");
            return None;
        }
    };

    tracing::info!("[Server] Connecting to database...");

    match PgPool::connect(database_url).await {
        Ok(pool) => {
            tracing::info!("[Server] Database connection pool created successfully");
            Some(pool)
        }
        Err(e) => {
            tracing::error!("[Server] Failed to create database connection pool: {:?}", e);
            tracing::warn!("[Server] Falling back to the in-memory store");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.relay.presence_interval(), Duration::from_secs(5));
        assert_eq!(config.relay.keep_alive_interval(), Duration::from_secs(15));
        assert_eq!(
            config.relay.max_session_duration(),
            Some(Duration::from_secs(4 * 60 * 60))
        );
        assert_eq!(config.relay.diff_strategy, DiffStrategy::MessageCount);
        assert!(!config.relay.stop_presence_when_degraded);
        assert!(!config.auth.dev_bypass);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_periods_are_clamped() {
        let relay = RelayConfig {
            presence_interval_secs: 0,
            keep_alive_secs: 0,
            channel_capacity: 0,
            ..RelayConfig::default()
        };
        assert_eq!(relay.presence_interval(), Duration::from_secs(1));
        assert_eq!(relay.keep_alive_interval(), Duration::from_secs(1));
        assert_eq!(relay.channel_capacity(), 1);
    }

    #[test]
    fn test_zero_max_session_means_unbounded() {
        let relay = RelayConfig {
            max_session_secs: 0,
            ..RelayConfig::default()
        };
        assert_eq!(relay.max_session_duration(), None);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ServerConfig::from_toml(
            r#"
            port = 8080

            [relay]
            diff_strategy = "id_set"
            stop_presence_when_degraded = true
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.relay.diff_strategy, DiffStrategy::IdSet);
        assert!(config.relay.stop_presence_when_degraded);
        assert_eq!(config.relay.presence_interval_secs, 5);
        assert_eq!(config.auth, AuthConfig::default());
    }

    #[test]
    fn test_malformed_toml_is_rejected() {
        let err = ServerConfig::from_toml("port = \"not a number\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ServerConfig::from_file(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "[relay]\npresence_interval_secs = 2\n").unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.relay.presence_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_env_overrides_win() {
        let mut config = ServerConfig::default();
        config
            .apply_overrides(env(&[
                ("SERVER_PORT", "4000"),
                ("DATABASE_URL", "postgres://localhost/relay"),
                ("JWT_SECRET", "s3cret"),
                ("DEV_AUTH_BYPASS", "true"),
                ("PRESENCE_INTERVAL_SECS", "10"),
                ("RELAY_DIFF_STRATEGY", "ids"),
            ]))
            .unwrap();

        assert_eq!(config.port, 4000);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/relay"));
        assert_eq!(config.auth.jwt_secret, "s3cret");
        assert!(config.auth.dev_bypass);
        assert_eq!(config.relay.presence_interval_secs, 10);
        assert_eq!(config.relay.diff_strategy, DiffStrategy::IdSet);
    }

    #[test]
    fn test_empty_database_url_is_ignored() {
        let mut config = ServerConfig::default();
        config.apply_overrides(env(&[("DATABASE_URL", "")])).unwrap();
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_bad_override_is_rejected() {
        let mut config = ServerConfig::default();
        let err = config
            .apply_overrides(env(&[("RELAY_DIFF_STRATEGY", "fuzzy")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "RELAY_DIFF_STRATEGY"));

        let err = config.apply_overrides(env(&[("SERVER_PORT", "99999")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = ServerConfig::default();
        config.relay.presence_interval_secs = 0;
        assert!(config.validate().is_err());
    }
}
