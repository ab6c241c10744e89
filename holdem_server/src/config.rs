//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated
//! configuration.

use holdem_core::directory::ServiceMode;
use std::net::SocketAddr;

/// Complete server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP/WebSocket bind address (0.0.0.0:LISTEN_PORT).
    pub bind: SocketAddr,
    /// Metrics exporter bind address.
    pub metrics_bind: SocketAddr,
    /// Blob cache connection target.
    pub cache: CacheConfig,
    /// Directory service base URL.
    pub directory_url: String,
    /// Reconnect grace window in milliseconds.
    pub reconnect_grace_ms: u64,
    /// Default per-action timeout in seconds.
    pub default_action_timeout_secs: u64,
    /// Secret for local token verification; required in test mode.
    pub auth_token_secret: Option<String>,
    /// prod talks to the directory; test short-circuits it.
    pub mode: ServiceMode,
}

/// Connection target for the keyed blob cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub host: String,
    pub port: u16,
    pub db: String,
    pub user: String,
    pub password: String,
}

impl CacheConfig {
    /// Postgres connection URL for the blob store.
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.db
        )
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `directory_override` - Optional directory URL override
    /// * `mode_override` - Optional mode override
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        directory_override: Option<String>,
        mode_override: Option<ServiceMode>,
    ) -> Result<Self, ConfigError> {
        let bind = bind_override.unwrap_or_else(|| {
            let port: u16 = parse_env_or("LISTEN_PORT", 3000);
            SocketAddr::from(([0, 0, 0, 0], port))
        });

        let metrics_bind: SocketAddr = std::env::var("METRICS_BIND")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| "127.0.0.1:9090".parse().expect("valid default"));

        let cache = CacheConfig {
            host: std::env::var("CACHE_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: parse_env_or("CACHE_PORT", 5432),
            db: std::env::var("CACHE_DB").unwrap_or_else(|_| "holdem".to_string()),
            user: std::env::var("CACHE_USER").unwrap_or_else(|_| "holdem".to_string()),
            password: std::env::var("CACHE_PASSWORD").unwrap_or_default(),
        };

        let directory_url = directory_override
            .or_else(|| std::env::var("DIRECTORY_URL").ok())
            .unwrap_or_else(|| "http://localhost:8000".to_string());

        let mode = match mode_override {
            Some(mode) => mode,
            None => std::env::var("MODE")
                .unwrap_or_else(|_| "prod".to_string())
                .parse()
                .map_err(|reason| ConfigError::Invalid {
                    var: "MODE".to_string(),
                    reason,
                })?,
        };

        Ok(ServerConfig {
            bind,
            metrics_bind,
            cache,
            directory_url,
            reconnect_grace_ms: parse_env_or("RECONNECT_GRACE_MS", 60_000),
            default_action_timeout_secs: parse_env_or("DEFAULT_ACTION_TIMEOUT_SEC", 30),
            auth_token_secret: std::env::var("AUTH_TOKEN_SECRET").ok(),
            mode,
        })
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mode == ServiceMode::Test && self.auth_token_secret.is_none() {
            return Err(ConfigError::MissingRequired {
                var: "AUTH_TOKEN_SECRET".to_string(),
                hint: "test mode verifies tokens locally; generate with: openssl rand -hex 32"
                    .to_string(),
            });
        }
        if let Some(secret) = &self.auth_token_secret {
            if secret.len() < 16 {
                return Err(ConfigError::Invalid {
                    var: "AUTH_TOKEN_SECRET".to_string(),
                    reason: "Must be at least 16 characters".to_string(),
                });
            }
        }
        if self.reconnect_grace_ms == 0 {
            return Err(ConfigError::Invalid {
                var: "RECONNECT_GRACE_MS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }
        if self.default_action_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "DEFAULT_ACTION_TIMEOUT_SEC".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }
        if self.directory_url.is_empty() {
            return Err(ConfigError::Invalid {
                var: "DIRECTORY_URL".to_string(),
                reason: "Must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback.
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
