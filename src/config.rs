//! Centralized, environment-aware configuration.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    MissingRequired(String),

    #[error("invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("production requires {0} to be set")]
    ProductionRequired(String),
}

/// Deployment environment, gating which defaults are safe to fall back on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        match std::env::var("ENVIRONMENT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            "staging" | "stage" => Self::Staging,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

const DEV_MCP_SHARED_SECRET: &str = "dev-shared-secret-do-not-use-in-production";

/// Top-level application configuration, loaded once at startup.
#[derive(Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseSettings,
    pub spotify: SpotifyAppCredentials,
    pub token_vault: TokenVaultConfig,
    pub collector: CollectorConfig,
    pub initial_sync: InitialSyncConfig,
    pub import: ImportConfig,
    pub mcp_shared_secret: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = Environment::from_env();

        let config = Self {
            environment,
            server: ServerConfig::from_env(),
            database: DatabaseSettings::from_env()?,
            spotify: SpotifyAppCredentials::from_env()?,
            token_vault: TokenVaultConfig::from_env()?,
            collector: CollectorConfig::from_env(),
            initial_sync: InitialSyncConfig::from_env(),
            import: ImportConfig::from_env(),
            mcp_shared_secret: require_env("MCP_SHARED_SECRET")
                .unwrap_or_else(|_| DEV_MCP_SHARED_SECRET.to_string()),
        };

        if environment.is_production() {
            config.validate_production()?;
        }

        Ok(config)
    }

    /// The one authentication gate this service has (`/mcp/call`'s bearer
    /// secret) must not still be the dev default once it's actually exposed.
    fn validate_production(&self) -> Result<(), ConfigError> {
        if self.mcp_shared_secret == DEV_MCP_SHARED_SECRET {
            return Err(ConfigError::ProductionRequired(
                "MCP_SHARED_SECRET".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: env_or_default("HOST", "0.0.0.0"),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout: Duration,
}

impl DatabaseSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: require_env("DATABASE_URL")?,
            max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            connect_timeout: Duration::from_secs(
                std::env::var("DB_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
        })
    }
}

/// System-default Spotify app credentials, used unless a user-level override
/// is supplied to the client.
#[derive(Clone)]
pub struct SpotifyAppCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
}

impl SpotifyAppCredentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            client_id: require_env("SPOTIFY_CLIENT_ID")?,
            client_secret: require_env("SPOTIFY_CLIENT_SECRET")?,
            redirect_uri: require_env("SPOTIFY_REDIRECT_URI")?,
            auth_url: env_or_default(
                "SPOTIFY_AUTH_URL",
                "https://accounts.spotify.com/authorize",
            ),
            token_url: env_or_default(
                "SPOTIFY_TOKEN_URL",
                "https://accounts.spotify.com/api/token",
            ),
        })
    }
}

/// Token vault configuration: the process secret used to seal refresh tokens.
#[derive(Clone)]
pub struct TokenVaultConfig {
    /// Raw 32-byte AES-256 key, decoded from `TOKEN_ENCRYPTION_KEY` (base64).
    pub key: [u8; 32],
}

impl TokenVaultConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        use base64::Engine;

        let raw = require_env("TOKEN_ENCRYPTION_KEY")?;
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(raw.trim())
            .map_err(|e| ConfigError::InvalidValue {
                key: "TOKEN_ENCRYPTION_KEY".to_string(),
                message: format!("not valid base64: {e}"),
            })?;

        let key: [u8; 32] =
            decoded
                .try_into()
                .map_err(|v: Vec<u8>| ConfigError::InvalidValue {
                    key: "TOKEN_ENCRYPTION_KEY".to_string(),
                    message: format!("expected 32 bytes, got {}", v.len()),
                })?;

        Ok(Self { key })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self { key: [7u8; 32] }
    }
}

/// Run-loop and per-client tuning.
#[derive(Clone)]
pub struct CollectorConfig {
    pub interval: Duration,
    pub initial_sync_enabled: bool,
    pub spotify_concurrency: usize,
    pub rate_limit_budget: u32,
    /// Base URL for the Spotify Web API; overridable so tests can point the
    /// client at a `wiremock` server instead of the real API.
    pub spotify_api_base: String,
}

impl CollectorConfig {
    pub fn from_env() -> Self {
        Self {
            interval: Duration::from_secs(
                std::env::var("COLLECTOR_INTERVAL_SECONDS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(600),
            ),
            initial_sync_enabled: std::env::var("INITIAL_SYNC_ENABLED")
                .ok()
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            spotify_concurrency: std::env::var("SPOTIFY_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
            rate_limit_budget: std::env::var("RATE_LIMIT_BUDGET")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            spotify_api_base: env_or_default("SPOTIFY_API_BASE", "https://api.spotify.com/v1"),
        }
    }
}

#[derive(Clone)]
pub struct InitialSyncConfig {
    pub max_days: i64,
    pub max_requests: u32,
    pub rate_limit_budget: u32,
    pub concurrency: usize,
}

impl InitialSyncConfig {
    pub fn from_env() -> Self {
        Self {
            max_days: std::env::var("INITIAL_SYNC_MAX_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            max_requests: std::env::var("INITIAL_SYNC_MAX_REQUESTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(200),
            rate_limit_budget: std::env::var("RATE_LIMIT_BUDGET")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            concurrency: std::env::var("INITIAL_SYNC_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),
        }
    }
}

#[derive(Clone)]
pub struct ImportConfig {
    pub max_zip_size_mb: u64,
    pub max_records: u64,
    pub batch_size: usize,
    pub upload_dir: String,
}

impl ImportConfig {
    pub fn from_env() -> Self {
        Self {
            max_zip_size_mb: std::env::var("IMPORT_MAX_ZIP_SIZE_MB")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),
            max_records: std::env::var("IMPORT_MAX_RECORDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5_000_000),
            batch_size: std::env::var("IMPORT_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5_000),
            upload_dir: env_or_default("UPLOAD_DIR", "./uploads"),
        }
    }
}

pub fn require_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingRequired(key.to_string()))
}

pub fn env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
