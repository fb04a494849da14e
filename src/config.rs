//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub feed: FeedConfig,
    pub enrichment: EnrichmentConfig,
    pub events: EventsConfig,
    pub cors: CorsConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Session secret key (32+ bytes)
    pub session_secret: String,
    /// Session max age in seconds (default: 604800 = 7 days)
    pub session_max_age: i64,
}

/// Feed pagination configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Page size used when the client does not send one
    pub default_limit: usize,
    /// Hard cap on client-requested page sizes
    pub max_limit: usize,
}

/// Link enrichment configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EnrichmentConfig {
    /// Probe link content types before reclassifying posts
    pub probe_links: bool,
    /// Timeout for a single probe request, in milliseconds
    pub probe_timeout_ms: u64,
}

/// Fan-out event configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Upper bound on a single background delivery, in seconds
    pub delivery_timeout_seconds: u64,
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins; empty list allows any origin
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (CIRCLET_*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.path", "data/circlet.db")?
            .set_default("auth.session_max_age", 604800)?
            .set_default("feed.default_limit", 20)?
            .set_default("feed.max_limit", 50)?
            .set_default("enrichment.probe_links", false)?
            .set_default("enrichment.probe_timeout_ms", 2000)?
            .set_default("events.delivery_timeout_seconds", 10)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (CIRCLET_*)
            .add_source(
                Environment::with_prefix("CIRCLET")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        const MIN_SESSION_SECRET_BYTES: usize = 32;

        if self.auth.session_secret.as_bytes().len() < MIN_SESSION_SECRET_BYTES {
            return Err(crate::error::AppError::Config(format!(
                "auth.session_secret must be at least {} bytes",
                MIN_SESSION_SECRET_BYTES
            )));
        }

        if self.auth.session_max_age <= 0 {
            return Err(crate::error::AppError::Config(
                "auth.session_max_age must be greater than 0".to_string(),
            ));
        }

        if self.feed.default_limit == 0 || self.feed.max_limit == 0 {
            return Err(crate::error::AppError::Config(
                "feed limits must be greater than 0".to_string(),
            ));
        }

        if self.feed.default_limit > self.feed.max_limit {
            return Err(crate::error::AppError::Config(
                "feed.default_limit must not exceed feed.max_limit".to_string(),
            ));
        }

        if self.enrichment.probe_timeout_ms == 0 {
            return Err(crate::error::AppError::Config(
                "enrichment.probe_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.events.delivery_timeout_seconds == 0 {
            return Err(crate::error::AppError::Config(
                "events.delivery_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
