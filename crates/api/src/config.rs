//! Service Configuration
//!
//! Optional TOML file (path in `RINGWATCH_CONFIG`, default `ringwatch.toml`)
//! layered under `RINGWATCH__`-prefixed environment variables, e.g.
//! `RINGWATCH__SERVER__BIND=0.0.0.0:9000`.

use crate::rate_limit::RateLimitConfig;
use alerting::AlertConfig;
use config::{Config, ConfigError, Environment, File};
use result_cache::CacheConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use storage::DatabaseConfig;
use telemetry::{Connection, TelemetryConfig};

const CONFIG_PATH_VAR: &str = "RINGWATCH_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "ringwatch.toml";

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Per-peer limit on the event webhook
    pub webhook_rate_limit: RateLimitConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            webhook_rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete service settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub telemetry: TelemetryConfig,
    pub alerting: AlertConfig,
    pub logging: LoggingConfig,
    /// Monitoring backend connection per tenant id
    pub tenants: HashMap<String, Connection>,
}

impl Settings {
    /// Load from the configured file (if present) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let env = Environment::with_prefix("RINGWATCH")
            .separator("__")
            .try_parsing(true);
        Self::from_sources(&path, env)
    }

    fn from_sources(path: &str, env: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(env)
            .build()?
            .try_deserialize()
    }
}
