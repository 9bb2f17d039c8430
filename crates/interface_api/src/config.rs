//! API configuration

use serde::Deserialize;

use domain_ledger::adapters::RemoteFundingConfig;
use domain_ledger::EngineConfig;

/// API configuration
///
/// Nested sections are read from double-underscore variables, e.g.
/// `API_ENGINE__REMOTE_TIMEOUT_MS` or `API_REMOTE_FUNDING__BASE_URL`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Database URL
    pub database_url: String,
    /// Log level
    pub log_level: String,
    pub remote_funding: RemoteFundingConfig,
    pub engine: EngineConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: "postgres://localhost/ledger".to_string(),
            log_level: "info".to_string(),
            remote_funding: RemoteFundingConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Loads configuration from environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("API")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Configuration from individual variables, used when `from_env` fails
    pub fn from_individual_vars() -> Self {
        let defaults = Self::default();
        let remote_defaults = defaults.remote_funding.clone();

        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            database_url: std::env::var("DATABASE_URL")
                .or_else(|_| std::env::var("API_DATABASE_URL"))
                .unwrap_or(defaults.database_url),
            log_level: std::env::var("API_LOG_LEVEL")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or(defaults.log_level),
            remote_funding: RemoteFundingConfig {
                base_url: std::env::var("REMOTE_FUNDING_URL").unwrap_or(remote_defaults.base_url),
                api_key: std::env::var("REMOTE_FUNDING_API_KEY").ok(),
                ..remote_defaults
            },
            engine: defaults.engine,
        }
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
