//! Application configuration module
//!
//! Settings are layered: built-in defaults, then an optional
//! `schema-tightener.toml` (path overridable with `TIGHTENER_CONFIG`), then
//! `TIGHTENER__SECTION__KEY` environment variables. A `.env` file is loaded
//! first when present. `PORT` is honoured for container platforms.

use crate::models::NamingOverrides;
use crate::ordering::CircularDependencyOptions;
use crate::pipeline::EvidenceCacheRetention;
use crate::policy::TighteningOptions;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;
use validator::Validate;

pub const DEFAULT_CONFIG_FILE: &str = "schema-tightener.toml";
pub const CONFIG_PATH_VAR: &str = "TIGHTENER_CONFIG";
pub const ENV_PREFIX: &str = "TIGHTENER";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
    /// Upper bound on request bodies; models and profiles can be large
    pub max_body_bytes: usize,
    pub max_concurrent_requests: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0),
            port: 3000,
            max_body_bytes: 32 * 1024 * 1024,
            max_concurrent_requests: 64,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3001".to_string()],
        }
    }
}

/// Defaults for the evidence cache stage
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EvidenceCacheConfig {
    /// Used when a request does not name its own root
    pub root_directory: Option<PathBuf>,
    pub retention: Option<EvidenceCacheRetention>,
}

/// Complete application settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    /// Used when a request carries no options of its own
    pub tightening: TighteningOptions,
    pub circular_dependencies: CircularDependencyOptions,
    pub naming: NamingOverrides,
    pub evidence_cache: EvidenceCacheConfig,
}

impl Settings {
    /// Load settings from `.env`, the config file and the environment
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();

        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        debug!("Reading configuration from {} (optional)", path);

        let source = config::Config::builder()
            .add_source(config::File::from(PathBuf::from(&path)).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("cors.allowed_origins"),
            )
            .build()?;

        let mut settings: Settings = source.try_deserialize()?;

        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            settings.server.port = port;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Check every option block that carries validation rules
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |section: &str, e: validator::ValidationErrors| {
            ConfigError::InvalidValue(format!("{}: {}", section, e))
        };
        self.tightening.validate().map_err(|e| invalid("tightening", e))?;
        self.circular_dependencies
            .validate()
            .map_err(|e| invalid("circular_dependencies", e))?;
        self.naming.validate().map_err(|e| invalid("naming", e))?;
        if let Some(retention) = &self.evidence_cache.retention {
            retention.validate().map_err(|e| invalid("evidence_cache.retention", e))?;
        }
        if self.server.max_concurrent_requests == 0 {
            return Err(ConfigError::InvalidValue(
                "server.max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
