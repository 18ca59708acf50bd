use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::repositories::BackendKind;

/// Prefix of every environment variable read by the service
pub const ENV_PREFIX: &str = "CART";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {message}")]
    LoadError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_timeout")]
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// `redis://`, `rediss://`, `unix://` or a bare `host:port` for Redis /
    /// Valkey, `memory://` for the process-local backend
    #[serde(rename = "backend_address", default = "default_backend_address")]
    pub address: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: usize,
    #[serde(default = "default_transaction_max_attempts")]
    pub transaction_max_attempts: u32,
    #[serde(default = "default_transaction_backoff_ms")]
    pub transaction_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_service_version")]
    pub service_version: String,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub enable_json_logging: bool,
}

impl Config {
    /// Load from `CART_*` environment variables and validate
    pub fn from_environment() -> Result<Self, ConfigError> {
        Self::from_env_source(config::Environment::with_prefix(ENV_PREFIX))
    }

    pub(crate) fn from_env_source(environment: config::Environment) -> Result<Self, ConfigError> {
        info!("Loading configuration from environment");

        let settings = config::Config::builder()
            .add_source(environment)
            .build()
            .map_err(|e| ConfigError::LoadError {
                message: format!("Failed to load configuration: {}", e),
            })?;

        let config = Config {
            server: deserialize_section(&settings, "server")?,
            backend: deserialize_section(&settings, "backend")?,
            observability: deserialize_section(&settings, "observability")?,
        };

        config.validate()?;

        info!("Configuration loaded successfully");
        debug!("Configuration: {:?}", config);

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(validation_error("Server port cannot be 0"));
        }

        if self.server.request_timeout_seconds == 0 {
            return Err(validation_error("Request timeout cannot be 0"));
        }

        if self.backend.address.trim().is_empty() {
            return Err(validation_error("Backend address cannot be empty"));
        }

        BackendKind::from_address(&self.backend.address)
            .map_err(|e| validation_error(e.to_string()))?;

        if self.backend.key_prefix.is_empty() {
            return Err(validation_error("Key prefix cannot be empty"));
        }

        if self.backend.pool_max_size == 0 {
            return Err(validation_error("Connection pool size cannot be 0"));
        }

        if self.backend.transaction_max_attempts == 0 {
            return Err(validation_error(
                "Transaction attempts must be at least 1",
            ));
        }

        Ok(())
    }
}

fn deserialize_section<T: serde::de::DeserializeOwned>(
    settings: &config::Config,
    section: &str,
) -> Result<T, ConfigError> {
    settings
        .clone()
        .try_deserialize()
        .map_err(|e| ConfigError::LoadError {
            message: format!("Failed to deserialize {} config: {}", section, e),
        })
}

fn validation_error(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        message: message.into(),
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl BackendConfig {
    pub fn transaction_backoff(&self) -> Duration {
        Duration::from_millis(self.transaction_backoff_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_timeout(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            address: default_backend_address(),
            key_prefix: default_key_prefix(),
            pool_max_size: default_pool_max_size(),
            transaction_max_attempts: default_transaction_max_attempts(),
            transaction_backoff_ms: default_transaction_backoff_ms(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            service_version: default_service_version(),
            otlp_endpoint: None,
            log_level: default_log_level(),
            enable_json_logging: false,
        }
    }
}

// Default value functions
pub(crate) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_port() -> u16 {
    8080
}

pub(crate) fn default_timeout() -> u64 {
    30
}

pub(crate) fn default_backend_address() -> String {
    "redis://127.0.0.1:6379".to_string()
}

pub(crate) fn default_key_prefix() -> String {
    "cart:".to_string()
}

pub(crate) fn default_pool_max_size() -> usize {
    16
}

pub(crate) fn default_transaction_max_attempts() -> u32 {
    5
}

pub(crate) fn default_transaction_backoff_ms() -> u64 {
    5
}

pub(crate) fn default_service_name() -> String {
    "cart-rs".to_string()
}

pub(crate) fn default_service_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

pub(crate) fn default_log_level() -> String {
    "info".to_string()
}
