//! Agent configuration.
//!
//! Aggregates client behavior, this instance's identity and the registry
//! server location into a single Config struct that can be loaded from YAML
//! files or environment variables.

mod client;
mod instance;
mod registry;

pub use client::{BackoffKind, ClientConfig, RetryConfig};
pub use instance::InstanceConfig;
pub use registry::ServiceUrlConfig;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "eureka.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "EUREKA_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "EUREKA";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "EUREKA_LOG";

use serde::Deserialize;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Missing required configuration: {0}")]
    Missing(&'static str),

    #[error("No registry service URL configured")]
    NoServiceUrl,

    #[error("Invalid registry service URL '{url}': {message}")]
    InvalidServiceUrl { url: String, message: String },
}

/// Main agent configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Client behavior (fetching, registration, shutdown).
    pub client: ClientConfig,
    /// This process's registrable identity.
    pub instance: InstanceConfig,
    /// Registry server location.
    pub service_url: ServiceUrlConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `eureka.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix, e.g.
    ///    `EUREKA__INSTANCE__APP_NAME=orders`
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Parse configuration from a YAML document, applying defaults for
    /// anything it leaves out.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Create config for testing: no signal handling, no background fetch.
    pub fn for_test() -> Self {
        let mut config = Self::default();
        config.client.handle_signals = false;
        config.client.fetch_registry = false;
        config.instance.app_name = "test-app".to_string();
        config.instance.ip_address = "127.0.0.1".to_string();
        config
    }
}
