//! Configuration loading and schema definitions for testflux.
//!
//! Settings are resolved in three layers, highest precedence first:
//!
//! 1. Environment variables (the names CI pipelines already export)
//! 2. The TOML configuration file, if present
//! 3. Built-in defaults
//!
//! The file format is described in the README.

pub mod schema;

pub use schema::*;

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

/// Errors in resolved configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required setting is empty and has no usable default.
    #[error("Missing required configuration: {0}")]
    Missing(&'static str),

    /// An environment override could not be parsed.
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

pub const ENV_RELEASE_VERSION: &str = "CI_RELEASE_VERSION";
pub const ENV_PROJECT_NAME: &str = "CI_PROJECT_NAME";
pub const ENV_ENABLED: &str = "TEST_RESULTS_ENABLED";
pub const ENV_INFLUX_HOST: &str = "TEST_RESULTS_INFLUX_HOST";
pub const ENV_INFLUX_PORT: &str = "TEST_RESULTS_INFLUX_PORT";
pub const ENV_INFLUX_DB: &str = "TEST_RESULTS_INFLUX_DB";
pub const ENV_INFLUX_USER: &str = "TEST_RESULTS_INFLUX_USER";
pub const ENV_INFLUX_PASSWORD: &str = "TEST_RESULTS_INFLUX_PASSWORD";

/// A source of environment variables.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// The process environment.
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Loads testflux configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read (e.g., doesn't exist or permission denied)
/// - The file contains invalid TOML syntax
/// - The configuration doesn't match the expected schema
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Loads testflux configuration from a TOML string.
///
/// # Example
///
/// ```
/// use testflux::config::load_config_str;
///
/// let config = load_config_str(r#"
///     [reporter]
///     release_version = "2.0.1"
///     flush = "per_test"
/// "#)?;
///
/// assert_eq!(config.reporter.release_version, "2.0.1");
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;

    Ok(config)
}

/// Resolves the effective configuration: the file at `path` (defaults when
/// it does not exist) with environment overrides applied on top.
pub fn resolve_config(path: &Path, env: &impl EnvSource) -> Result<Config> {
    let mut config = if path.exists() {
        load_config(path)?
    } else {
        tracing::debug!("No config file at {}, using defaults", path.display());
        Config::default()
    };

    config
        .apply_env_overrides(env)
        .context("Invalid environment override")?;

    Ok(config)
}

impl Config {
    /// Overlay environment variables onto this configuration.
    pub fn apply_env_overrides(&mut self, env: &impl EnvSource) -> Result<(), ConfigError> {
        if let Some(v) = env.var(ENV_ENABLED) {
            self.reporter.enabled = v == "true";
        }
        if let Some(v) = env.var(ENV_RELEASE_VERSION) {
            self.reporter.release_version = v;
        }
        if let Some(v) = env.var(ENV_PROJECT_NAME) {
            self.classify.project_name = Some(v);
        }
        if let Some(v) = env.var(ENV_INFLUX_HOST) {
            self.influx.host = v;
        }
        if let Some(v) = env.var(ENV_INFLUX_PORT) {
            self.influx.port = v.trim().parse().map_err(|_| ConfigError::Invalid {
                key: ENV_INFLUX_PORT,
                value: v.clone(),
            })?;
        }
        if let Some(v) = env.var(ENV_INFLUX_DB) {
            self.influx.database = v;
        }
        if let Some(v) = env.var(ENV_INFLUX_USER) {
            self.influx.username = v;
        }
        if let Some(v) = env.var(ENV_INFLUX_PASSWORD) {
            self.influx.password = v;
        }
        Ok(())
    }

    /// Check that everything the sink needs is present.
    ///
    /// Only meaningful when telemetry is enabled; a disabled reporter
    /// never talks to the sink.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.reporter.enabled {
            return Ok(());
        }
        if self.influx.host.trim().is_empty() {
            return Err(ConfigError::Missing("influx.host"));
        }
        if self.influx.database.trim().is_empty() {
            return Err(ConfigError::Missing("influx.database"));
        }
        if self.influx.port == 0 {
            return Err(ConfigError::Missing("influx.port"));
        }
        if self.reporter.test_measurement.trim().is_empty() {
            return Err(ConfigError::Missing("reporter.test_measurement"));
        }
        if self.reporter.run_measurement.trim().is_empty() {
            return Err(ConfigError::Missing("reporter.run_measurement"));
        }
        Ok(())
    }
}
