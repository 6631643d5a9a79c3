//! Configuration schema definitions for testflux.
//!
//! This module defines all configuration types that can be deserialized from
//! the TOML configuration file. Every setting has a default, so an empty
//! (or missing) file is a valid configuration.
//!
//! # Schema Overview
//!
//! ```text
//! Config (root)
//! ├── ReporterConfig         - Telemetry switch, release version, flush strategy
//! ├── InfluxConfig           - InfluxDB connection parameters
//! │   └── RetentionConfig    - Optional retention policy to create
//! └── ClassifyConfig         - Application rules for fixture paths
//! ```

use serde::{Deserialize, Serialize};

use crate::model::{DEFAULT_RUN_MEASUREMENT, DEFAULT_TEST_MEASUREMENT, UNKNOWN};

/// Root configuration structure for testflux.
///
/// # TOML Structure
///
/// ```toml
/// [reporter]
/// enabled = true
/// release_version = "1.4.0"
/// flush = "batch"
///
/// [influx]
/// host = "influx.internal"
/// port = 8086
/// database = "testresults"
///
/// [[classify.applications]]
/// pattern = "apps/shop/"
/// name = "SHOP"
/// ```
///
/// # Example
///
/// ```
/// use testflux::config::Config;
///
/// let config: Config = toml::from_str(r#"
///     [reporter]
///     enabled = true
///
///     [influx]
///     host = "influx.internal"
/// "#).unwrap();
///
/// assert!(config.reporter.enabled);
/// assert_eq!(config.influx.port, 8086);
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Reporter behaviour.
    #[serde(default)]
    pub reporter: ReporterConfig,

    /// InfluxDB connection.
    #[serde(default)]
    pub influx: InfluxConfig,

    /// Fixture path classification.
    #[serde(default)]
    pub classify: ClassifyConfig,
}

/// When buffered test records are written to the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushStrategy {
    /// Write every test record together with the run record at task end.
    #[default]
    Batch,
    /// Write each test record as soon as its test finishes.
    PerTest,
}

/// Reporter behaviour.
///
/// # Defaults
///
/// | Field | Default | Env override |
/// |-------|---------|--------------|
/// | `enabled` | `false` | `TEST_RESULTS_ENABLED` |
/// | `release_version` | `"UNK"` | `CI_RELEASE_VERSION` |
/// | `flush` | `"batch"` | |
/// | `test_measurement` | `"test"` | |
/// | `run_measurement` | `"run"` | |
/// | `ping_timeout_ms` | 5000 | |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReporterConfig {
    /// Whether results are uploaded at all.
    ///
    /// Telemetry is opt-in: a CI job must switch it on explicitly.
    #[serde(default)]
    pub enabled: bool,

    /// Release version tagged on every record.
    #[serde(default = "default_unknown")]
    pub release_version: String,

    /// When test records are written.
    #[serde(default)]
    pub flush: FlushStrategy,

    /// Measurement name for per-test points.
    #[serde(default = "default_test_measurement")]
    pub test_measurement: String,

    /// Measurement name for per-run points.
    #[serde(default = "default_run_measurement")]
    pub run_measurement: String,

    /// How long the connectivity probe at task start may take.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_ms: u64,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            release_version: default_unknown(),
            flush: FlushStrategy::default(),
            test_measurement: default_test_measurement(),
            run_measurement: default_run_measurement(),
            ping_timeout_ms: default_ping_timeout(),
        }
    }
}

fn default_unknown() -> String {
    UNKNOWN.to_string()
}

fn default_test_measurement() -> String {
    DEFAULT_TEST_MEASUREMENT.to_string()
}

fn default_run_measurement() -> String {
    DEFAULT_RUN_MEASUREMENT.to_string()
}

fn default_ping_timeout() -> u64 {
    5000
}

/// InfluxDB (1.x HTTP API) connection parameters.
///
/// # Defaults
///
/// | Field | Default | Env override |
/// |-------|---------|--------------|
/// | `protocol` | `"http"` | |
/// | `host` | `"localhost"` | `TEST_RESULTS_INFLUX_HOST` |
/// | `port` | 8086 | `TEST_RESULTS_INFLUX_PORT` |
/// | `database` | `"testresults"` | `TEST_RESULTS_INFLUX_DB` |
/// | `username` | `"root"` | `TEST_RESULTS_INFLUX_USER` |
/// | `password` | `"root"` | `TEST_RESULTS_INFLUX_PASSWORD` |
/// | `timeout_secs` | 30 | |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InfluxConfig {
    #[serde(default = "default_protocol")]
    pub protocol: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default = "default_credential")]
    pub username: String,

    #[serde(default = "default_credential")]
    pub password: String,

    /// Request timeout for writes.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retention policy to create (as the database default) before the
    /// first write. Left alone when unset.
    #[serde(default)]
    pub retention: Option<RetentionConfig>,
}

impl InfluxConfig {
    /// Base URL of the InfluxDB HTTP API, e.g. `http://localhost:8086`.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            protocol: default_protocol(),
            host: default_host(),
            port: default_port(),
            database: default_database(),
            username: default_credential(),
            password: default_credential(),
            timeout_secs: default_timeout_secs(),
            retention: None,
        }
    }
}

fn default_protocol() -> String {
    "http".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8086
}

fn default_database() -> String {
    "testresults".to_string()
}

fn default_credential() -> String {
    "root".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// A retention policy to install as the database default.
///
/// ```toml
/// [influx.retention]
/// name = "defaultPolicy"
/// duration = "30d"
/// replication = 1
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetentionConfig {
    #[serde(default = "default_retention_name")]
    pub name: String,

    /// InfluxQL duration literal (`30d`, `4w`, `INF`).
    #[serde(default = "default_retention_duration")]
    pub duration: String,

    #[serde(default = "default_replication")]
    pub replication: u32,
}

fn default_retention_name() -> String {
    "defaultPolicy".to_string()
}

fn default_retention_duration() -> String {
    "30d".to_string()
}

fn default_replication() -> u32 {
    1
}

/// Fixture path classification.
///
/// ```toml
/// [classify]
/// project_name = "storefront"
///
/// [[classify.applications]]
/// pattern = "apps/shop/"
/// name = "SHOP"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ClassifyConfig {
    /// Ordered application rules; the first matching pattern wins.
    #[serde(default)]
    pub applications: Vec<ApplicationRuleConfig>,

    /// Application used when no rule matches.
    ///
    /// Env override: `CI_PROJECT_NAME`.
    #[serde(default)]
    pub project_name: Option<String>,
}

/// Maps fixture paths matching `pattern` (a regex) to application `name`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApplicationRuleConfig {
    pub pattern: String,
    pub name: String,
}
