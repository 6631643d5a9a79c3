//! Telemetry records produced for each test and for each run.
//!
//! Two fixed-shape records leave the reporter:
//!
//! - [`TestRecord`]: one per executed test, timestamped at the moment the
//!   test finished.
//! - [`RunRecord`]: one per run, carrying totals and the overall verdict.
//!
//! Both convert into a [`Point`], the measurement/tags/fields shape a
//! time-series [`Sink`](crate::sink::Sink) accepts. Every tag is always
//! present: values that could not be determined are written as [`UNKNOWN`]
//! so that dashboards grouping on a tag never lose rows.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel written for any tag whose real value could not be determined.
pub const UNKNOWN: &str = "UNK";

/// Default measurement name for per-test points.
pub const DEFAULT_TEST_MEASUREMENT: &str = "test";

/// Default measurement name for per-run points.
pub const DEFAULT_RUN_MEASUREMENT: &str = "run";

/// Normalizes an optional categorical value, mapping absent or blank
/// values to [`UNKNOWN`].
pub fn categorical(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => UNKNOWN.to_string(),
    }
}

/// Outcome of a single test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestResult {
    Successful,
    Failed,
    Skipped,
}

impl TestResult {
    /// Classifies a finished test.
    ///
    /// The skip flag is checked before errors: a skipped test is reported
    /// as skipped even if the framework attached errors to it.
    pub fn classify(skipped: bool, has_errors: bool) -> Self {
        if skipped {
            TestResult::Skipped
        } else if has_errors {
            TestResult::Failed
        } else {
            TestResult::Successful
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestResult::Successful => "SUCCESSFUL",
            TestResult::Failed => "FAILED",
            TestResult::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall verdict of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunResult {
    Successful,
    Failed,
}

impl RunResult {
    /// A run fails when any test failed, or when it took no measurable
    /// time at all. A zero duration means the run aborted before doing
    /// any work and must not show up as green.
    pub fn classify(failed: u64, duration_ms: u64) -> Self {
        if failed > 0 || duration_ms == 0 {
            RunResult::Failed
        } else {
            RunResult::Successful
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunResult::Successful => "SUCCESSFUL",
            RunResult::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of test suite a fixture belongs to, derived from its path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestType {
    /// Component tests (`CT`).
    Component,
    /// Integration tests (`IT`).
    Integration,
    #[default]
    Unknown,
}

impl TestType {
    /// Derives the test type from a fixture path.
    ///
    /// | Path contains | Test type |
    /// |---------------|-----------|
    /// | `component` | `CT` |
    /// | `integration` | `IT` |
    /// | anything else | `UNK` |
    pub fn from_path(path: &str) -> Self {
        if path.contains("component") {
            TestType::Component
        } else if path.contains("integration") {
            TestType::Integration
        } else {
            TestType::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::Component => "CT",
            TestType::Integration => "IT",
            TestType::Unknown => UNKNOWN,
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed test execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestRecord {
    pub measurement: String,
    /// Instant the test finished, nanosecond precision.
    pub timestamp: DateTime<Utc>,

    // Tags
    pub application: String,
    pub test_type: TestType,
    pub feature: String,
    pub risk: String,
    pub release_version: String,
    pub result: TestResult,
    pub run: String,
    pub unstable: bool,

    // Fields
    pub test_name: String,
    pub fixture_name: String,
    pub duration_ms: u64,
    /// Numbered error strings (`"1) message"`), in the order reported.
    pub error_messages: Vec<String>,
    pub warning_messages: Vec<String>,
}

impl TestRecord {
    pub fn to_point(&self) -> Point {
        Point::new(&self.measurement)
            .tag("application", &self.application)
            .tag("testType", self.test_type.as_str())
            .tag("feature", &self.feature)
            .tag("risk", &self.risk)
            .tag("releaseVersion", &self.release_version)
            .tag("result", self.result.as_str())
            .tag("run", &self.run)
            .tag("unstable", if self.unstable { "true" } else { "false" })
            .field("testName", FieldValue::from(self.test_name.as_str()))
            .field("fixtureName", FieldValue::from(self.fixture_name.as_str()))
            .field("durationMs", FieldValue::from(self.duration_ms))
            .field("errorMessages", FieldValue::from(self.error_messages.join(",")))
            .field(
                "warningMessages",
                FieldValue::from(self.warning_messages.join(",")),
            )
            .timestamp(self.timestamp)
    }
}

/// One completed run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub measurement: String,
    /// Instant the run ended, as reported by the framework.
    pub timestamp: DateTime<Utc>,

    // Tags
    pub application: String,
    pub release_version: String,
    pub run: String,
    pub result: RunResult,

    // Fields
    pub duration_ms: u64,
    pub test_cases_total: u64,
    pub test_cases_passed: u64,
    pub test_cases_failed: u64,
    pub test_cases_skipped: u64,
}

impl RunRecord {
    pub fn to_point(&self) -> Point {
        Point::new(&self.measurement)
            .tag("application", &self.application)
            .tag("releaseVersion", &self.release_version)
            .tag("run", &self.run)
            .tag("result", self.result.as_str())
            .field("durationMs", FieldValue::from(self.duration_ms))
            .field("duration", FieldValue::from(format_duration(self.duration_ms)))
            .field("testCasesTotal", FieldValue::from(self.test_cases_total))
            .field("testCasesPassed", FieldValue::from(self.test_cases_passed))
            .field("testCasesFailed", FieldValue::from(self.test_cases_failed))
            .field("testCasesSkipped", FieldValue::from(self.test_cases_skipped))
            .timestamp(self.timestamp)
    }
}

/// Formats a millisecond duration as `"1h 02m 03s"`.
pub fn format_duration(duration_ms: u64) -> String {
    let total_secs = duration_ms / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{}h {:02}m {:02}s", hours, minutes, seconds)
}

/// A typed field value in a [`Point`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Integer(i64),
    String(String),
    Boolean(bool),
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

/// A single time-series data point, schema-tagged by its measurement name.
///
/// Tags and fields are kept sorted by key, which is the order InfluxDB
/// prefers for tag sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    /// Point time; the store assigns its own when `None`.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Point {
    /// Create a point with no tags or fields.
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: None,
        }
    }

    /// Add a tag.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Add a field.
    pub fn field(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Set the timestamp.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}
