//! Lifecycle events emitted by a test-automation framework.
//!
//! The framework drives a reporter through five ordered callbacks:
//!
//! ```text
//! task_start → { fixture_start → { test_start → test_done }* }* → task_done
//! ```
//!
//! Each callback's arguments are modelled as a struct here. Outside of a
//! Rust host the events arrive as a JSON-lines stream, one object per line
//! tagged by `event`:
//!
//! ```text
//! {"event":"task_start","startTime":"2024-03-01T12:00:00Z","userAgents":["Chrome 122"],"testCount":2}
//! {"event":"fixture_start","name":"Login","path":"suites/integration/login.ts","meta":{"risk":"HIGH"}}
//! {"event":"test_start","name":"logs in"}
//! {"event":"test_done","name":"logs in","runInfo":{"durationMs":50,"errs":[],"warnings":[]}}
//! {"event":"task_done","endTime":"2024-03-01T12:00:01Z","passed":1,"warnings":[],"result":{"failedCount":0,"skippedCount":0}}
//! ```
//!
//! [`EventReader`] parses such a stream incrementally so that each event is
//! handled as soon as it arrives.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Result type for event stream operations.
pub type EventResult<T> = Result<T, EventError>;

/// Errors that can occur while reading an event stream.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Failed to parse event on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Categorical metadata attached to a fixture or a test.
///
/// Empty strings are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<String>,
}

impl Metadata {
    pub fn feature(&self) -> Option<&str> {
        non_empty(self.feature.as_deref())
    }

    pub fn risk(&self) -> Option<&str> {
        non_empty(self.risk.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// An error reported for a test.
///
/// Frameworks report either a plain message or a structured object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestError {
    Message(String),
    Detailed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(alias = "errMsg")]
        message: String,
    },
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestError::Message(message) => f.write_str(message),
            TestError::Detailed {
                code: Some(code),
                message,
            } => write!(f, "[{}] {}", code, message),
            TestError::Detailed { code: None, message } => f.write_str(message),
        }
    }
}

/// Information about a single finished test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunInfo {
    /// Duration reported by the framework. When absent, the time elapsed
    /// since `test_start` is used instead.
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub errs: Vec<TestError>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub skipped: bool,
    #[serde(default)]
    pub unstable: bool,
}

/// Counts reported by the framework at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    #[serde(default)]
    pub passed_count: u64,
    #[serde(default)]
    pub failed_count: u64,
    #[serde(default)]
    pub skipped_count: u64,
}

/// Fired once, before anything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStart {
    pub start_time: DateTime<Utc>,
    /// Browsers or runners the tests execute in.
    #[serde(default)]
    pub user_agents: Vec<String>,
    pub test_count: u64,
}

/// Fired once per fixture, before its tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureStart {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub meta: Option<Metadata>,
}

/// Fired once per test, before it runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStart {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub meta: Option<Metadata>,
}

/// Fired once per test, after it ran (or was skipped).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDone {
    pub name: String,
    pub run_info: TestRunInfo,
    #[serde(default)]
    pub meta: Option<Metadata>,
}

/// Fired once, after everything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDone {
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub passed: u64,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub result: RunSummary,
}

/// Any lifecycle event, as it appears in a JSON-lines stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    TaskStart(TaskStart),
    FixtureStart(FixtureStart),
    TestStart(TestStart),
    TestDone(TestDone),
    TaskDone(TaskDone),
}

impl LifecycleEvent {
    /// The event's tag, as written in the stream.
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::TaskStart(_) => "task_start",
            LifecycleEvent::FixtureStart(_) => "fixture_start",
            LifecycleEvent::TestStart(_) => "test_start",
            LifecycleEvent::TestDone(_) => "test_done",
            LifecycleEvent::TaskDone(_) => "task_done",
        }
    }
}

/// Incremental reader over a JSON-lines event stream.
pub struct EventReader<R> {
    reader: R,
    line: usize,
    buf: String,
}

impl<R: AsyncBufRead + Unpin> EventReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            buf: String::new(),
        }
    }

    /// Read the next event, skipping blank lines.
    ///
    /// Returns `Ok(None)` at end of stream.
    pub async fn next_event(&mut self) -> EventResult<Option<LifecycleEvent>> {
        loop {
            self.buf.clear();
            let n = self.reader.read_line(&mut self.buf).await?;
            if n == 0 {
                return Ok(None);
            }
            self.line += 1;

            let trimmed = self.buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            return serde_json::from_str(trimmed)
                .map(Some)
                .map_err(|source| EventError::Parse {
                    line: self.line,
                    source,
                });
        }
    }
}
