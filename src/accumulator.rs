//! Run accumulator: turns lifecycle events into telemetry records.
//!
//! A [`TestRunAccumulator`] owns every piece of state carried between the
//! callbacks of one run (current fixture, sticky application, categorical
//! metadata, timing anchors, counts) and produces a [`TestRecord`] at each
//! `test_done` and a [`RunRecord`] at `task_done`.
//!
//! # States
//!
//! ```text
//!          task_start          test_start
//!   Idle ─────────────► RunActive ─────────► TestActive
//!                        │  ▲  ▲                 │
//!          fixture_start └──┘  └─────────────────┘
//!                        │          test_done
//!                        │ task_done
//!                        ▼
//!                       Done
//! ```
//!
//! Calls that do not fit the current state are rejected with
//! [`AccumulatorError::ProtocolViolation`] and leave the state untouched.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::classify::Classifier;
use crate::clock::Clock;
use crate::config::ReporterConfig;
use crate::events::{FixtureStart, TaskDone, TaskStart, TestDone, TestStart};
use crate::model::{
    DEFAULT_RUN_MEASUREMENT, DEFAULT_TEST_MEASUREMENT, RunRecord, RunResult, TestRecord,
    TestResult, TestType, UNKNOWN, categorical,
};

/// Format of the human-readable `run` tag.
pub const RUN_LABEL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Result type for accumulator operations.
pub type AccumulatorResult<T> = Result<T, AccumulatorError>;

/// Errors raised by the accumulator.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AccumulatorError {
    /// A lifecycle callback arrived out of order.
    #[error("Lifecycle protocol violation: {operation} is not allowed while {state}")]
    ProtocolViolation {
        operation: &'static str,
        state: RunState,
    },
}

/// Observable state of an accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Waiting for `task_start`.
    Idle,
    /// Between tests.
    RunActive,
    /// A test has started and not finished.
    TestActive,
    /// `task_done` has been handled.
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::RunActive => "run active",
            RunState::TestActive => "test active",
            RunState::Done => "done",
        };
        f.write_str(s)
    }
}

/// Context of the fixture whose tests are currently running.
///
/// Replaced wholesale at every `fixture_start`.
#[derive(Debug, Clone)]
struct FixtureContext {
    name: String,
    test_type: TestType,
    feature: String,
    risk: String,
}

impl Default for FixtureContext {
    fn default() -> Self {
        Self {
            name: UNKNOWN.to_string(),
            test_type: TestType::Unknown,
            feature: UNKNOWN.to_string(),
            risk: UNKNOWN.to_string(),
        }
    }
}

#[derive(Debug)]
struct RunContext {
    /// Start instant reported by the framework.
    start_time: DateTime<Utc>,
    /// Wall-clock and monotonic readings taken together at task start.
    /// Test timestamps are `wall_origin + (monotonic - mono_origin)`.
    wall_origin: DateTime<Utc>,
    mono_origin: Duration,
    release_version: String,
    run_label: String,
    test_cases_total: u64,
    /// Sticky: set by the first fixture that classifies, then kept.
    application: Option<String>,
    fixture: FixtureContext,
    /// Monotonic reading at the current test's start.
    test_started_at: Option<Duration>,
    tests_done: u64,
}

#[derive(Debug)]
enum Phase {
    Idle,
    Running(Box<RunContext>),
    Done,
}

/// Accumulates one run's lifecycle events into records.
///
/// One accumulator serves exactly one run; create a new one per run.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use chrono::{TimeZone, Utc};
/// use testflux::accumulator::TestRunAccumulator;
/// use testflux::classify::PathClassifier;
/// use testflux::clock::ManualClock;
/// use testflux::events::*;
///
/// let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
/// let mut acc = TestRunAccumulator::new(
///     Arc::new(ManualClock::new(t0)),
///     Arc::new(PathClassifier::new()),
/// );
///
/// acc.on_task_start(&TaskStart { start_time: t0, user_agents: vec![], test_count: 1 })?;
/// acc.on_fixture_start(&FixtureStart {
///     name: "F".into(),
///     path: "suites/integration/x".into(),
///     meta: None,
/// })?;
/// acc.on_test_start(&TestStart::default())?;
/// let record = acc.on_test_done(&TestDone {
///     name: "t1".into(),
///     run_info: TestRunInfo { duration_ms: Some(50), ..Default::default() },
///     meta: None,
/// })?;
/// assert_eq!(record.test_type.as_str(), "IT");
/// # Ok::<(), testflux::accumulator::AccumulatorError>(())
/// ```
pub struct TestRunAccumulator {
    clock: Arc<dyn Clock>,
    classifier: Arc<dyn Classifier>,
    release_version: String,
    test_measurement: String,
    run_measurement: String,
    phase: Phase,
    test_records: Vec<TestRecord>,
}

impl TestRunAccumulator {
    /// Create an idle accumulator with default measurement names and an
    /// unknown release version.
    pub fn new(clock: Arc<dyn Clock>, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            clock,
            classifier,
            release_version: UNKNOWN.to_string(),
            test_measurement: DEFAULT_TEST_MEASUREMENT.to_string(),
            run_measurement: DEFAULT_RUN_MEASUREMENT.to_string(),
            phase: Phase::Idle,
            test_records: Vec::new(),
        }
    }

    /// Create an accumulator using the release version and measurement
    /// names from the reporter config.
    pub fn from_config(
        config: &ReporterConfig,
        clock: Arc<dyn Clock>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self::new(clock, classifier)
            .with_release_version(&config.release_version)
            .with_measurements(&config.test_measurement, &config.run_measurement)
    }

    /// Set the release version resolved at task start.
    pub fn with_release_version(mut self, release_version: &str) -> Self {
        self.release_version = categorical(Some(release_version));
        self
    }

    /// Set the measurement names of emitted records.
    pub fn with_measurements(mut self, test: impl Into<String>, run: impl Into<String>) -> Self {
        self.test_measurement = test.into();
        self.run_measurement = run.into();
        self
    }

    /// Current state.
    pub fn state(&self) -> RunState {
        match &self.phase {
            Phase::Idle => RunState::Idle,
            Phase::Running(run) if run.test_started_at.is_some() => RunState::TestActive,
            Phase::Running(_) => RunState::RunActive,
            Phase::Done => RunState::Done,
        }
    }

    /// Test records emitted but not yet taken.
    pub fn pending_test_records(&self) -> &[TestRecord] {
        &self.test_records
    }

    /// Drain the buffered test records.
    pub fn take_test_records(&mut self) -> Vec<TestRecord> {
        std::mem::take(&mut self.test_records)
    }

    /// Number of tests finished so far in this run.
    pub fn tests_done(&self) -> u64 {
        match &self.phase {
            Phase::Running(run) => run.tests_done,
            _ => 0,
        }
    }

    /// Begin the run.
    pub fn on_task_start(&mut self, event: &TaskStart) -> AccumulatorResult<()> {
        if !matches!(self.phase, Phase::Idle) {
            return Err(self.violation("task_start"));
        }

        let run = RunContext {
            start_time: event.start_time,
            wall_origin: self.clock.now(),
            mono_origin: self.clock.monotonic(),
            release_version: self.release_version.clone(),
            run_label: event.start_time.format(RUN_LABEL_FORMAT).to_string(),
            test_cases_total: event.test_count,
            application: None,
            fixture: FixtureContext::default(),
            test_started_at: None,
            tests_done: 0,
        };

        tracing::debug!(
            "Run {} started: {} tests, release {}",
            run.run_label,
            run.test_cases_total,
            run.release_version
        );

        self.phase = Phase::Running(Box::new(run));
        Ok(())
    }

    /// Load the context of a new fixture.
    ///
    /// The application is classified only until a fixture yields one; the
    /// test type and the feature/risk metadata are replaced every time,
    /// with absent metadata resetting to `UNK`.
    pub fn on_fixture_start(&mut self, event: &FixtureStart) -> AccumulatorResult<()> {
        let classifier = Arc::clone(&self.classifier);
        let run = self.running_between_tests("fixture_start")?;

        if run.application.is_none() {
            run.application = classifier
                .application(&event.path)
                .filter(|app| !app.trim().is_empty() && app != UNKNOWN);
            if let Some(app) = &run.application {
                tracing::debug!("Application resolved to {} from {}", app, event.path);
            }
        }

        let meta = event.meta.as_ref();
        run.fixture = FixtureContext {
            name: event.name.clone(),
            test_type: classifier.test_type(&event.path),
            feature: categorical(meta.and_then(|m| m.feature())),
            risk: categorical(meta.and_then(|m| m.risk())),
        };

        Ok(())
    }

    /// Mark the start of a test.
    pub fn on_test_start(&mut self, _event: &TestStart) -> AccumulatorResult<()> {
        let now = self.clock.monotonic();
        let run = self.running_between_tests("test_start")?;
        run.test_started_at = Some(now);
        Ok(())
    }

    /// Finish the current test and emit its record.
    ///
    /// The record is also buffered until taken with
    /// [`take_test_records`](Self::take_test_records).
    pub fn on_test_done(&mut self, event: &TestDone) -> AccumulatorResult<TestRecord> {
        let now = self.clock.monotonic();
        let test_measurement = self.test_measurement.clone();

        let state = self.state();
        let Phase::Running(run) = &mut self.phase else {
            return Err(AccumulatorError::ProtocolViolation {
                operation: "test_done",
                state,
            });
        };
        let Some(started_at) = run.test_started_at.take() else {
            return Err(AccumulatorError::ProtocolViolation {
                operation: "test_done",
                state,
            });
        };

        // Test metadata overrides the fixture only for keys it carries.
        let meta = event.meta.as_ref();
        let feature = meta
            .and_then(|m| m.feature())
            .map(|f| categorical(Some(f)))
            .unwrap_or_else(|| run.fixture.feature.clone());
        let risk = meta
            .and_then(|m| m.risk())
            .map(|r| categorical(Some(r)))
            .unwrap_or_else(|| run.fixture.risk.clone());

        let info = &event.run_info;
        let result = TestResult::classify(info.skipped, !info.errs.is_empty());

        let error_messages = info
            .errs
            .iter()
            .enumerate()
            .map(|(idx, err)| format!("{}) {}", idx + 1, err))
            .collect();
        let warning_messages = info.warnings.iter().map(ToString::to_string).collect();

        let duration_ms = info
            .duration_ms
            .unwrap_or_else(|| millis(now.saturating_sub(started_at)));

        let record = TestRecord {
            measurement: test_measurement,
            timestamp: anchored_timestamp(run.wall_origin, run.mono_origin, now),
            application: categorical(run.application.as_deref()),
            test_type: run.fixture.test_type,
            feature,
            risk,
            release_version: run.release_version.clone(),
            result,
            run: run.run_label.clone(),
            unstable: info.unstable,
            test_name: categorical(Some(event.name.as_str())),
            fixture_name: run.fixture.name.clone(),
            duration_ms,
            error_messages,
            warning_messages,
        };

        run.tests_done += 1;
        tracing::debug!(
            "Test {} / {} finished: {}",
            record.fixture_name,
            record.test_name,
            record.result
        );

        self.test_records.push(record.clone());
        Ok(record)
    }

    /// Finish the run and emit its record.
    pub fn on_task_done(&mut self, event: &TaskDone) -> AccumulatorResult<RunRecord> {
        let state = self.state();
        let run = match std::mem::replace(&mut self.phase, Phase::Done) {
            Phase::Running(run) if run.test_started_at.is_none() => run,
            other => {
                self.phase = other;
                return Err(AccumulatorError::ProtocolViolation {
                    operation: "task_done",
                    state,
                });
            }
        };

        let duration_ms = u64::try_from((event.end_time - run.start_time).num_milliseconds())
            .unwrap_or(0);
        let summary = event.result;

        let record = RunRecord {
            measurement: self.run_measurement.clone(),
            timestamp: event.end_time,
            application: categorical(run.application.as_deref()),
            release_version: run.release_version,
            run: run.run_label,
            result: RunResult::classify(summary.failed_count, duration_ms),
            duration_ms,
            test_cases_total: run.test_cases_total,
            test_cases_passed: event.passed,
            test_cases_failed: summary.failed_count,
            test_cases_skipped: summary.skipped_count,
        };

        if run.tests_done != run.test_cases_total {
            tracing::debug!(
                "Run announced {} tests but {} finished",
                run.test_cases_total,
                run.tests_done
            );
        }

        Ok(record)
    }

    /// The run context, provided no test is in flight.
    fn running_between_tests(&mut self, operation: &'static str) -> AccumulatorResult<&mut RunContext> {
        let state = self.state();
        match &mut self.phase {
            Phase::Running(run) if run.test_started_at.is_none() => Ok(&mut **run),
            _ => Err(AccumulatorError::ProtocolViolation { operation, state }),
        }
    }

    fn violation(&self, operation: &'static str) -> AccumulatorError {
        AccumulatorError::ProtocolViolation {
            operation,
            state: self.state(),
        }
    }
}

/// Wall-clock anchor plus the monotonic time elapsed since it was taken.
fn anchored_timestamp(wall_origin: DateTime<Utc>, mono_origin: Duration, now: Duration) -> DateTime<Utc> {
    let elapsed = now.saturating_sub(mono_origin);
    TimeDelta::from_std(elapsed)
        .ok()
        .and_then(|delta| wall_origin.checked_add_signed(delta))
        .unwrap_or(wall_origin)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::PathClassifier;
    use crate::clock::ManualClock;
    use crate::events::{Metadata, RunSummary, TestError, TestRunInfo};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn classifier() -> Arc<dyn Classifier> {
        Arc::new(
            PathClassifier::new()
                .with_rule("shop", "SHOP")
                .unwrap()
                .with_rule("admin", "ADMIN")
                .unwrap(),
        )
    }

    fn accumulator(clock: &ManualClock) -> TestRunAccumulator {
        TestRunAccumulator::new(Arc::new(clock.clone()), classifier()).with_release_version("1.0.0")
    }

    fn task_start(count: u64) -> TaskStart {
        TaskStart {
            start_time: t0(),
            user_agents: vec!["chrome".to_string()],
            test_count: count,
        }
    }

    fn fixture(name: &str, path: &str, meta: Option<Metadata>) -> FixtureStart {
        FixtureStart {
            name: name.to_string(),
            path: path.to_string(),
            meta,
        }
    }

    fn meta(feature: Option<&str>, risk: Option<&str>) -> Option<Metadata> {
        Some(Metadata {
            feature: feature.map(str::to_string),
            risk: risk.map(str::to_string),
        })
    }

    fn done(name: &str, run_info: TestRunInfo, meta: Option<Metadata>) -> TestDone {
        TestDone {
            name: name.to_string(),
            run_info,
            meta,
        }
    }

    fn passing(duration_ms: u64) -> TestRunInfo {
        TestRunInfo {
            duration_ms: Some(duration_ms),
            ..Default::default()
        }
    }

    fn task_done(after_ms: i64, failed: u64, skipped: u64) -> TaskDone {
        TaskDone {
            end_time: t0() + TimeDelta::milliseconds(after_ms),
            passed: 0,
            warnings: vec![],
            result: RunSummary {
                passed_count: 0,
                failed_count: failed,
                skipped_count: skipped,
            },
        }
    }

    fn run_test(acc: &mut TestRunAccumulator, name: &str, info: TestRunInfo, meta: Option<Metadata>) -> TestRecord {
        acc.on_test_start(&TestStart::default()).unwrap();
        acc.on_test_done(&done(name, info, meta)).unwrap()
    }

    #[test]
    fn test_scenario_single_integration_test() {
        let clock = ManualClock::new(t0());
        let mut acc = accumulator(&clock);

        acc.on_task_start(&task_start(2)).unwrap();
        acc.on_fixture_start(&fixture("F", "suites/integration/x", meta(None, Some("HIGH"))))
            .unwrap();
        acc.on_test_start(&TestStart::default()).unwrap();
        clock.advance(Duration::from_millis(50));
        let record = acc
            .on_test_done(&done("t1", passing(50), Some(Metadata::default())))
            .unwrap();

        assert_eq!(record.test_type, TestType::Integration);
        assert_eq!(record.risk, "HIGH");
        assert_eq!(record.feature, UNKNOWN);
        assert_eq!(record.result, TestResult::Successful);
        assert_eq!(record.duration_ms, 50);
        assert_eq!(record.fixture_name, "F");
        assert_eq!(record.test_name, "t1");
        assert_eq!(record.release_version, "1.0.0");
        assert_eq!(record.run, "2024-03-01 12:00:00");
        assert_eq!(record.application, UNKNOWN);
        assert!(record.error_messages.is_empty());
        assert!(record.warning_messages.is_empty());

        let run = acc.on_task_done(&task_done(50, 0, 0)).unwrap();
        assert_eq!(run.result, RunResult::Successful);
        assert_eq!(run.test_cases_total, 2);
        assert_eq!(run.test_cases_failed, 0);
        assert_eq!(run.duration_ms, 50);
        assert_eq!(acc.state(), RunState::Done);
    }

    #[test]
    fn test_one_record_per_test_done() {
        let clock = ManualClock::new(t0());
        let mut acc = accumulator(&clock);
        acc.on_task_start(&task_start(3)).unwrap();
        acc.on_fixture_start(&fixture("A", "shop/component/a", None)).unwrap();
        run_test(&mut acc, "a1", passing(1), None);
        run_test(&mut acc, "a2", passing(1), None);
        acc.on_fixture_start(&fixture("B", "shop/integration/b", None)).unwrap();
        run_test(&mut acc, "b1", passing(1), None);

        assert_eq!(acc.tests_done(), 3);
        let records = acc.take_test_records();
        assert_eq!(records.len(), 3);
        assert!(acc.pending_test_records().is_empty());

        acc.on_task_done(&task_done(10, 0, 0)).unwrap();
    }

    #[test]
    fn test_skip_wins_over_errors() {
        let clock = ManualClock::new(t0());
        let mut acc = accumulator(&clock);
        acc.on_task_start(&task_start(1)).unwrap();
        acc.on_fixture_start(&fixture("F", "x", None)).unwrap();

        let info = TestRunInfo {
            duration_ms: Some(0),
            errs: vec![TestError::Message("boom".to_string())],
            warnings: vec!["careful".to_string()],
            skipped: true,
            unstable: false,
        };
        let record = run_test(&mut acc, "t", info, None);

        assert_eq!(record.result, TestResult::Skipped);
        assert_eq!(record.error_messages, vec!["1) boom"]);
    }

    #[test]
    fn test_errors_numbered_in_order() {
        let clock = ManualClock::new(t0());
        let mut acc = accumulator(&clock);
        acc.on_task_start(&task_start(1)).unwrap();
        acc.on_fixture_start(&fixture("F", "x", None)).unwrap();

        let info = TestRunInfo {
            duration_ms: Some(5),
            errs: vec![
                TestError::Message("boom".to_string()),
                TestError::Message("bang".to_string()),
            ],
            warnings: vec!["w1".to_string(), "w2".to_string()],
            ..Default::default()
        };
        let record = run_test(&mut acc, "t", info, None);

        assert_eq!(record.result, TestResult::Failed);
        assert_eq!(record.error_messages, vec!["1) boom", "2) bang"]);
        assert_eq!(record.warning_messages, vec!["w1", "w2"]);
    }

    #[test]
    fn test_application_is_sticky() {
        let clock = ManualClock::new(t0());
        let mut acc = accumulator(&clock);
        acc.on_task_start(&task_start(2)).unwrap();

        acc.on_fixture_start(&fixture("A", "apps/shop/a", None)).unwrap();
        let first = run_test(&mut acc, "a", passing(1), None);
        acc.on_fixture_start(&fixture("B", "apps/admin/b", None)).unwrap();
        let second = run_test(&mut acc, "b", passing(1), None);

        assert_eq!(first.application, "SHOP");
        assert_eq!(second.application, "SHOP");

        let run = acc.on_task_done(&task_done(100, 0, 0)).unwrap();
        assert_eq!(run.application, "SHOP");
    }

    #[test]
    fn test_application_resolves_after_unclassified_fixture() {
        let clock = ManualClock::new(t0());
        let mut acc = accumulator(&clock);
        acc.on_task_start(&task_start(2)).unwrap();

        acc.on_fixture_start(&fixture("A", "lib/a", None)).unwrap();
        let first = run_test(&mut acc, "a", passing(1), None);
        acc.on_fixture_start(&fixture("B", "apps/admin/b", None)).unwrap();
        let second = run_test(&mut acc, "b", passing(1), None);

        assert_eq!(first.application, UNKNOWN);
        assert_eq!(second.application, "ADMIN");
    }

    #[test]
    fn test_test_type_follows_each_fixture() {
        let clock = ManualClock::new(t0());
        let mut acc = accumulator(&clock);
        acc.on_task_start(&task_start(2)).unwrap();

        acc.on_fixture_start(&fixture("A", "suites/component/a", None)).unwrap();
        let first = run_test(&mut acc, "a", passing(1), None);
        acc.on_fixture_start(&fixture("B", "suites/integration/b", None)).unwrap();
        let second = run_test(&mut acc, "b", passing(1), None);

        assert_eq!(first.test_type, TestType::Component);
        assert_eq!(second.test_type, TestType::Integration);
    }

    #[test]
    fn test_fixture_metadata_replaced_not_merged() {
        let clock = ManualClock::new(t0());
        let mut acc = accumulator(&clock);
        acc.on_task_start(&task_start(2)).unwrap();

        acc.on_fixture_start(&fixture("A", "a", meta(Some("LOGIN"), Some("HIGH"))))
            .unwrap();
        let first = run_test(&mut acc, "a", passing(1), None);
        acc.on_fixture_start(&fixture("B", "b", meta(Some("CART"), None))).unwrap();
        let second = run_test(&mut acc, "b", passing(1), None);

        assert_eq!((first.feature.as_str(), first.risk.as_str()), ("LOGIN", "HIGH"));
        assert_eq!((second.feature.as_str(), second.risk.as_str()), ("CART", UNKNOWN));
    }

    #[test]
    fn test_test_metadata_only_overrides_present_keys() {
        let clock = ManualClock::new(t0());
        let mut acc = accumulator(&clock);
        acc.on_task_start(&task_start(2)).unwrap();
        acc.on_fixture_start(&fixture("A", "a", meta(Some("LOGIN"), Some("HIGH"))))
            .unwrap();

        let overridden = run_test(&mut acc, "t1", passing(1), meta(Some("SIGNUP"), None));
        assert_eq!(overridden.feature, "SIGNUP");
        assert_eq!(overridden.risk, "HIGH");

        // The override applies to that test only.
        let next = run_test(&mut acc, "t2", passing(1), None);
        assert_eq!(next.feature, "LOGIN");
        assert_eq!(next.risk, "HIGH");
    }

    #[test]
    fn test_test_metadata_trimmed_like_fixture_metadata() {
        let clock = ManualClock::new(t0());
        let mut acc = accumulator(&clock);
        acc.on_task_start(&task_start(2)).unwrap();
        acc.on_fixture_start(&fixture("A", "a", meta(Some("LOGIN"), Some("HIGH"))))
            .unwrap();
        let from_fixture = run_test(&mut acc, "t1", passing(1), None);

        let overridden = run_test(
            &mut acc,
            "t2",
            passing(1),
            meta(Some(" LOGIN "), Some("\tHIGH\n")),
        );

        assert_eq!(overridden.feature, "LOGIN");
        assert_eq!(overridden.risk, "HIGH");
        assert_eq!(overridden.feature, from_fixture.feature);
        assert_eq!(overridden.risk, from_fixture.risk);
    }

    #[test]
    fn test_timestamps_anchor_to_monotonic_clock() {
        let clock = ManualClock::new(t0());
        let mut acc = accumulator(&clock);
        acc.on_task_start(&task_start(2)).unwrap();
        acc.on_fixture_start(&fixture("A", "a", None)).unwrap();

        clock.advance(Duration::from_millis(250));
        let first = run_test(&mut acc, "t1", passing(1), None);

        // A wall-clock jump backwards must not reorder test timestamps.
        clock.set_wall(t0() - TimeDelta::hours(1));
        clock.advance(Duration::from_nanos(1_500));
        let second = run_test(&mut acc, "t2", passing(1), None);

        assert_eq!(first.timestamp, t0() + TimeDelta::milliseconds(250));
        assert_eq!(
            second.timestamp,
            t0() + TimeDelta::milliseconds(250) + TimeDelta::nanoseconds(1_500)
        );
        assert!(first.timestamp <= second.timestamp);
    }

    #[test]
    fn test_missing_duration_measured_from_test_start() {
        let clock = ManualClock::new(t0());
        let mut acc = accumulator(&clock);
        acc.on_task_start(&task_start(1)).unwrap();
        acc.on_fixture_start(&fixture("A", "a", None)).unwrap();

        acc.on_test_start(&TestStart::default()).unwrap();
        clock.advance(Duration::from_millis(42));
        let record = acc
            .on_test_done(&done("t", TestRunInfo::default(), None))
            .unwrap();

        assert_eq!(record.duration_ms, 42);
    }

    #[test]
    fn test_run_result_truth_table() {
        for (failed, duration, expected) in [
            (0, 0, RunResult::Failed),
            (0, 100, RunResult::Successful),
            (1, 0, RunResult::Failed),
            (1, 100, RunResult::Failed),
        ] {
            let clock = ManualClock::new(t0());
            let mut acc = accumulator(&clock);
            acc.on_task_start(&task_start(0)).unwrap();
            let run = acc.on_task_done(&task_done(duration, failed, 0)).unwrap();
            assert_eq!(run.result, expected, "failed={failed} duration={duration}");
            assert_eq!(run.duration_ms, duration as u64);
        }
    }

    #[test]
    fn test_end_before_start_clamps_to_zero() {
        let clock = ManualClock::new(t0());
        let mut acc = accumulator(&clock);
        acc.on_task_start(&task_start(0)).unwrap();
        let run = acc.on_task_done(&task_done(-5, 0, 0)).unwrap();

        assert_eq!(run.duration_ms, 0);
        assert_eq!(run.result, RunResult::Failed);
    }

    #[test]
    fn test_run_record_copies_summary() {
        let clock = ManualClock::new(t0());
        let mut acc = accumulator(&clock);
        acc.on_task_start(&task_start(7)).unwrap();
        let mut event = task_done(1000, 2, 3);
        event.passed = 2;
        let run = acc.on_task_done(&event).unwrap();

        assert_eq!(run.test_cases_total, 7);
        assert_eq!(run.test_cases_passed, 2);
        assert_eq!(run.test_cases_failed, 2);
        assert_eq!(run.test_cases_skipped, 3);
        assert_eq!(run.release_version, "1.0.0");
        assert_eq!(run.measurement, DEFAULT_RUN_MEASUREMENT);
    }

    #[test]
    fn test_test_done_without_start_is_violation() {
        let clock = ManualClock::new(t0());
        let mut acc = accumulator(&clock);
        acc.on_task_start(&task_start(1)).unwrap();

        let err = acc.on_test_done(&done("t", passing(1), None)).unwrap_err();
        assert_eq!(
            err,
            AccumulatorError::ProtocolViolation {
                operation: "test_done",
                state: RunState::RunActive,
            }
        );
        assert!(acc.pending_test_records().is_empty());
    }

    #[test]
    fn test_calls_before_task_start_are_violations() {
        let clock = ManualClock::new(t0());
        let mut acc = accumulator(&clock);

        assert!(acc.on_fixture_start(&fixture("A", "a", None)).is_err());
        assert!(acc.on_test_start(&TestStart::default()).is_err());
        let err = acc.on_task_done(&task_done(1, 0, 0)).unwrap_err();
        assert_eq!(
            err,
            AccumulatorError::ProtocolViolation {
                operation: "task_done",
                state: RunState::Idle,
            }
        );
        assert_eq!(acc.state(), RunState::Idle);
    }

    #[test]
    fn test_nesting_violations_leave_state_untouched() {
        let clock = ManualClock::new(t0());
        let mut acc = accumulator(&clock);
        acc.on_task_start(&task_start(1)).unwrap();
        acc.on_test_start(&TestStart::default()).unwrap();

        assert!(acc.on_test_start(&TestStart::default()).is_err());
        assert!(acc.on_fixture_start(&fixture("A", "a", None)).is_err());
        assert!(acc.on_task_done(&task_done(1, 0, 0)).is_err());
        assert!(acc.on_task_start(&task_start(1)).is_err());
        assert_eq!(acc.state(), RunState::TestActive);

        acc.on_test_done(&done("t", passing(1), None)).unwrap();
        assert_eq!(acc.state(), RunState::RunActive);
    }

    #[test]
    fn test_done_is_terminal() {
        let clock = ManualClock::new(t0());
        let mut acc = accumulator(&clock);
        acc.on_task_start(&task_start(0)).unwrap();
        acc.on_task_done(&task_done(1, 0, 0)).unwrap();

        assert!(acc.on_task_start(&task_start(0)).is_err());
        assert!(acc.on_task_done(&task_done(1, 0, 0)).is_err());
        assert!(acc.on_test_start(&TestStart::default()).is_err());
    }

    #[test]
    fn test_from_config_measurements() {
        let config = ReporterConfig {
            release_version: String::new(),
            test_measurement: "testcafeTest".to_string(),
            run_measurement: "testcafeRun".to_string(),
            ..Default::default()
        };
        let clock = ManualClock::new(t0());
        let mut acc = TestRunAccumulator::from_config(&config, Arc::new(clock), classifier());

        acc.on_task_start(&task_start(1)).unwrap();
        acc.on_fixture_start(&fixture("A", "a", None)).unwrap();
        let record = run_test(&mut acc, "t", passing(1), None);
        let run = acc.on_task_done(&task_done(10, 0, 0)).unwrap();

        assert_eq!(record.measurement, "testcafeTest");
        assert_eq!(record.release_version, UNKNOWN);
        assert_eq!(run.measurement, "testcafeRun");
    }
}
