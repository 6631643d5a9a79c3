//! Telemetry reporter: accumulates records and writes them to a sink.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{ReportResult, Reporter};
use crate::accumulator::TestRunAccumulator;
use crate::classify::Classifier;
use crate::clock::Clock;
use crate::config::{Config, FlushStrategy};
use crate::events::{FixtureStart, TaskDone, TaskStart, TestDone, TestStart};
use crate::model::{Point, TestRecord};
use crate::sink::Sink;

/// Reporter that turns lifecycle callbacks into InfluxDB points.
///
/// Telemetry is best-effort. Sink failures are logged and the affected
/// points dropped; callbacks fail only when they arrive out of order.
pub struct InfluxReporter<S> {
    sink: S,
    accumulator: TestRunAccumulator,
    telemetry: bool,
    flush: FlushStrategy,
    ping_timeout: Duration,
}

impl<S: Sink> InfluxReporter<S> {
    /// Create a reporter with telemetry on and batch flushing.
    pub fn new(sink: S, accumulator: TestRunAccumulator) -> Self {
        Self {
            sink,
            accumulator,
            telemetry: true,
            flush: FlushStrategy::Batch,
            ping_timeout: Duration::from_secs(5),
        }
    }

    /// Create a reporter from resolved configuration.
    ///
    /// Telemetry stays off unless it is enabled and the sink settings are
    /// complete; incomplete settings are reported once here.
    pub fn from_config(
        config: &Config,
        sink: S,
        clock: Arc<dyn Clock>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        let accumulator = TestRunAccumulator::from_config(&config.reporter, clock, classifier);
        let telemetry = match config.validate() {
            Ok(()) => config.reporter.enabled,
            Err(e) => {
                warn!("{}; test results will not be uploaded", e);
                false
            }
        };
        if !config.reporter.enabled {
            debug!("Test result upload disabled");
        }

        Self::new(sink, accumulator)
            .with_telemetry(telemetry)
            .with_flush(config.reporter.flush)
            .with_ping_timeout(Duration::from_millis(config.reporter.ping_timeout_ms))
    }

    pub fn with_telemetry(mut self, enabled: bool) -> Self {
        self.telemetry = enabled;
        self
    }

    pub fn with_flush(mut self, flush: FlushStrategy) -> Self {
        self.flush = flush;
        self
    }

    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    pub fn telemetry_enabled(&self) -> bool {
        self.telemetry
    }

    pub fn accumulator(&self) -> &TestRunAccumulator {
        &self.accumulator
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    async fn probe_sink(&self) {
        match tokio::time::timeout(self.ping_timeout, self.sink.ping()).await {
            Ok(Ok(ping)) => info!(
                "{} host {} online (version {}, {:?})",
                self.sink.name(),
                ping.host,
                ping.version.as_deref().unwrap_or("unknown"),
                ping.rtt
            ),
            Ok(Err(e)) => warn!("{} offline: {}", self.sink.name(), e),
            Err(_) => warn!(
                "{} did not answer within {:?}",
                self.sink.name(),
                self.ping_timeout
            ),
        }
    }

    /// Write points, logging instead of failing. Returns whether the write
    /// succeeded.
    async fn write(&self, points: &[Point]) -> bool {
        match self.sink.write(points).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Failed to write {} points to {}: {}",
                    points.len(),
                    self.sink.name(),
                    e
                );
                false
            }
        }
    }
}

fn to_points(records: &[TestRecord]) -> Vec<Point> {
    records.iter().map(TestRecord::to_point).collect()
}

#[async_trait]
impl<S: Sink> Reporter for InfluxReporter<S> {
    async fn on_task_start(&mut self, event: &TaskStart) -> ReportResult<()> {
        self.accumulator.on_task_start(event)?;
        if self.telemetry {
            self.probe_sink().await;
        }
        Ok(())
    }

    async fn on_fixture_start(&mut self, event: &FixtureStart) -> ReportResult<()> {
        self.accumulator.on_fixture_start(event)?;
        Ok(())
    }

    async fn on_test_start(&mut self, event: &TestStart) -> ReportResult<()> {
        self.accumulator.on_test_start(event)?;
        Ok(())
    }

    async fn on_test_done(&mut self, event: &TestDone) -> ReportResult<()> {
        self.accumulator.on_test_done(event)?;

        if !self.telemetry {
            self.accumulator.take_test_records();
            return Ok(());
        }

        if self.flush == FlushStrategy::PerTest {
            // Records stay buffered until a write succeeds.
            let points = to_points(self.accumulator.pending_test_records());
            if self.write(&points).await {
                self.accumulator.take_test_records();
            }
        }
        Ok(())
    }

    async fn on_task_done(&mut self, event: &TaskDone) -> ReportResult<()> {
        let run = self.accumulator.on_task_done(event)?;
        let records = self.accumulator.take_test_records();

        info!(
            "Run {} finished: {} ({} tests, {} failed, {} skipped)",
            run.run,
            run.result,
            run.test_cases_total,
            run.test_cases_failed,
            run.test_cases_skipped
        );

        if !self.telemetry {
            return Ok(());
        }

        let mut points = to_points(&records);
        points.push(run.to_point());
        if self.write(&points).await {
            info!(
                "Wrote {} test records and the run record to {}",
                records.len(),
                self.sink.name()
            );
        }
        Ok(())
    }
}
