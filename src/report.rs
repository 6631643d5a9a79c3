//! Reporters: the host-facing side of testflux.
//!
//! A [`Reporter`] receives the five lifecycle callbacks of a run. The
//! telemetry reporter ([`InfluxReporter`]) feeds them through a
//! [`TestRunAccumulator`](crate::accumulator::TestRunAccumulator) and
//! writes the resulting points to a [`Sink`](crate::sink::Sink); the
//! [`ConsoleReporter`] prints progress for humans. [`MultiReporter`] drives
//! several at once.
//!
//! Callbacks take `&mut self`: the framework never dispatches two of them
//! concurrently, and each is awaited before the next one starts.

pub mod console;
pub mod influx;

use async_trait::async_trait;
use tokio::io::AsyncBufRead;

use crate::accumulator::AccumulatorError;
use crate::events::{
    EventError, EventReader, FixtureStart, LifecycleEvent, TaskDone, TaskStart, TestDone,
    TestStart,
};

pub use console::ConsoleReporter;
pub use influx::InfluxReporter;

/// Result type for reporter callbacks.
pub type ReportResult<T> = Result<T, ReportError>;

/// Errors surfaced to the caller of a reporter.
///
/// Telemetry failures are never among them: sink problems are logged and
/// dropped inside the reporter.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error(transparent)]
    Protocol(#[from] AccumulatorError),

    #[error("Invalid event stream: {0}")]
    Input(#[from] EventError),
}

/// Receives lifecycle callbacks during a test run.
#[async_trait]
pub trait Reporter: Send {
    async fn on_task_start(&mut self, event: &TaskStart) -> ReportResult<()>;

    async fn on_fixture_start(&mut self, event: &FixtureStart) -> ReportResult<()>;

    async fn on_test_start(&mut self, event: &TestStart) -> ReportResult<()>;

    async fn on_test_done(&mut self, event: &TestDone) -> ReportResult<()>;

    /// Called once at the end. Any writes are complete when this returns.
    async fn on_task_done(&mut self, event: &TaskDone) -> ReportResult<()>;

    /// Dispatch an event to the matching callback.
    async fn handle(&mut self, event: &LifecycleEvent) -> ReportResult<()> {
        match event {
            LifecycleEvent::TaskStart(e) => self.on_task_start(e).await,
            LifecycleEvent::FixtureStart(e) => self.on_fixture_start(e).await,
            LifecycleEvent::TestStart(e) => self.on_test_start(e).await,
            LifecycleEvent::TestDone(e) => self.on_test_done(e).await,
            LifecycleEvent::TaskDone(e) => self.on_task_done(e).await,
        }
    }
}

/// A reporter that does nothing.
pub struct NullReporter;

#[async_trait]
impl Reporter for NullReporter {
    async fn on_task_start(&mut self, _event: &TaskStart) -> ReportResult<()> {
        Ok(())
    }
    async fn on_fixture_start(&mut self, _event: &FixtureStart) -> ReportResult<()> {
        Ok(())
    }
    async fn on_test_start(&mut self, _event: &TestStart) -> ReportResult<()> {
        Ok(())
    }
    async fn on_test_done(&mut self, _event: &TestDone) -> ReportResult<()> {
        Ok(())
    }
    async fn on_task_done(&mut self, _event: &TaskDone) -> ReportResult<()> {
        Ok(())
    }
}

/// A reporter that forwards every callback to several reporters in order.
///
/// The first error stops the fan-out for that callback.
pub struct MultiReporter {
    reporters: Vec<Box<dyn Reporter>>,
}

impl MultiReporter {
    pub fn new() -> Self {
        Self {
            reporters: Vec::new(),
        }
    }

    /// Add a reporter.
    pub fn with_reporter<R: Reporter + 'static>(mut self, reporter: R) -> Self {
        self.reporters.push(Box::new(reporter));
        self
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl Default for MultiReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Reporter for MultiReporter {
    async fn on_task_start(&mut self, event: &TaskStart) -> ReportResult<()> {
        for reporter in &mut self.reporters {
            reporter.on_task_start(event).await?;
        }
        Ok(())
    }

    async fn on_fixture_start(&mut self, event: &FixtureStart) -> ReportResult<()> {
        for reporter in &mut self.reporters {
            reporter.on_fixture_start(event).await?;
        }
        Ok(())
    }

    async fn on_test_start(&mut self, event: &TestStart) -> ReportResult<()> {
        for reporter in &mut self.reporters {
            reporter.on_test_start(event).await?;
        }
        Ok(())
    }

    async fn on_test_done(&mut self, event: &TestDone) -> ReportResult<()> {
        for reporter in &mut self.reporters {
            reporter.on_test_done(event).await?;
        }
        Ok(())
    }

    async fn on_task_done(&mut self, event: &TaskDone) -> ReportResult<()> {
        for reporter in &mut self.reporters {
            reporter.on_task_done(event).await?;
        }
        Ok(())
    }
}

/// Feed a JSON-lines event stream to a reporter, one event at a time.
///
/// Stops at the first malformed line or protocol violation. Returns the
/// number of events handled.
pub async fn replay<R, P>(reader: &mut EventReader<R>, reporter: &mut P) -> ReportResult<usize>
where
    R: AsyncBufRead + Unpin + Send,
    P: Reporter + ?Sized,
{
    let mut handled = 0;
    while let Some(event) = reader.next_event().await? {
        tracing::trace!("Handling {}", event.kind());
        reporter.handle(&event).await?;
        handled += 1;
    }
    Ok(handled)
}
