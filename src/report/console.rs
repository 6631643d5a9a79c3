//! Human-readable progress output.

use std::fmt::Display;
use std::io::Write;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ReportResult, Reporter};
use crate::events::{FixtureStart, TaskDone, TaskStart, TestDone, TestStart};
use crate::model::{TestResult, format_duration};

/// Console reporter that prints progress and a final summary.
///
/// Failed and skipped tests are always listed; passing tests only in
/// verbose mode.
pub struct ConsoleReporter {
    out: Box<dyn Write + Send>,
    verbose: bool,
    total: u64,
    start_time: Option<DateTime<Utc>>,
    fixture: Option<String>,
    fixture_printed: bool,
    failed_tests: Vec<String>,
}

impl ConsoleReporter {
    /// Create a console reporter writing to stdout.
    pub fn new(verbose: bool) -> Self {
        Self::with_writer(Box::new(std::io::stdout()), verbose)
    }

    pub fn with_writer(out: Box<dyn Write + Send>, verbose: bool) -> Self {
        Self {
            out,
            verbose,
            total: 0,
            start_time: None,
            fixture: None,
            fixture_printed: false,
            failed_tests: Vec::new(),
        }
    }

    fn line(&mut self, text: impl Display) {
        if let Err(e) = writeln!(self.out, "{}", text) {
            tracing::debug!("Failed to write console output: {}", e);
        }
    }

    /// Print the fixture header before its first listed test.
    fn fixture_header(&mut self) {
        if self.fixture_printed {
            return;
        }
        if let Some(name) = self.fixture.clone() {
            self.line("");
            self.line(console::style(name).bold());
        }
        self.fixture_printed = true;
    }
}

#[async_trait]
impl Reporter for ConsoleReporter {
    async fn on_task_start(&mut self, event: &TaskStart) -> ReportResult<()> {
        self.total = event.test_count;
        self.start_time = Some(event.start_time);

        let mut header = format!("Running {} tests", event.test_count);
        if !event.user_agents.is_empty() {
            header.push_str(&format!(" in: {}", event.user_agents.join(", ")));
        }
        self.line(header);
        Ok(())
    }

    async fn on_fixture_start(&mut self, event: &FixtureStart) -> ReportResult<()> {
        self.fixture = Some(event.name.clone());
        self.fixture_printed = false;
        if self.verbose {
            self.fixture_header();
        }
        Ok(())
    }

    async fn on_test_start(&mut self, _event: &TestStart) -> ReportResult<()> {
        Ok(())
    }

    async fn on_test_done(&mut self, event: &TestDone) -> ReportResult<()> {
        let info = &event.run_info;
        let result = TestResult::classify(info.skipped, !info.errs.is_empty());

        if result == TestResult::Successful && !self.verbose {
            return Ok(());
        }
        self.fixture_header();

        let status = match result {
            TestResult::Successful => console::style("PASS").green(),
            TestResult::Failed => console::style("FAIL").red(),
            TestResult::Skipped => console::style("SKIP").yellow(),
        };
        let duration = info
            .duration_ms
            .map(|ms| format!(" ({}ms)", ms))
            .unwrap_or_default();
        let unstable = if info.unstable { " (unstable)" } else { "" };
        self.line(format!("  {} {}{}{}", status, event.name, duration, unstable));

        if result == TestResult::Failed {
            for (idx, err) in info.errs.iter().enumerate() {
                self.line(format!(
                    "    {}",
                    console::style(format!("{}) {}", idx + 1, err)).dim()
                ));
            }
            let qualified = match &self.fixture {
                Some(fixture) => format!("{} > {}", fixture, event.name),
                None => event.name.clone(),
            };
            self.failed_tests.push(qualified);
        }

        if self.verbose {
            for warning in &info.warnings {
                self.line(format!("    {} {}", console::style("warning:").yellow(), warning));
            }
        }
        Ok(())
    }

    async fn on_task_done(&mut self, event: &TaskDone) -> ReportResult<()> {
        let duration_ms = self
            .start_time
            .map(|start| u64::try_from((event.end_time - start).num_milliseconds()).unwrap_or(0))
            .unwrap_or(0);
        let summary = event.result;

        self.line("");
        self.line("Test Results:");
        self.line(format!("  Total:    {}", self.total));
        self.line(format!("  Passed:   {}", console::style(event.passed).green()));
        self.line(format!("  Failed:   {}", console::style(summary.failed_count).red()));
        self.line(format!("  Skipped:  {}", console::style(summary.skipped_count).yellow()));
        self.line(format!("  Duration: {}", format_duration(duration_ms)));

        if !event.warnings.is_empty() {
            self.line("");
            self.line(format!("Warnings ({}):", event.warnings.len()));
            for warning in &event.warnings {
                self.line(format!("  - {}", console::style(warning).dim()));
            }
        }

        self.line("");
        if summary.failed_count == 0 {
            self.line(console::style("All tests passed!").green().bold());
        } else {
            self.line(console::style("Some tests failed.").red().bold());
            for name in std::mem::take(&mut self.failed_tests) {
                self.line(format!("  - {}", name));
            }
        }

        if let Err(e) = self.out.flush() {
            tracing::debug!("Failed to flush console output: {}", e);
        }
        Ok(())
    }
}
