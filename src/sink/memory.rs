//! In-memory sink.
//!
//! Keeps written points in a shared buffer. Useful for dry runs and for
//! asserting on reporter output in tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{PingInfo, Sink, SinkError, SinkResult};
use crate::model::Point;

/// Sink that stores points in memory.
///
/// Clones share the same buffer, so a test can keep one handle and give
/// another to the reporter.
#[derive(Clone)]
pub struct MemorySink {
    points: Arc<Mutex<Vec<Point>>>,
    available: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            points: Arc::new(Mutex::new(Vec::new())),
            available: Arc::new(AtomicBool::new(true)),
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Snapshot of all points written so far.
    pub fn points(&self) -> Vec<Point> {
        self.points
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of successful non-empty writes.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Simulate the store going offline (`false`) or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> SinkResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SinkError::Unavailable("memory sink offline".to_string()))
        }
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn write(&self, points: &[Point]) -> SinkResult<()> {
        self.check_available()?;
        if points.is_empty() {
            return Ok(());
        }

        self.points
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend_from_slice(points);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn ping(&self) -> SinkResult<PingInfo> {
        self.check_available()?;
        Ok(PingInfo {
            host: "memory".to_string(),
            version: None,
            rtt: Duration::ZERO,
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}
