//! Storage sinks that persist telemetry points.
//!
//! A sink is a write-only append API. Retention, schema and administration
//! of the underlying store are the store's business; the only optional
//! extra is a connectivity probe used for log output at run start.

pub mod influx;
pub mod line_protocol;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

use crate::model::Point;

pub use influx::InfluxSink;
pub use memory::MemorySink;

/// Result type for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Errors that can occur while persisting points.
///
/// Every variant means the points were not stored. Callers treat them all
/// as best-effort telemetry failures.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The store could not be reached.
    #[error("Sink unavailable: {0}")]
    Unavailable(String),

    /// The store answered with an error status.
    #[error("Sink rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Outcome of a connectivity probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingInfo {
    /// Host that answered.
    pub host: String,
    /// Server version, when the store reports one.
    pub version: Option<String>,
    /// Round-trip time.
    pub rtt: Duration,
}

/// A destination for telemetry points.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Persist a batch of points. An empty batch is a no-op.
    async fn write(&self, points: &[Point]) -> SinkResult<()>;

    /// Check that the store is reachable.
    async fn ping(&self) -> SinkResult<PingInfo>;

    /// Sink name (for logging).
    fn name(&self) -> &str;
}
