//! testflux: test-run telemetry for InfluxDB.
//!
//! This crate observes the lifecycle of a test-automation run and turns it
//! into time-series points: one per executed test and one per run.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Events**: The five lifecycle callbacks and their JSON-lines form
//! - **Accumulator**: The state machine carrying context between callbacks
//!   and shaping [`TestRecord`]s and [`RunRecord`]s
//! - **Sink**: Where points go (InfluxDB over HTTP, or memory)
//! - **Report**: Reporters the framework drives (telemetry, console)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use testflux::classify::PathClassifier;
//! use testflux::clock::SystemClock;
//! use testflux::config::{ProcessEnv, resolve_config};
//! use testflux::events::EventReader;
//! use testflux::report::{InfluxReporter, replay};
//! use testflux::sink::InfluxSink;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = resolve_config(std::path::Path::new("testflux.toml"), &ProcessEnv)?;
//!     let sink = InfluxSink::new(&config.influx)?;
//!     let classifier = PathClassifier::from_config(&config.classify)?;
//!     let mut reporter = InfluxReporter::from_config(
//!         &config,
//!         sink,
//!         Arc::new(SystemClock::default()),
//!         Arc::new(classifier),
//!     );
//!
//!     let mut events = EventReader::new(tokio::io::BufReader::new(tokio::io::stdin()));
//!     replay(&mut events, &mut reporter).await?;
//!     Ok(())
//! }
//! ```

pub mod accumulator;
pub mod classify;
pub mod clock;
pub mod config;
pub mod events;
pub mod model;
pub mod report;
pub mod sink;

// Re-export commonly used types
pub use accumulator::{AccumulatorError, RunState, TestRunAccumulator};
pub use config::{Config, load_config};
pub use events::{EventReader, LifecycleEvent};
pub use model::{Point, RunRecord, TestRecord};
pub use report::{Reporter, replay};
pub use sink::Sink;
