//! Snapshot destinations
//!
//! - `stdout` - pretty JSON in the log
//! - `expvar` - last snapshot served verbatim as JSON
//! - `prometheus` - last snapshot served as `key value` text lines
//!
//! The two endpoint sinks are also listening components and follow the
//! lifecycle contract in [`crate::server::lifecycle`].

use super::Snapshot;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

mod expvar;
mod prometheus;
mod stdout;

pub use self::expvar::{ExpvarConfig, ExpvarSink};
pub use self::prometheus::{PrometheusConfig, PrometheusSink, TEXT_CONTENT_TYPE};
pub use self::stdout::StdoutSink;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("publish did not complete within {0:?}")]
    Timeout(Duration),

    #[error("sink panicked: {0}")]
    Panicked(String),
}

/// A consumer of snapshots
#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &str;

    /// Receive an owned copy of the latest snapshot
    async fn publish(&self, snapshot: Snapshot) -> Result<(), SinkError>;
}

#[cfg(test)]
#[path = "sink_test.rs"]
mod sink_tests;
