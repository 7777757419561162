//! Metric harvesting and fan-out
//!
//! A [`Collector`] produces a [`Snapshot`] on demand; the [`Publisher`] loop polls it
//! on a fixed interval and hands an owned copy of each snapshot to every [`Sink`].

use async_trait::async_trait;
use thiserror::Error;

pub mod clock;
pub mod collector;
pub mod counters;
pub mod publisher;
pub mod runtime;
pub mod sink;

pub use collector::HttpCollector;
pub use counters::{create_metrics, ServiceMetrics, SharedMetrics};
pub use publisher::{Publisher, PublisherBuilder};
pub use runtime::RuntimeCollector;
pub use sink::{ExpvarSink, PrometheusSink, Sink, SinkError, StdoutSink};

/// One point-in-time metrics reading: dotted/flat key -> number, bool or nested mapping
pub type Snapshot = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("metrics source request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("metrics source returned status {0}")]
    Status(u16),

    #[error("metrics source returned a non-object payload")]
    NotAnObject,
}

/// Pull-based metrics source
#[async_trait]
pub trait Collector: Send + Sync {
    async fn collect(&self) -> Result<Snapshot, CollectError>;
}

#[cfg(test)]
#[path = "publisher_test.rs"]
mod publisher_tests;
