//! Timer-driven fan-out of collected snapshots to sinks
//!
//! One task owns the timer, the collector and every sink call. It waits on the
//! earlier of the next tick or the shutdown message; a tick that has started runs
//! its whole sink loop before the shutdown message is looked at again.

use super::counters::SharedMetrics;
use super::{Collector, Sink, SinkError, Snapshot};
use crate::server::middleware::panic_message;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default period between collections
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Configures a publisher before its loop is started
///
/// The sink set is fixed once `start` is called.
pub struct PublisherBuilder {
    collector: Arc<dyn Collector>,
    interval: Duration,
    sink_timeout: Option<Duration>,
    sinks: Vec<Arc<dyn Sink>>,
    metrics: Option<SharedMetrics>,
}

impl PublisherBuilder {
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Bound each sink call; an expired call counts as that sink failing
    pub fn sink_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.sink_timeout = timeout;
        self
    }

    /// Append a sink; sinks are invoked in the order they were added
    pub fn sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Spawn the fan-out loop
    pub fn start(self) -> Publisher {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let interval = self.interval;
        let fan_out = FanOut {
            collector: self.collector,
            sinks: self.sinks,
            sink_timeout: self.sink_timeout,
            metrics: self.metrics,
        };

        info!(
            interval = ?interval,
            sinks = fan_out.sinks.len(),
            "Starting metrics publisher"
        );

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => fan_out.tick().await,
                    // Fires on an explicit stop or when the handle is dropped
                    _ = &mut shutdown_rx => break,
                }
            }
            debug!("Metrics publisher loop exited");
        });

        Publisher {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to a running fan-out loop
pub struct Publisher {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Publisher {
    pub fn builder(collector: Arc<dyn Collector>) -> PublisherBuilder {
        PublisherBuilder {
            collector,
            interval: DEFAULT_INTERVAL,
            sink_timeout: None,
            sinks: Vec::new(),
            metrics: None,
        }
    }

    /// Signal the loop to exit and wait until it has
    ///
    /// An in-flight tick finishes delivering to all sinks first; nothing is
    /// delivered after this returns.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            error!(error = %e, "Metrics publisher task panicked");
        }
        info!("Metrics publisher stopped");
    }
}

struct FanOut {
    collector: Arc<dyn Collector>,
    sinks: Vec<Arc<dyn Sink>>,
    sink_timeout: Option<Duration>,
    metrics: Option<SharedMetrics>,
}

impl FanOut {
    async fn tick(&self) {
        let collected = AssertUnwindSafe(self.collector.collect()).catch_unwind().await;
        let snapshot = match collected {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => {
                error!(error = %e, "Failed to collect metrics, skipping publish");
                self.collect_failed();
                return;
            }
            Err(panic) => {
                error!(
                    panic = panic_message(panic.as_ref()),
                    "Collector panicked, skipping publish"
                );
                self.collect_failed();
                return;
            }
        };

        for sink in &self.sinks {
            // Each sink owns its copy
            if let Err(e) = self.publish_to(sink.as_ref(), snapshot.clone()).await {
                warn!(sink = sink.name(), error = %e, "Sink failed to publish metrics");
                if let Some(metrics) = &self.metrics {
                    metrics.record_sink_error(sink.name());
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_tick();
        }
    }

    /// One sink call under the optional deadline; a panic is that sink's failure alone
    async fn publish_to(&self, sink: &dyn Sink, snapshot: Snapshot) -> Result<(), SinkError> {
        let publish = AssertUnwindSafe(sink.publish(snapshot)).catch_unwind();
        let outcome = match self.sink_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, publish).await {
                Ok(outcome) => outcome,
                Err(_) => return Err(SinkError::Timeout(timeout)),
            },
            None => publish.await,
        };
        match outcome {
            Ok(result) => result,
            Err(panic) => Err(SinkError::Panicked(panic_message(panic.as_ref()).to_string())),
        }
    }

    fn collect_failed(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.record_collect_error();
        }
    }
}
