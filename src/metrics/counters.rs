//! Self-instrumentation for the observability subsystem
//!
//! Counters live in a private prometheus registry and are exported into the
//! runtime snapshot, so they travel the same fan-out path as every other metric.

use super::Snapshot;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use serde_json::{Map, Value};
use std::sync::Arc;

pub type SharedMetrics = Arc<ServiceMetrics>;

pub struct ServiceMetrics {
    registry: Registry,
    publisher_ticks: IntCounter,
    collect_errors: IntCounter,
    sink_errors: IntCounterVec,
    probe_requests: IntCounterVec,
}

/// Build the registry with every counter registered
pub fn create_metrics() -> Result<SharedMetrics, prometheus::Error> {
    let registry = Registry::new();

    let publisher_ticks = IntCounter::with_opts(Opts::new(
        "publisher_ticks_total",
        "Fan-out ticks that delivered a snapshot",
    ))?;
    let collect_errors = IntCounter::with_opts(Opts::new(
        "collect_errors_total",
        "Ticks skipped because the collector failed",
    ))?;
    let sink_errors = IntCounterVec::new(
        Opts::new("sink_errors_total", "Failed sink publish calls"),
        &["sink"],
    )?;
    let probe_requests = IntCounterVec::new(
        Opts::new("probe_requests_total", "Health probe requests by outcome"),
        &["probe", "status"],
    )?;

    registry.register(Box::new(publisher_ticks.clone()))?;
    registry.register(Box::new(collect_errors.clone()))?;
    registry.register(Box::new(sink_errors.clone()))?;
    registry.register(Box::new(probe_requests.clone()))?;

    Ok(Arc::new(ServiceMetrics {
        registry,
        publisher_ticks,
        collect_errors,
        sink_errors,
        probe_requests,
    }))
}

impl ServiceMetrics {
    pub fn record_tick(&self) {
        self.publisher_ticks.inc();
    }

    pub fn record_collect_error(&self) {
        self.collect_errors.inc();
    }

    pub fn record_sink_error(&self, sink: &str) {
        self.sink_errors.with_label_values(&[sink]).inc();
    }

    pub fn record_probe(&self, probe: &str, status: u16) {
        self.probe_requests
            .with_label_values(&[probe, &status.to_string()])
            .inc();
    }

    /// Export the registry as a snapshot
    ///
    /// Unlabelled counters become numbers; labelled ones become a nested
    /// mapping keyed by their label values joined with `_`.
    pub fn snapshot(&self) -> Snapshot {
        let mut out = Map::new();

        for family in self.registry.gather() {
            let metrics = family.get_metric();
            let unlabelled = metrics.len() == 1 && metrics[0].get_label().is_empty();

            if unlabelled {
                out.insert(
                    family.get_name().to_string(),
                    Value::from(metrics[0].get_counter().get_value()),
                );
                continue;
            }

            let nested: Map<String, Value> = metrics
                .iter()
                .map(|m| {
                    let key = m
                        .get_label()
                        .iter()
                        .map(|l| l.get_value())
                        .collect::<Vec<_>>()
                        .join("_");
                    (key, Value::from(m.get_counter().get_value()))
                })
                .collect();
            out.insert(family.get_name().to_string(), Value::Object(nested));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_metrics_starts_at_zero() {
        let metrics = create_metrics().expect("registry should build");

        let snapshot = metrics.snapshot();

        assert_eq!(snapshot["publisher_ticks_total"], 0.0);
        assert_eq!(snapshot["collect_errors_total"], 0.0);
        // Vec counters without children are not gathered
        assert!(!snapshot.contains_key("sink_errors_total"));
    }

    #[test]
    fn test_labelled_counters_nest_by_label_values() {
        let metrics = create_metrics().expect("registry should build");

        metrics.record_tick();
        metrics.record_tick();
        metrics.record_sink_error("stdout");
        metrics.record_probe("ready", 503);
        metrics.record_probe("ready", 503);

        let snapshot = metrics.snapshot();

        assert_eq!(snapshot["publisher_ticks_total"], 2.0);
        assert_eq!(snapshot["sink_errors_total"]["stdout"], 1.0);
        assert_eq!(snapshot["probe_requests_total"]["ready_503"], 2.0);
    }
}
