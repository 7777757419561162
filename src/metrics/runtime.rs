//! In-process runtime statistics
//!
//! Produces the same shape the remote `/debug/vars` endpoint serves:
//! `cmdline`, `memstats` (when `/proc/self/status` is readable), tokio runtime
//! figures, uptime, and the service's own counters under `sco`.

use super::clock::{Clock, SystemClock, Uptime};
use super::counters::SharedMetrics;
use super::{CollectError, Collector, Snapshot};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Key under which the service's own counters are exported
pub const SELF_METRICS_KEY: &str = "sco";

const PROC_STATUS: &str = "/proc/self/status";

pub struct RuntimeCollector {
    metrics: Option<SharedMetrics>,
    uptime: Uptime,
}

impl RuntimeCollector {
    pub fn new(metrics: Option<SharedMetrics>) -> Self {
        Self::with_clock(metrics, Arc::new(SystemClock))
    }

    pub fn with_clock(metrics: Option<SharedMetrics>, clock: Arc<dyn Clock>) -> Self {
        Self {
            metrics,
            uptime: Uptime::start(clock),
        }
    }

    /// Build the snapshot synchronously
    pub fn snapshot(&self) -> Snapshot {
        let mut out = Map::new();

        out.insert(
            "cmdline".to_string(),
            Value::from(std::env::args().collect::<Vec<_>>()),
        );

        if let Some(memstats) = std::fs::read_to_string(PROC_STATUS)
            .ok()
            .and_then(|status| parse_memstats(&status))
        {
            out.insert("memstats".to_string(), Value::Object(memstats));
        }

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let runtime = handle.metrics();
            out.insert(
                "runtime".to_string(),
                json!({
                    "workers": runtime.num_workers(),
                    "alive_tasks": runtime.num_alive_tasks(),
                }),
            );
        }

        out.insert(
            "uptime_seconds".to_string(),
            Value::from(self.uptime.seconds()),
        );

        if let Some(metrics) = &self.metrics {
            out.insert(
                SELF_METRICS_KEY.to_string(),
                Value::Object(metrics.snapshot()),
            );
        }

        out
    }
}

#[async_trait]
impl Collector for RuntimeCollector {
    async fn collect(&self) -> Result<Snapshot, CollectError> {
        Ok(self.snapshot())
    }
}

/// Extract resident (`Alloc`) and virtual (`Sys`) sizes in bytes from `/proc/self/status`
fn parse_memstats(status: &str) -> Option<Map<String, Value>> {
    let kib = |field: &str| -> Option<u64> {
        status
            .lines()
            .find(|line| line.starts_with(field))?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()
    };

    let rss = kib("VmRSS:")?;
    let mut memstats = Map::new();
    memstats.insert("Alloc".to_string(), Value::from(rss * 1024));
    if let Some(size) = kib("VmSize:") {
        memstats.insert("Sys".to_string(), Value::from(size * 1024));
    }
    Some(memstats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::clock::ManualClock;
    use crate::metrics::counters::create_metrics;
    use chrono::Utc;

    const STATUS: &str = "Name:\tsco\nVmPeak:\t  20000 kB\nVmSize:\t  16384 kB\nVmRSS:\t    2048 kB\nThreads:\t4\n";

    #[test]
    fn test_parse_memstats_converts_kib_to_bytes() {
        let memstats = parse_memstats(STATUS).expect("VmRSS present");

        assert_eq!(memstats["Alloc"], 2048 * 1024);
        assert_eq!(memstats["Sys"], 16384 * 1024);
    }

    #[test]
    fn test_parse_memstats_requires_rss() {
        assert!(parse_memstats("Name:\tsco\nVmSize:\t 100 kB\n").is_none());
    }

    #[test]
    fn test_uptime_follows_clock() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let collector = RuntimeCollector::with_clock(None, clock.clone());

        clock.advance(chrono::Duration::milliseconds(90_500));
        let snapshot = collector.snapshot();

        assert_eq!(snapshot["uptime_seconds"], 90.5);
        assert!(snapshot["cmdline"].is_array());
        assert!(!snapshot.contains_key(SELF_METRICS_KEY));
    }

    #[tokio::test]
    async fn test_collect_includes_runtime_and_counters() {
        let metrics = create_metrics().expect("registry should build");
        metrics.record_tick();
        let collector = RuntimeCollector::new(Some(metrics));

        let snapshot = collector.collect().await.expect("collect never fails");

        assert!(snapshot["runtime"]["workers"].as_u64().is_some());
        assert_eq!(snapshot[SELF_METRICS_KEY]["publisher_ticks_total"], 1.0);
    }
}
