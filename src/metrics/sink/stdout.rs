use super::{Sink, SinkError};
use crate::metrics::Snapshot;
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

/// Keys dropped from the logged form
const NOISE_KEYS: [&str; 2] = ["memstats", "cmdline"];

/// Logs a trimmed, pretty-printed copy of each snapshot
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl StdoutSink {
    pub fn new() -> Self {
        Self
    }

    /// Normalize the snapshot, lift `memstats.Alloc` to `heap`, drop noise keys
    pub fn render(snapshot: &Snapshot) -> Result<String, SinkError> {
        // Round-trip through JSON text so the logged form matches what a remote reader sees
        let mut data: Snapshot = serde_json::from_str(&serde_json::to_string(snapshot)?)?;

        if let Some(alloc) = data
            .get("memstats")
            .and_then(Value::as_object)
            .and_then(|memstats| memstats.get("Alloc"))
            .cloned()
        {
            data.insert("heap".to_string(), alloc);
        }

        for key in NOISE_KEYS {
            data.remove(key);
        }

        Ok(serde_json::to_string_pretty(&data)?)
    }
}

#[async_trait]
impl Sink for StdoutSink {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn publish(&self, snapshot: Snapshot) -> Result<(), SinkError> {
        let data = Self::render(&snapshot)?;
        info!(sink = "stdout", data = %data, "Metrics");
        Ok(())
    }
}
