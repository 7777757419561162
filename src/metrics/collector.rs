//! Remote metric source: another process's `/debug/vars` endpoint

use super::{CollectError, Collector, Snapshot};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Default deadline for one collect request
pub const DEFAULT_COLLECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Collector that GETs a JSON object from a URL on every tick
pub struct HttpCollector {
    client: reqwest::Client,
    url: String,
}

impl HttpCollector {
    pub fn new(url: impl Into<String>) -> Result<Self, CollectError> {
        Self::with_timeout(url, DEFAULT_COLLECT_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, CollectError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Collector for HttpCollector {
    async fn collect(&self) -> Result<Snapshot, CollectError> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollectError::Status(status.as_u16()));
        }

        match response.json::<Value>().await? {
            Value::Object(snapshot) => Ok(snapshot),
            _ => Err(CollectError::NotAnObject),
        }
    }
}
