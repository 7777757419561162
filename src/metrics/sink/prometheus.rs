use super::{Sink, SinkError};
use crate::metrics::Snapshot;
use crate::server::lifecycle::{HttpService, LifecycleError, Service};
use crate::server::middleware::decorate;
use crate::server::normalize_path;
use async_trait::async_trait;
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

pub const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

#[derive(Debug, Clone)]
pub struct PrometheusConfig {
    pub addr: SocketAddr,
    pub route: String,
    pub shutdown_timeout: Duration,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 9002)),
            route: "/metrics".to_string(),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// A snapshot value the text format can carry
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Sample {
    Number(f64),
    Nested(Samples),
}

pub(crate) type Samples = BTreeMap<String, Sample>;

impl Sample {
    /// Booleans become 0/1, numbers become floats, objects recurse; anything else is dropped
    fn coerce(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(Sample::Number),
            Value::Bool(b) => Some(Sample::Number(if *b { 1.0 } else { 0.0 })),
            Value::Object(map) => Some(Sample::Nested(coerce_map(map))),
            Value::String(_) | Value::Array(_) | Value::Null => None,
        }
    }
}

pub(crate) fn coerce_map(map: &Map<String, Value>) -> Samples {
    map.iter()
        .filter_map(|(key, value)| Sample::coerce(value).map(|sample| (key.clone(), sample)))
        .collect()
}

/// One `key value` line per numeric leaf, nested keys joined by `_`
pub(crate) fn render(samples: &Samples) -> String {
    let mut out = String::new();
    write_samples(&mut out, "", samples);
    out
}

fn write_samples(out: &mut String, prefix: &str, samples: &Samples) {
    for (key, sample) in samples {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}_{}", prefix, key)
        };

        match sample {
            Sample::Number(value) => {
                let _ = writeln!(out, "{} {}", name, value);
            }
            Sample::Nested(nested) => write_samples(out, &name, nested),
        }
    }
}

type Store = Arc<Mutex<Arc<Samples>>>;

/// Keeps a coerced copy of the latest snapshot and serves it as text lines
pub struct PrometheusSink {
    store: Store,
    http: HttpService,
}

impl PrometheusSink {
    pub fn new(config: PrometheusConfig) -> Self {
        let store: Store = Arc::default();

        let router = Router::new()
            .route(&normalize_path(&config.route), get(serve_text))
            .with_state(store.clone());

        Self {
            store,
            http: HttpService::new(
                "prometheus",
                config.addr,
                decorate(router, "prometheus"),
                config.shutdown_timeout,
            ),
        }
    }

    /// Text body the endpoint would currently serve
    pub fn render(&self) -> String {
        render(&self.current())
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.http.local_addr().await
    }

    fn current(&self) -> Arc<Samples> {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

async fn serve_text(State(store): State<Store>) -> impl IntoResponse {
    let samples = store
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();

    (
        StatusCode::OK,
        [(CONTENT_TYPE, TEXT_CONTENT_TYPE)],
        render(&samples),
    )
}

#[async_trait]
impl Sink for PrometheusSink {
    fn name(&self) -> &str {
        "prometheus"
    }

    async fn publish(&self, snapshot: Snapshot) -> Result<(), SinkError> {
        let samples = Arc::new(coerce_map(&snapshot));
        *self.store.lock().unwrap_or_else(PoisonError::into_inner) = samples;
        Ok(())
    }
}

#[async_trait]
impl Service for PrometheusSink {
    fn name(&self) -> &str {
        self.http.name()
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        self.http.start().await
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        self.http.stop().await
    }

    fn is_running(&self) -> bool {
        self.http.is_running()
    }
}
