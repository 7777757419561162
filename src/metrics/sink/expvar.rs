use super::{Sink, SinkError};
use crate::metrics::Snapshot;
use crate::server::lifecycle::{HttpService, LifecycleError, Service};
use crate::server::middleware::{decorate, HandlerError};
use crate::server::normalize_path;
use async_trait::async_trait;
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ExpvarConfig {
    pub addr: SocketAddr,
    pub route: String,
    pub shutdown_timeout: Duration,
}

impl Default for ExpvarConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 9001)),
            route: "/metrics".to_string(),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

type Store = Arc<Mutex<Snapshot>>;

/// Keeps the latest snapshot and serves it verbatim as JSON
pub struct ExpvarSink {
    store: Store,
    http: HttpService,
}

impl ExpvarSink {
    pub fn new(config: ExpvarConfig) -> Self {
        let store: Store = Arc::default();

        let router = Router::new()
            .route(&normalize_path(&config.route), get(serve_latest))
            .with_state(store.clone());

        Self {
            store,
            http: HttpService::new(
                "expvar",
                config.addr,
                decorate(router, "expvar"),
                config.shutdown_timeout,
            ),
        }
    }

    /// Copy of the stored snapshot
    pub fn latest(&self) -> Snapshot {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.http.local_addr().await
    }
}

async fn serve_latest(State(store): State<Store>) -> Response {
    // Copy out under the lock; encoding and the write happen after release
    let data = store
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();

    match serde_json::to_vec(&data) {
        Ok(body) => (StatusCode::OK, [(CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => HandlerError(format!("encoding metrics: {}", e))
            .into_response_with(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

#[async_trait]
impl Sink for ExpvarSink {
    fn name(&self) -> &str {
        "expvar"
    }

    async fn publish(&self, snapshot: Snapshot) -> Result<(), SinkError> {
        *self.store.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
        Ok(())
    }
}

#[async_trait]
impl Service for ExpvarSink {
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
