//! Debug listener: `GET /debug/vars` serves the in-process runtime snapshot
//!
//! This is the endpoint a separate metrics process points its
//! `HttpCollector` at.

use crate::metrics::Collector;
use crate::server::lifecycle::{HttpService, LifecycleError, Service};
use crate::server::middleware::{decorate, HandlerError};
use async_trait::async_trait;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

pub const DEBUG_VARS_PATH: &str = "/debug/vars";

#[derive(Debug, Clone)]
pub struct DebugConfig {
    pub addr: SocketAddr,
    pub shutdown_timeout: Duration,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 9003)),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

pub struct DebugService {
    http: HttpService,
}

impl DebugService {
    pub fn new(config: DebugConfig, source: Arc<dyn Collector>) -> Self {
        let router = Router::new()
            .route(DEBUG_VARS_PATH, get(debug_vars))
            .with_state(source);

        Self {
            http: HttpService::new(
                "debug",
                config.addr,
                decorate(router, "debug"),
                config.shutdown_timeout,
            ),
        }
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.http.local_addr().await
    }
}

async fn debug_vars(State(source): State<Arc<dyn Collector>>) -> Response {
    match source.collect().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => HandlerError(e.to_string()).into_response_with(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

#[async_trait]
impl Service for DebugService {
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
