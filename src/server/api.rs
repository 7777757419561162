//! Main API listener
//!
//! Serves the caller's routes and, while running, publishes two readiness
//! checks on the health service: "am I serving" and, when an upstream is
//! configured, "can I reach my dependency".

use crate::server::health::HealthService;
use crate::server::lifecycle::{HttpService, LifecycleError, Service};
use crate::server::middleware::decorate;
use async_trait::async_trait;
use axum::{routing::get, Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub addr: SocketAddr,
    pub shutdown_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// A dependency the API needs in order to be useful (e.g. the cluster API)
pub trait Upstream: Send + Sync {
    fn check(&self) -> anyhow::Result<()>;
}

/// Versioned routes served by the binary
pub fn api_routes() -> Router {
    Router::new().route(
        "/v1/version",
        get(|| async {
            Json(json!({
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            }))
        }),
    )
}

pub struct ApiService {
    http: Arc<HttpService>,
    health: Option<Arc<HealthService>>,
    upstream: Option<Arc<dyn Upstream>>,
}

impl ApiService {
    pub fn new(config: ApiConfig, routes: Router, health: Option<Arc<HealthService>>) -> Self {
        Self {
            http: Arc::new(HttpService::new(
                "api",
                config.addr,
                decorate(routes, "api"),
                config.shutdown_timeout,
            )),
            health,
            upstream: None,
        }
    }

    pub fn with_upstream(mut self, upstream: Arc<dyn Upstream>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Readiness check name for "am I serving"
    pub fn serving_check_name(&self) -> String {
        format!("server at {}", self.http.addr())
    }

    /// Readiness check name for "can I reach my dependency"
    pub fn upstream_check_name(&self) -> String {
        format!("upstream of server at {}", self.http.addr())
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.http.local_addr().await
    }

    fn register_checks(&self, health: &HealthService) {
        let http = self.http.clone();
        let name = self.serving_check_name();
        health.add_readiness_check(self.serving_check_name(), move || {
            if http.is_running() {
                Ok(())
            } else {
                Err(anyhow::anyhow!("{} is not running", name))
            }
        });

        if let Some(upstream) = &self.upstream {
            let upstream = upstream.clone();
            health.add_readiness_check(self.upstream_check_name(), move || upstream.check());
        }
    }
}

#[async_trait]
impl Service for ApiService {
    fn name(&self) -> &str {
        self.http.name()
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        if let Some(health) = &self.health {
            self.register_checks(health);
        }
        self.http.start().await
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        // The serving check fails while draining, then both are withdrawn
        let result = self.http.stop().await;
        if let Some(health) = &self.health {
            health.remove_readiness_check(&self.serving_check_name());
            health.remove_readiness_check(&self.upstream_check_name());
        }
        result
    }

    fn is_running(&self) -> bool {
        self.http.is_running()
    }
}
