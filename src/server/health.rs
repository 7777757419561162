//! Liveness and readiness probe endpoints
//!
//! - `<prefix>/health/live` - Liveness: evaluates the liveness registry
//! - `<prefix>/health/ready` - Readiness: evaluates the readiness registry
//!
//! 200 when every check passes, 503 otherwise. `?full=true` adds the
//! per-check results to the body.

use crate::metrics::SharedMetrics;
use crate::server::checks::{CheckRegistry, Evaluation};
use crate::server::lifecycle::{HttpService, LifecycleError, Service};
use crate::server::middleware::decorate;
use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const STATUS_OK: &str = "OK";
pub const STATUS_UNAVAILABLE: &str = "Unavailable";

#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub addr: SocketAddr,
    /// Prepended to `/health/...` routes
    pub prefix: String,
    pub shutdown_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            prefix: String::new(),
            shutdown_timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Probe {
    Live,
    Ready,
}

impl Probe {
    fn as_str(self) -> &'static str {
        match self {
            Probe::Live => "live",
            Probe::Ready => "ready",
        }
    }
}

/// Route for a probe under the configured prefix
fn probe_path(prefix: &str, probe: Probe) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("/health/{}", probe.as_str())
    } else {
        format!("/{}/health/{}", prefix, probe.as_str())
    }
}

#[derive(Clone)]
struct ProbeState {
    probe: Probe,
    registry: Arc<CheckRegistry>,
    metrics: Option<SharedMetrics>,
}

#[derive(Debug, Deserialize)]
struct ProbeQuery {
    full: Option<String>,
}

#[derive(Debug, Serialize)]
struct ProbeBody {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<BTreeMap<String, String>>,
}

async fn probe(State(state): State<ProbeState>, Query(query): Query<ProbeQuery>) -> Response {
    let Evaluation { healthy, results } = state.registry.evaluate();

    let (code, status) = if healthy {
        (StatusCode::OK, STATUS_OK)
    } else {
        // Failing checks are application state, not errors of this endpoint
        debug!(probe = state.probe.as_str(), checks = ?results, "Probe failing");
        (StatusCode::SERVICE_UNAVAILABLE, STATUS_UNAVAILABLE)
    };

    if let Some(metrics) = &state.metrics {
        metrics.record_probe(state.probe.as_str(), code.as_u16());
    }

    let data = (query.full.as_deref() == Some("true")).then_some(results);
    (code, Json(ProbeBody { status, data })).into_response()
}

/// Liveness/readiness listener with its own check registries
pub struct HealthService {
    liveness: Arc<CheckRegistry>,
    readiness: Arc<CheckRegistry>,
    http: HttpService,
}

impl HealthService {
    pub fn new(config: HealthConfig, metrics: Option<SharedMetrics>) -> Self {
        let liveness = Arc::new(CheckRegistry::new());
        let readiness = Arc::new(CheckRegistry::new());

        let routes = Router::new()
            .route(&probe_path(&config.prefix, Probe::Live), get(probe))
            .with_state(ProbeState {
                probe: Probe::Live,
                registry: liveness.clone(),
                metrics: metrics.clone(),
            })
            .merge(
                Router::new()
                    .route(&probe_path(&config.prefix, Probe::Ready), get(probe))
                    .with_state(ProbeState {
                        probe: Probe::Ready,
                        registry: readiness.clone(),
                        metrics,
                    }),
            );

        Self {
            liveness,
            readiness,
            http: HttpService::new(
                "health",
                config.addr,
                decorate(routes, "health"),
                config.shutdown_timeout,
            ),
        }
    }

    pub fn add_liveness_check<F>(&self, name: impl Into<String>, check: F)
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.liveness.add(name, check);
    }

    pub fn remove_liveness_check(&self, name: &str) {
        self.liveness.remove(name);
    }

    pub fn add_readiness_check<F>(&self, name: impl Into<String>, check: F)
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.readiness.add(name, check);
    }

    pub fn remove_readiness_check(&self, name: &str) {
        self.readiness.remove(name);
    }

    pub fn liveness(&self) -> &CheckRegistry {
        &self.liveness
    }

    pub fn readiness(&self) -> &CheckRegistry {
        &self.readiness
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.http.local_addr().await
    }
}

#[async_trait]
impl Service for HealthService {
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
