//! Listening components and their coordinated lifecycle
//!
//! - `health` - liveness/readiness probes backed by check registries
//! - `api` - main API listener, registers "am I serving" readiness checks
//! - `debug` - `/debug/vars` runtime statistics
//! - `coordinator` - starts everything, stops everything on a shutdown signal
//!
//! Every listener follows the start/stop contract in [`lifecycle`].

pub mod api;
pub mod checks;
pub mod coordinator;
pub mod debug;
pub mod health;
pub mod lifecycle;
pub mod middleware;
pub mod shutdown;

pub use api::{api_routes, ApiConfig, ApiService, Upstream};
pub use checks::{CheckRegistry, Evaluation};
pub use coordinator::{ComponentFailure, Coordinator, CoordinatorReport};
pub use debug::{DebugConfig, DebugService};
pub use health::{HealthConfig, HealthService};
pub use lifecycle::{HttpService, LifecycleError, Service};
pub use shutdown::{shutdown_channel, wait_for_signal, ShutdownController, ShutdownSignal};

/// Turn a configured route into an axum path: exactly one leading `/`, no trailing `/`
pub(crate) fn normalize_path(path: &str) -> String {
    format!("/{}", path.trim_matches('/'))
}

#[cfg(test)]
#[path = "health_test.rs"]
mod health_tests;

#[cfg(test)]
#[path = "lifecycle_test.rs"]
mod lifecycle_tests;

#[cfg(test)]
#[path = "shutdown_test.rs"]
mod shutdown_tests;

#[cfg(test)]
#[path = "coordinator_test.rs"]
mod coordinator_tests;
