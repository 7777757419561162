//! Starts every listening component and the metrics publisher, then stops
//! them all once the shutdown signal fires.
//!
//! Start order: all listeners concurrently, then the publisher (so sink
//! endpoints exist before the first tick). Stop order: the publisher first (no
//! delivery after that), then listeners one at a time in reverse registration
//! order, each within its own shutdown deadline.

use crate::metrics::{Publisher, PublisherBuilder};
use crate::server::lifecycle::{LifecycleError, Service};
use crate::server::shutdown::ShutdownSignal;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info, warn};

/// A component that failed a start or stop transition
#[derive(Debug)]
pub struct ComponentFailure {
    pub component: String,
    pub error: LifecycleError,
}

/// Outcome of a coordinated run
#[derive(Debug, Default)]
pub struct CoordinatorReport {
    pub start_failures: Vec<ComponentFailure>,
    pub stop_failures: Vec<ComponentFailure>,
}

impl CoordinatorReport {
    pub fn is_clean(&self) -> bool {
        self.start_failures.is_empty() && self.stop_failures.is_empty()
    }
}

#[derive(Default)]
pub struct Coordinator {
    services: Vec<Arc<dyn Service>>,
    publisher: Option<PublisherBuilder>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listening component
    pub fn service(mut self, service: Arc<dyn Service>) -> Self {
        self.services.push(service);
        self
    }

    /// Register the metrics publisher; it is started after the listeners
    pub fn publisher(mut self, publisher: PublisherBuilder) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Run until `shutdown` fires, then stop everything that started
    ///
    /// Start failures are logged and reported; the remaining components keep
    /// running. Returns only after every started component has stopped.
    pub async fn run(self, mut shutdown: ShutdownSignal) -> CoordinatorReport {
        let mut report = CoordinatorReport::default();

        let outcomes = join_all(self.services.iter().map(|service| async move {
            (service.clone(), service.start().await)
        }))
        .await;

        let mut started = Vec::with_capacity(outcomes.len());
        for (service, outcome) in outcomes {
            match outcome {
                Ok(()) => started.push(service),
                Err(error) => {
                    error!(component = service.name(), error = %error, "Component failed to start");
                    report.start_failures.push(ComponentFailure {
                        component: service.name().to_string(),
                        error,
                    });
                }
            }
        }

        let publisher: Option<Publisher> = self.publisher.map(PublisherBuilder::start);

        info!(
            started = started.len(),
            failed = report.start_failures.len(),
            "Components started, waiting for shutdown"
        );
        shutdown.wait().await;
        info!("Initiating graceful shutdown");

        if let Some(publisher) = publisher {
            publisher.stop().await;
        }

        for service in started.iter().rev() {
            if let Err(error) = service.stop().await {
                warn!(component = service.name(), error = %error, "Component did not stop cleanly");
                report.stop_failures.push(ComponentFailure {
                    component: service.name().to_string(),
                    error,
                });
            }
        }

        info!("All components stopped");
        report
    }
}
