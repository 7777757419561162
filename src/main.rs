use sco::config::Config;
use sco::metrics::sink::{ExpvarSink, PrometheusSink, StdoutSink};
use sco::metrics::{
    create_metrics, Collector, HttpCollector, Publisher, PublisherBuilder, RuntimeCollector,
};
use sco::server::{
    api_routes, shutdown_channel, wait_for_signal, ApiService, Coordinator, DebugService,
    HealthService,
};
use std::sync::Arc;
use tracing::{error, info};

/// Pick the publisher's metric source: a remote `/debug/vars` endpoint, or this process
fn select_collector(
    collect_from: Option<&str>,
    local: Arc<RuntimeCollector>,
) -> anyhow::Result<Arc<dyn Collector>> {
    let collector: Arc<dyn Collector> = match collect_from {
        Some(url) => {
            info!(url = %url, "Collecting metrics from remote process");
            Arc::new(HttpCollector::new(url)?)
        }
        None => {
            info!("Collecting metrics in-process");
            local
        }
    };
    Ok(collector)
}

/// Register sinks in fan-out order: prometheus, expvar, then stdout if enabled
fn add_sinks(
    mut publisher: PublisherBuilder,
    prometheus: &Arc<PrometheusSink>,
    expvar: &Arc<ExpvarSink>,
    stdout: bool,
) -> PublisherBuilder {
    publisher = publisher.sink(prometheus.clone()).sink(expvar.clone());
    if stdout {
        publisher = publisher.sink(Arc::new(StdoutSink::new()));
    }
    publisher
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    sco::logging::init(config.log_format)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting sco");

    let (shutdown_controller, shutdown_signal) = shutdown_channel();

    let metrics = create_metrics()?;
    info!("Self-metrics registry initialized");

    let runtime = Arc::new(RuntimeCollector::new(Some(metrics.clone())));
    let mut coordinator = Coordinator::new();

    let health = if config.health_enabled {
        let health = Arc::new(HealthService::new(
            config.health.clone(),
            Some(metrics.clone()),
        ));
        coordinator = coordinator.service(health.clone());
        Some(health)
    } else {
        info!("Health endpoints disabled");
        None
    };

    if config.metrics_enabled {
        let expvar = Arc::new(ExpvarSink::new(config.expvar.clone()));
        let prometheus = Arc::new(PrometheusSink::new(config.prometheus.clone()));
        coordinator = coordinator
            .service(expvar.clone())
            .service(prometheus.clone());

        let collector = select_collector(config.publish.collect_from.as_deref(), runtime.clone())?;
        let publisher = Publisher::builder(collector)
            .interval(config.publish.interval)
            .sink_timeout(config.publish.sink_timeout)
            .metrics(metrics.clone());
        coordinator = coordinator.publisher(add_sinks(
            publisher,
            &prometheus,
            &expvar,
            config.publish.stdout,
        ));
    } else {
        info!("Metrics publishing disabled");
    }

    if config.debug_enabled {
        coordinator = coordinator.service(Arc::new(DebugService::new(
            config.debug.clone(),
            runtime,
        )));
    }

    coordinator = coordinator.service(Arc::new(ApiService::new(
        config.api.clone(),
        api_routes(),
        health,
    )));

    tokio::spawn(async move {
        // The received signal is logged by wait_for_signal
        if let Err(e) = wait_for_signal().await {
            error!(error = %e, "Failed to install signal handlers, shutting down");
        }
        shutdown_controller.shutdown();
    });

    let report = coordinator.run(shutdown_signal).await;

    if !report.is_clean() {
        // Individual failures were logged by the coordinator
        anyhow::bail!(
            "{} component(s) failed to start, {} failed to stop",
            report.start_failures.len(),
            report.stop_failures.len()
        );
    }

    info!("sco shut down gracefully");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
