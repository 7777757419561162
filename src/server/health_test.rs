//! Tests for health probe endpoints

use super::health::*;
use super::lifecycle::Service;
use crate::metrics::create_metrics;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;

fn test_config(prefix: &str) -> HealthConfig {
    HealthConfig {
        addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        prefix: prefix.to_string(),
        shutdown_timeout: Duration::from_secs(1),
    }
}

/// Start a health service on an ephemeral port and return its address
async fn start(service: &HealthService) -> SocketAddr {
    service.start().await.expect("health service should start");
    service.local_addr().await.expect("running service has an address")
}

async fn get(addr: SocketAddr, path: &str) -> reqwest::Response {
    reqwest::Client::new()
        .get(format!("http://{}{}", addr, path))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .expect("Failed to connect to health server")
}

/// Test that an empty readiness registry reports 200
#[tokio::test]
async fn test_ready_with_no_checks_returns_200() {
    let service = HealthService::new(test_config(""), None);
    let addr = start(&service).await;

    let response = get(addr, "/health/ready").await;

    assert_eq!(response.status(), 200, "No checks is vacuously healthy");
    let body: Value = response.json().await.expect("json body");
    assert_eq!(body, json!({"status": "OK"}));

    service.stop().await.expect("stop");
}

/// Test that a failing check yields 503 and full=true lists every result
#[tokio::test]
async fn test_ready_with_failing_check_returns_503() {
    let service = HealthService::new(test_config(""), None);
    service.add_readiness_check("A", || Err(anyhow::anyhow!("x")));
    service.add_readiness_check("B", || Ok(()));
    let addr = start(&service).await;

    let response = get(addr, "/health/ready").await;
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.expect("json body");
    assert_eq!(body, json!({"status": "Unavailable"}));

    let response = get(addr, "/health/ready?full=true").await;
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.expect("json body");
    assert_eq!(body["data"]["A"], "x");
    assert_eq!(body["data"]["B"], "OK");

    service.stop().await.expect("stop");
}

/// Test that full=true on a healthy probe returns 200 with data
#[tokio::test]
async fn test_full_response_when_healthy() {
    let service = HealthService::new(test_config(""), None);
    service.add_liveness_check("process", || Ok(()));
    let addr = start(&service).await;

    let response = get(addr, "/health/live?full=true").await;

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("json body");
    assert_eq!(body, json!({"status": "OK", "data": {"process": "OK"}}));

    service.stop().await.expect("stop");
}

/// Test that liveness and readiness are separate namespaces
#[tokio::test]
async fn test_liveness_and_readiness_are_independent() {
    let service = HealthService::new(test_config(""), None);
    service.add_readiness_check("upstream", || Err(anyhow::anyhow!("unreachable")));
    let addr = start(&service).await;

    assert_eq!(get(addr, "/health/ready").await.status(), 503);
    assert_eq!(get(addr, "/health/live").await.status(), 200);

    service.add_liveness_check("upstream", || Err(anyhow::anyhow!("deadlocked")));
    service.remove_readiness_check("upstream");

    assert_eq!(get(addr, "/health/ready").await.status(), 200);
    assert_eq!(get(addr, "/health/live").await.status(), 503);

    service.stop().await.expect("stop");
}

/// Test that the prefix is applied to both probes
#[tokio::test]
async fn test_prefix_is_applied() {
    let service = HealthService::new(test_config("/api/"), None);
    let addr = start(&service).await;

    assert_eq!(get(addr, "/api/health/ready").await.status(), 200);
    assert_eq!(get(addr, "/api/health/live").await.status(), 200);
    assert_eq!(get(addr, "/health/ready").await.status(), 404);

    service.stop().await.expect("stop");
}

/// Test that probes are counted by outcome
#[tokio::test]
async fn test_probe_requests_are_counted() {
    let metrics = create_metrics().expect("registry should build");
    let service = HealthService::new(test_config(""), Some(metrics.clone()));
    service.add_readiness_check("A", || Err(anyhow::anyhow!("x")));
    let addr = start(&service).await;

    get(addr, "/health/ready").await;
    get(addr, "/health/live").await;

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot["probe_requests_total"]["ready_503"], 1.0);
    assert_eq!(snapshot["probe_requests_total"]["live_200"], 1.0);

    service.stop().await.expect("stop");
}

/// Test that a second service on the same address fails to bind while the first keeps serving
#[tokio::test]
async fn test_second_service_on_same_address_fails() {
    let first = HealthService::new(test_config(""), None);
    let addr = start(&first).await;

    let second = HealthService::new(
        HealthConfig {
            addr,
            ..test_config("")
        },
        None,
    );
    let result = second.start().await;

    assert!(
        matches!(result, Err(crate::server::LifecycleError::Bind { .. })),
        "Second bind should fail, got {:?}",
        result
    );
    assert!(!second.is_running(), "Failed start must roll back the flag");
    assert!(first.is_running());
    assert_eq!(get(addr, "/health/ready").await.status(), 200);

    first.stop().await.expect("stop");
}

/// Test the registry accessors proxy to the right namespace
#[test]
fn test_check_registration_proxies() {
    let service = HealthService::new(HealthConfig::default(), None);

    service.add_liveness_check("a", || Ok(()));
    service.add_readiness_check("b", || Ok(()));
    service.add_readiness_check("c", || Ok(()));

    assert_eq!(service.liveness().len(), 1);
    assert_eq!(service.readiness().len(), 2);

    service.remove_readiness_check("b");
    service.remove_liveness_check("missing");

    assert_eq!(service.liveness().len(), 1);
    assert_eq!(service.readiness().len(), 1);
}
