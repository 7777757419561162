use super::*;
use sco::server::{DebugConfig, DebugService, Service};
use std::net::SocketAddr;
use std::time::Duration;

#[tokio::test]
async fn test_select_collector_defaults_to_in_process() {
    let collector = select_collector(None, Arc::new(RuntimeCollector::new(None)))
        .expect("in-process collector");

    let snapshot = collector.collect().await.expect("collect");

    assert!(snapshot.contains_key("cmdline"));
    assert!(snapshot.contains_key("runtime"));
}

#[tokio::test]
async fn test_select_collector_reads_remote_debug_vars() {
    let debug = DebugService::new(
        DebugConfig {
            addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            shutdown_timeout: Duration::from_secs(1),
        },
        Arc::new(RuntimeCollector::new(None)),
    );
    debug.start().await.expect("debug start");
    let addr = debug.local_addr().await.expect("bound address");
    let url = format!("http://{}/debug/vars", addr);

    let collector = select_collector(Some(&url), Arc::new(RuntimeCollector::new(None)))
        .expect("remote collector");
    let snapshot = collector.collect().await.expect("collect");

    assert!(snapshot.contains_key("uptime_seconds"));
    debug.stop().await.expect("debug stop");
}
