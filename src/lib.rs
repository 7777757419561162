//! Service lifecycle and observability: health probes, coordinated
//! listener start/stop, and periodic metrics fan-out to pluggable sinks.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod server;
