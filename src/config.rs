//! Process configuration from `SCO_*` environment variables
//!
//! Every variable is optional; unset means the component default. Booleans
//! accept "true"/"1" and "false"/"0".

use crate::logging::LogFormat;
use crate::metrics::sink::{ExpvarConfig, PrometheusConfig};
use crate::server::{ApiConfig, DebugConfig, HealthConfig};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{var}: invalid socket address {value:?}")]
    Addr { var: &'static str, value: String },

    #[error("{var}: expected a whole number of seconds, got {value:?}")]
    Seconds { var: &'static str, value: String },

    #[error("{var}: expected true/false, got {value:?}")]
    Bool { var: &'static str, value: String },

    #[error("{var}: unknown log format {value:?} (expected text or json)")]
    LogFormat { var: &'static str, value: String },

    #[error("SCO_PUBLISH_INTERVAL_SECS must be greater than zero")]
    ZeroInterval,
}

/// Publisher settings
#[derive(Debug, Clone, PartialEq)]
pub struct PublishConfig {
    pub interval: Duration,
    pub sink_timeout: Option<Duration>,
    pub stdout: bool,
    /// Remote `/debug/vars` URL; unset collects in-process
    pub collect_from: Option<String>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            interval: crate::metrics::publisher::DEFAULT_INTERVAL,
            sink_timeout: None,
            stdout: true,
            collect_from: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_format: LogFormat,
    pub api: ApiConfig,
    pub health_enabled: bool,
    pub health: HealthConfig,
    pub debug_enabled: bool,
    pub debug: DebugConfig,
    pub metrics_enabled: bool,
    pub expvar: ExpvarConfig,
    pub prometheus: PrometheusConfig,
    pub publish: PublishConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Text,
            api: ApiConfig::default(),
            health_enabled: true,
            health: HealthConfig::default(),
            debug_enabled: true,
            debug: DebugConfig::default(),
            metrics_enabled: true,
            expvar: ExpvarConfig::default(),
            prometheus: PrometheusConfig::default(),
            publish: PublishConfig::default(),
        }
    }
}

impl Config {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through `lookup`, so tests need not touch the real environment
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);
        let mut config = Config::default();

        if let Some(value) = env.get("SCO_LOG_FORMAT") {
            config.log_format = match value.as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                _ => {
                    return Err(ConfigError::LogFormat {
                        var: "SCO_LOG_FORMAT",
                        value,
                    })
                }
            };
        }

        env.addr("SCO_API_ADDR", &mut config.api.addr)?;
        env.seconds("SCO_API_SHUTDOWN_TIMEOUT_SECS", &mut config.api.shutdown_timeout)?;

        env.flag("SCO_HEALTH_ENABLED", &mut config.health_enabled)?;
        env.addr("SCO_HEALTH_ADDR", &mut config.health.addr)?;
        if let Some(prefix) = env.get("SCO_HEALTH_PREFIX") {
            config.health.prefix = prefix;
        }
        env.seconds(
            "SCO_HEALTH_SHUTDOWN_TIMEOUT_SECS",
            &mut config.health.shutdown_timeout,
        )?;

        env.flag("SCO_DEBUG_ENABLED", &mut config.debug_enabled)?;
        env.addr("SCO_DEBUG_ADDR", &mut config.debug.addr)?;

        env.flag("SCO_METRICS_ENABLED", &mut config.metrics_enabled)?;
        env.addr("SCO_EXPVAR_ADDR", &mut config.expvar.addr)?;
        if let Some(route) = env.get("SCO_EXPVAR_ROUTE") {
            config.expvar.route = route;
        }
        env.addr("SCO_PROMETHEUS_ADDR", &mut config.prometheus.addr)?;
        if let Some(route) = env.get("SCO_PROMETHEUS_ROUTE") {
            config.prometheus.route = route;
        }

        // One deadline covers every metrics-side listener
        let mut metrics_timeout = config.expvar.shutdown_timeout;
        env.seconds("SCO_METRICS_SHUTDOWN_TIMEOUT_SECS", &mut metrics_timeout)?;
        config.expvar.shutdown_timeout = metrics_timeout;
        config.prometheus.shutdown_timeout = metrics_timeout;
        config.debug.shutdown_timeout = metrics_timeout;

        env.seconds("SCO_PUBLISH_INTERVAL_SECS", &mut config.publish.interval)?;
        if config.publish.interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if env.get("SCO_PUBLISH_SINK_TIMEOUT_SECS").is_some() {
            let mut timeout = Duration::ZERO;
            env.seconds("SCO_PUBLISH_SINK_TIMEOUT_SECS", &mut timeout)?;
            config.publish.sink_timeout = Some(timeout);
        }
        env.flag("SCO_PUBLISH_STDOUT", &mut config.publish.stdout)?;
        config.publish.collect_from = env.get("SCO_COLLECT_FROM").filter(|url| !url.is_empty());

        Ok(config)
    }
}

/// Typed accessors over a variable lookup; unset leaves the target untouched
struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn get(&self, var: &str) -> Option<String> {
        (self.0)(var)
    }

    fn addr(&self, var: &'static str, target: &mut SocketAddr) -> Result<(), ConfigError> {
        if let Some(value) = self.get(var) {
            *target = value
                .parse()
                .map_err(|_| ConfigError::Addr { var, value })?;
        }
        Ok(())
    }

    fn seconds(&self, var: &'static str, target: &mut Duration) -> Result<(), ConfigError> {
        if let Some(value) = self.get(var) {
            let secs: u64 = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Seconds { var, value })?;
            *target = Duration::from_secs(secs);
        }
        Ok(())
    }

    fn flag(&self, var: &'static str, target: &mut bool) -> Result<(), ConfigError> {
        if let Some(value) = self.get(var) {
            *target = match value.as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => return Err(ConfigError::Bool { var, value }),
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(|_| None).expect("defaults are valid");

        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.api.addr, SocketAddr::from(([0, 0, 0, 0], 8080)));
        assert_eq!(config.health.addr, SocketAddr::from(([0, 0, 0, 0], 8081)));
        assert_eq!(config.health.shutdown_timeout, Duration::from_secs(3));
        assert_eq!(config.expvar.addr, SocketAddr::from(([0, 0, 0, 0], 9001)));
        assert_eq!(config.prometheus.addr, SocketAddr::from(([0, 0, 0, 0], 9002)));
        assert_eq!(config.debug.addr, SocketAddr::from(([0, 0, 0, 0], 9003)));
        assert_eq!(config.publish, PublishConfig::default());
        assert!(config.health_enabled && config.debug_enabled && config.metrics_enabled);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("SCO_LOG_FORMAT", "json"),
            ("SCO_HEALTH_PREFIX", "/api/"),
            ("SCO_HEALTH_ADDR", "127.0.0.1:18081"),
            ("SCO_DEBUG_ENABLED", "false"),
            ("SCO_METRICS_SHUTDOWN_TIMEOUT_SECS", "7"),
            ("SCO_PUBLISH_INTERVAL_SECS", "1"),
            ("SCO_PUBLISH_SINK_TIMEOUT_SECS", "2"),
            ("SCO_PUBLISH_STDOUT", "0"),
            ("SCO_COLLECT_FROM", "http://10.0.0.5:9003/debug/vars"),
        ]))
        .expect("valid overrides");

        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.health.prefix, "/api/");
        assert_eq!(config.health.addr, SocketAddr::from(([127, 0, 0, 1], 18081)));
        assert!(!config.debug_enabled);
        assert_eq!(config.expvar.shutdown_timeout, Duration::from_secs(7));
        assert_eq!(config.prometheus.shutdown_timeout, Duration::from_secs(7));
        assert_eq!(config.publish.interval, Duration::from_secs(1));
        assert_eq!(config.publish.sink_timeout, Some(Duration::from_secs(2)));
        assert!(!config.publish.stdout);
        assert_eq!(
            config.publish.collect_from.as_deref(),
            Some("http://10.0.0.5:9003/debug/vars")
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = Config::from_lookup(lookup(&[("SCO_API_ADDR", "localhost")]))
            .expect_err("hostname is not a socket address");
        assert_eq!(
            err,
            ConfigError::Addr {
                var: "SCO_API_ADDR",
                value: "localhost".to_string()
            }
        );

        assert!(matches!(
            Config::from_lookup(lookup(&[("SCO_HEALTH_ENABLED", "yes")])),
            Err(ConfigError::Bool { .. })
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("SCO_PUBLISH_INTERVAL_SECS", "-1")])),
            Err(ConfigError::Seconds { .. })
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("SCO_LOG_FORMAT", "xml")])),
            Err(ConfigError::LogFormat { .. })
        ));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        assert_eq!(
            Config::from_lookup(lookup(&[("SCO_PUBLISH_INTERVAL_SECS", "0")])).err(),
            Some(ConfigError::ZeroInterval)
        );
    }

    #[test]
    fn test_empty_collect_from_means_in_process() {
        let config = Config::from_lookup(lookup(&[("SCO_COLLECT_FROM", "")])).expect("valid");
        assert_eq!(config.publish.collect_from, None);
    }
}
