//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the dispatch proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, connection limits).
    pub listener: ListenerConfig,

    /// Backend definitions, one per logical upstream.
    pub backends: Vec<BackendConfig>,

    /// Ordered prefix rules. First match wins.
    pub routes: Vec<RouteConfig>,

    /// Fallback backend and match mode.
    pub routing: RoutingConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Pooled client settings for plain requests.
    pub pool: PoolConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Maximum concurrent client connections (backpressure).
    pub max_connections: usize,

    /// Allow several requests per client connection.
    pub keep_alive: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            max_connections: 10_000,
            keep_alive: true,
        }
    }
}

/// A single upstream the proxy can dispatch to.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Unique backend identifier, referenced by routes.
    pub name: String,

    /// Backend address (e.g., "127.0.0.1:8000" or "app.internal:8000").
    pub address: String,
}

/// Prefix rule mapping request targets to a backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging.
    #[serde(default)]
    pub name: Option<String>,

    /// Literal prefix of the request target.
    pub path_prefix: String,

    /// Backend name to forward to.
    pub backend: String,
}

/// How a route prefix is compared with the request target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Raw `starts_with`. `/socket.io` also matches `/socket.io-evil`.
    #[default]
    Prefix,
    /// Prefix must be followed by `/`, `?` or the end of the target.
    Segment,
}

/// Routing settings shared by all rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Backend used when no rule matches.
    pub fallback: String,

    /// Prefix comparison mode.
    pub match_mode: MatchMode,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            fallback: "web".to_string(),
            match_mode: MatchMode::Prefix,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed for a backend to produce response headers, in seconds.
    /// Zero disables the limit.
    pub request_secs: u64,

    /// Time allowed for a client to send request headers, in seconds.
    pub header_read_secs: u64,

    /// How long in-flight exchanges may run after shutdown starts.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            header_read_secs: 30,
            shutdown_grace_secs: 10,
        }
    }
}

/// Backend connection pool for plain requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Idle pooled connections are closed after this many seconds.
    pub idle_timeout_secs: u64,

    /// Upper bound on idle connections kept per backend.
    pub max_idle_per_host: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 90,
            max_idle_per_host: 32,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins if set.
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [[backends]]
            name = "web"
            address = "127.0.0.1:8000"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "0.0.0.0:3000");
        assert_eq!(config.routing.fallback, "web");
        assert_eq!(config.routing.match_mode, MatchMode::Prefix);
        assert!(config.routes.is_empty());
        assert_eq!(config.timeouts.connect_secs, 5);
    }

    #[test]
    fn full_config_parses() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:3000"
            keep_alive = false

            [routing]
            fallback = "web"
            match_mode = "segment"

            [[backends]]
            name = "web"
            address = "127.0.0.1:8000"

            [[backends]]
            name = "ws"
            address = "localhost:8001"

            [[routes]]
            name = "socket-io"
            path_prefix = "/socket.io"
            backend = "ws"

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert!(!config.listener.keep_alive);
        assert_eq!(config.routing.match_mode, MatchMode::Segment);
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.routes[0].name.as_deref(), Some("socket-io"));
        assert_eq!(config.routes[0].backend, "ws");
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
