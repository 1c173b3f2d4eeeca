//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (decisions, requests, failures, tunnels)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-backend and aggregate metrics
//!
//! # Metrics
//! - `proxy_route_decisions_total` (counter): decisions by backend, kind
//! - `proxy_requests_total` (counter): plain requests by backend, status
//! - `proxy_request_duration_seconds` (histogram): time to response head
//! - `proxy_backend_failures_total` (counter): failures by backend, kind
//! - `proxy_active_connections` (gauge): in-flight exchanges
//! - `proxy_tunnel_bytes_total` (counter): spliced bytes by backend, direction
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Labels for backend, kind, status code

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_route_decision(backend: &str, kind: &'static str) {
    counter!(
        "proxy_route_decisions_total",
        "backend" => backend.to_string(),
        "kind" => kind
    )
    .increment(1);
}

pub fn record_request(backend: &str, status: u16, start: Instant) {
    counter!(
        "proxy_requests_total",
        "backend" => backend.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "backend" => backend.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_backend_failure(backend: &str, kind: &'static str) {
    counter!(
        "proxy_backend_failures_total",
        "backend" => backend.to_string(),
        "kind" => kind
    )
    .increment(1);
}

pub fn record_tunnel(backend: &str, client_to_backend: u64, backend_to_client: u64) {
    counter!(
        "proxy_tunnel_bytes_total",
        "backend" => backend.to_string(),
        "direction" => "client_to_backend"
    )
    .increment(client_to_backend);
    counter!(
        "proxy_tunnel_bytes_total",
        "backend" => backend.to_string(),
        "direction" => "backend_to_client"
    )
    .increment(backend_to_client);
}

pub fn connection_opened() {
    gauge!("proxy_active_connections").increment(1.0);
}

pub fn connection_closed() {
    gauge!("proxy_active_connections").decrement(1.0);
}
