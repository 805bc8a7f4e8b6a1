//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define router metrics (requests, latency, connections, shutdown)
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `router_requests_total` (counter): requests by method and status
//! - `router_request_duration_seconds` (histogram): latency by method
//! - `router_active_connections` (gauge): open connections
//! - `router_rejected_connections_total` (counter): connections refused by the limit
//! - `router_shutdown_steps_total` (counter): drain steps by step and outcome
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so libraries and
//!   tests pay nothing unless the binary enables the exporter

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const REQUESTS_TOTAL: &str = "router_requests_total";
pub const REQUEST_DURATION: &str = "router_request_duration_seconds";
pub const ACTIVE_CONNECTIONS: &str = "router_active_connections";
pub const REJECTED_CONNECTIONS: &str = "router_rejected_connections_total";
pub const SHUTDOWN_STEPS: &str = "router_shutdown_steps_total";

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must be called from inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, started: Instant) {
    metrics::counter!(
        REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(REQUEST_DURATION, "method" => method.to_string())
        .record(started.elapsed().as_secs_f64());
}

pub fn set_active_connections(count: u64) {
    metrics::gauge!(ACTIVE_CONNECTIONS).set(count as f64);
}

pub fn record_rejected_connection(reason: &'static str) {
    metrics::counter!(REJECTED_CONNECTIONS, "reason" => reason).increment(1);
}

pub fn record_shutdown_step(step: &str, outcome: &'static str) {
    metrics::counter!(
        SHUTDOWN_STEPS,
        "step" => step.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
