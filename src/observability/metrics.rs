//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, failovers)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-role active backend
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, role
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_failovers_total` (counter): failovers by role and reason
//! - `gateway_failover_exhausted_total` (counter): requests that ran out of attempts
//! - `gateway_active_backend` (gauge): 1 for the URL currently active per role

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, role: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("role", role.to_string()),
    ];
    ::metrics::counter!("gateway_requests_total", &labels).increment(1);
    ::metrics::histogram!("gateway_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_failover(role: &str, reason: &'static str) {
    ::metrics::counter!("gateway_failovers_total", "role" => role.to_string(), "reason" => reason)
        .increment(1);
}

pub fn record_failover_exhausted(role: &str) {
    ::metrics::counter!("gateway_failover_exhausted_total", "role" => role.to_string()).increment(1);
}

/// Move the active marker of a role from `previous` to `current`.
pub fn record_active_backend(role: &str, previous: &str, current: &str) {
    if previous != current {
        ::metrics::gauge!("gateway_active_backend", "role" => role.to_string(), "url" => previous.to_string())
            .set(0.0);
    }
    ::metrics::gauge!("gateway_active_backend", "role" => role.to_string(), "url" => current.to_string())
        .set(1.0);
}
