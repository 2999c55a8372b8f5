//! Metrics collection and exposition.
//!
//! # Metrics
//! - `shield_requests_total` (counter): proxied requests by method, status
//! - `shield_request_duration_seconds` (histogram): end-to-end latency
//! - `shield_auth_failures_total` (counter): identity failures by reason
//! - `shield_injection_failures_total` (counter): requests refused for a
//!   missing backend credential
//! - `shield_relay_sessions_active` (gauge): open WebSocket relays
//! - `shield_relay_faults_total` (counter): backend error frames sanitized
//! - `shield_instance_health` (gauge): 1=healthy, 0=unhealthy, per instance
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Labels never carry credential values or identities

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter with an HTTP scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record one completed proxied request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "shield_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("shield_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_auth_failure(reason: &'static str) {
    counter!("shield_auth_failures_total", "reason" => reason).increment(1);
}

pub fn record_injection_failure() {
    counter!("shield_injection_failures_total").increment(1);
}

pub fn relay_opened() {
    gauge!("shield_relay_sessions_active").increment(1.0);
}

pub fn relay_closed() {
    gauge!("shield_relay_sessions_active").decrement(1.0);
}

pub fn record_relay_fault() {
    counter!("shield_relay_faults_total").increment(1);
}

pub fn record_instance_health(instance: &str, healthy: bool) {
    gauge!("shield_instance_health", "instance" => instance.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}
