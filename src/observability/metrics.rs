//! Metrics collection and exposition.
//!
//! # Metrics
//! - `webconsole_requests_total` (counter): requests by method, route
//! - `webconsole_request_duration_seconds` (histogram): time to dispatch by route
//! - `webconsole_sessions_total` (counter): session lifecycle events
//! - `webconsole_active_sessions` (gauge): occupied session slots
//! - `webconsole_websocket_clients` (gauge): attached WebSocket handlers
//! - `webconsole_transfers_total` (counter): chunked transfers by outcome

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one dispatched request.
pub fn record_request(method: &str, route: &'static str, start: Instant) {
    metrics::counter!(
        "webconsole_requests_total",
        "method" => method.to_string(),
        "route" => route
    )
    .increment(1);
    metrics::histogram!("webconsole_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

/// Record a session lifecycle event (`created`, `evicted`, `expired`, `destroyed`).
pub fn record_session_event(event: &'static str) {
    metrics::counter!("webconsole_sessions_total", "event" => event).increment(1);
}

pub fn set_active_sessions(count: usize) {
    metrics::gauge!("webconsole_active_sessions").set(count as f64);
}

pub fn set_websocket_clients(count: usize) {
    metrics::gauge!("webconsole_websocket_clients").set(count as f64);
}

/// Record the end of a chunked transfer (`completed` or `aborted`).
pub fn record_transfer(outcome: &'static str) {
    metrics::counter!("webconsole_transfers_total", "outcome" => outcome).increment(1);
}
