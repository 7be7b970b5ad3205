//! Metrics collection and exposition.
//!
//! # Metrics
//! - `vhost_requests_total` (counter): responses by domain, status
//! - `vhost_request_duration_seconds` (histogram): request to response written
//! - `vhost_connections_active` (gauge): connections holding a pool slot
//! - `vhost_connections_rejected_total` (counter): accepts refused by the pool
//! - `vhost_chain_errors_total` (counter): service failures by service id

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(domain: &str, status: u16, start: Instant) {
    metrics::counter!(
        "vhost_requests_total",
        "domain" => domain.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("vhost_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn connection_opened() {
    metrics::gauge!("vhost_connections_active").increment(1.0);
}

pub fn connection_closed() {
    metrics::gauge!("vhost_connections_active").decrement(1.0);
}

pub fn record_rejected_connection() {
    metrics::counter!("vhost_connections_rejected_total").increment(1);
}

pub fn record_chain_error(service: &str) {
    metrics::counter!("vhost_chain_errors_total", "service" => service.to_string()).increment(1);
}
