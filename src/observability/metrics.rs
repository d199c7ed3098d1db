//! Metrics collection and exposition.
//!
//! # Metrics
//! - `storage_reads_total` (counter)
//! - `storage_writes_total` (counter): by outcome
//! - `storage_write_duration_seconds` (histogram): submit to classification
//! - `storage_events_total` (counter): delivered change events by phase
//! - `storage_rpc_errors_total` (counter): failed RPC attempts by operation
//! - `http_requests_total` (counter): by method, status
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_read() {
    counter!("storage_reads_total").increment(1);
}

pub fn record_write(outcome: &'static str, started: Instant) {
    counter!("storage_writes_total", "outcome" => outcome).increment(1);
    histogram!("storage_write_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_event(phase: &'static str) {
    counter!("storage_events_total", "phase" => phase).increment(1);
}

pub fn record_rpc_error(op: &'static str) {
    counter!("storage_rpc_errors_total", "op" => op).increment(1);
}

pub fn record_request(method: &str, status: u16) {
    counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
