//! Metrics collection and exposition.
//!
//! # Metrics
//! - `sidecar_rpc_calls_total` (counter): RPC calls by method, outcome
//! - `sidecar_rpc_call_duration_seconds` (histogram): RPC handler latency
//! - `sidecar_http_requests_total` (counter): HTTP requests by method, status
//! - `sidecar_http_request_duration_seconds` (histogram): HTTP latency
//! - `sidecar_handler_panics_total` (counter): recovered panics by protocol
//! - `sidecar_active_connections` (gauge): open connections by protocol
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::frontend::Protocol;

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_rpc_call(method: &str, outcome: &str, start: Instant) {
    let labels = [("method", method.to_string()), ("outcome", outcome.to_string())];
    counter!("sidecar_rpc_calls_total", &labels).increment(1);
    histogram!("sidecar_rpc_call_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_http_request(method: &str, status: u16, start: Instant) {
    let labels = [("method", method.to_string()), ("status", status.to_string())];
    counter!("sidecar_http_requests_total", &labels).increment(1);
    histogram!("sidecar_http_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_handler_panic(protocol: Protocol) {
    counter!("sidecar_handler_panics_total", "protocol" => protocol.as_str()).increment(1);
}

pub fn set_active_connections(protocol: Protocol, count: u64) {
    gauge!("sidecar_active_connections", "protocol" => protocol.as_str()).set(count as f64);
}
