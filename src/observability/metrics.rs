//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define tunnel metrics (requests, latency, stream failures)
//! - Expose a Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `tunnel_forward_requests_total` (counter): forwarded requests by status
//! - `tunnel_forward_duration_seconds` (histogram): time to response metadata
//! - `tunnel_receive_requests_total` (counter): exchanges served by the receiver
//! - `tunnel_receive_duration_seconds` (histogram): handler run time
//! - `tunnel_stream_failures_total` (counter): failed streams by side
//!
//! # Design Decisions
//! - The exporter is optional; without it the macros record nothing

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_forward(status: u16, start: Instant) {
    counter!("tunnel_forward_requests_total", "status" => status.to_string()).increment(1);
    histogram!("tunnel_forward_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_receive(start: Instant) {
    counter!("tunnel_receive_requests_total").increment(1);
    histogram!("tunnel_receive_duration_seconds").record(start.elapsed().as_secs_f64());
}

/// `side` is `"forward"` or `"receive"`.
pub fn record_stream_failure(side: &'static str) {
    counter!("tunnel_stream_failures_total", "side" => side).increment(1);
}
