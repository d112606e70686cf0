//! Metrics collection and exposition.
//!
//! # Metrics
//! - `stream_proxy_requests_total` (counter): proxied requests by host, status
//! - `stream_proxy_upstream_headers_seconds` (histogram): time to upstream headers
//! - `stream_proxy_active_streams` (gauge): in-flight upstream streams per host
//! - `stream_proxy_sessions_dialed_total` (counter): dials by host, outcome
//! - `stream_proxy_session_rotations_total` (counter): rotations by host, kind
//! - `stream_proxy_ping_failures_total` (counter): failed liveness pings
//!
//! Recording is a no-op until a recorder is installed, so tests and the
//! embedded deployment can run without an exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Count a finished stream request.
pub fn record_request(host: &str, status: u16, start: Instant) {
    counter!(
        "stream_proxy_requests_total",
        "host" => host.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    tracing::trace!(host = %host, status, elapsed = ?start.elapsed(), "Request recorded");
}

pub fn record_upstream_headers(host: &str, start: Instant) {
    histogram!("stream_proxy_upstream_headers_seconds", "host" => host.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_active_streams(host: &str, active: usize) {
    gauge!("stream_proxy_active_streams", "host" => host.to_string()).set(active as f64);
}

pub fn record_session_dial(host: &str, ok: bool) {
    let outcome = if ok { "success" } else { "failure" };
    counter!(
        "stream_proxy_sessions_dialed_total",
        "host" => host.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// `kind` is `promoted` (standby took over) or `dialed` (fresh session).
pub fn record_rotation(host: &str, kind: &'static str) {
    counter!(
        "stream_proxy_session_rotations_total",
        "host" => host.to_string(),
        "kind" => kind
    )
    .increment(1);
}

pub fn record_ping_failure(host: &str) {
    counter!("stream_proxy_ping_failures_total", "host" => host.to_string()).increment(1);
}
