//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method and status
//! - `proxy_request_duration_seconds` (histogram): end-to-end handler latency
//! - `proxy_rewrites_total` (counter): rewrite attempts by outcome
//! - `proxy_ws_sessions_total` (counter): WebSocket sessions by outcome
//! - `proxy_ws_frames_total` (counter): relayed frames by direction

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("proxy_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_rewrite(outcome: &'static str) {
    metrics::counter!("proxy_rewrites_total", "outcome" => outcome).increment(1);
}

pub fn record_ws_session(outcome: &'static str) {
    metrics::counter!("proxy_ws_sessions_total", "outcome" => outcome).increment(1);
}

pub fn record_ws_frame(direction: &'static str) {
    metrics::counter!("proxy_ws_frames_total", "direction" => direction).increment(1);
}
