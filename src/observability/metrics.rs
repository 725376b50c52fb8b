//! Metrics collection and exposition.

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::Method;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Initialize metrics exporter and server.
pub fn init_metrics(addr: SocketAddr) {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus recorder");

    tracing::info!("Metrics server listening on http://{}", addr);
}

/// Record one upstream fetch outcome. Wired into the executor as the
/// `fetch_latency` callback; the aggregation core never calls this directly.
pub fn record_fetch(duration: Duration, method: &Method, route_pattern: &str, status: u16) {
    let labels = [
        ("method", method.to_string()),
        ("route", route_pattern.to_string()),
        ("status", status.to_string()),
    ];

    counter!("aggregate_fetch_total", &labels).increment(1);
    histogram!("aggregate_fetch_duration_seconds", &labels).record(duration.as_secs_f64());
}
