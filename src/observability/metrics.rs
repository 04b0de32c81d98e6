//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, route
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_rejections_total` (counter): pipeline halts by error kind
//! - `gateway_judge_rejections_total` (counter): failed judges by id
//! - `gateway_cache_lookups_total` (counter): caller cache hits/misses
//! - `gateway_cache_loads_total` (counter): backing-store loads after a miss
//! - `gateway_store_sessions_in_use` (gauge): counting-store sessions checked out
//! - `gateway_store_failures_total` (counter): store failures by kind
//! - `gateway_upstream_duration_seconds` (histogram): backend latency by outcome
//!
//! Without an installed recorder every call is a no-op, so library code and
//! tests can record freely.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus exporter"),
    }
}

pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route.to_string()
    )
    .increment(1);
    histogram!(
        "gateway_request_duration_seconds",
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_rejection(kind: &'static str) {
    counter!("gateway_rejections_total", "kind" => kind).increment(1);
}

pub fn record_judge_rejection(judge: &'static str) {
    counter!("gateway_judge_rejections_total", "judge" => judge).increment(1);
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("gateway_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_load() {
    counter!("gateway_cache_loads_total").increment(1);
}

pub fn record_store_sessions(in_use: usize) {
    gauge!("gateway_store_sessions_in_use").set(in_use as f64);
}

pub fn record_store_failure(kind: &'static str) {
    counter!("gateway_store_failures_total", "kind" => kind).increment(1);
}

pub fn record_upstream(outcome: &'static str, elapsed: Duration) {
    histogram!("gateway_upstream_duration_seconds", "outcome" => outcome)
        .record(elapsed.as_secs_f64());
}
