//! Metrics collection and exposition.
//!
//! # Metrics
//! - `breaker_calls_total` (counter): gated calls by guard, outcome
//!   (`success`, `failure`, `fallback`)
//! - `breaker_trips_total` (counter): Closed → Open transitions by guard
//! - `breaker_replays_total` (counter): replays by guard, result
//! - `breaker_alerts_total` (counter): exhausted episodes by guard
//! - `breaker_pool_rejections_total` (counter): hand-offs refused by the pool
//! - `breaker_dispatcher_restarts_total` (counter): dispatcher panics survived
//! - `breaker_open_guards` (gauge): currently tripped guards
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until an
//!   exporter is installed
//! - Prometheus exporter is optional and off by default

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with an HTTP scrape endpoint at `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_call(guard: &str, outcome: &'static str) {
    counter!("breaker_calls_total", "guard" => guard.to_string(), "outcome" => outcome).increment(1);
}

pub fn record_trip(guard: &str) {
    counter!("breaker_trips_total", "guard" => guard.to_string()).increment(1);
}

pub fn record_replay(guard: &str, success: bool) {
    let result = if success { "success" } else { "failure" };
    counter!("breaker_replays_total", "guard" => guard.to_string(), "result" => result).increment(1);
}

pub fn record_alert(guard: &str) {
    counter!("breaker_alerts_total", "guard" => guard.to_string()).increment(1);
}

pub fn record_pool_rejection() {
    counter!("breaker_pool_rejections_total").increment(1);
}

pub fn record_dispatcher_restart() {
    counter!("breaker_dispatcher_restarts_total").increment(1);
}

pub fn record_open_guards(count: usize) {
    gauge!("breaker_open_guards").set(count as f64);
}
