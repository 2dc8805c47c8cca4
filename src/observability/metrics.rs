//! Metrics collection and exposition.
//!
//! # Metrics
//! - `guard_rate_limited_total` (counter): requests rejected with 429
//! - `guard_auth_rejected_total` (counter): failed auth attempts, by reason
//! - `guard_path_rejected_total` (counter): sandbox rejections, by kind
//! - `guard_sweep_removed_total` (counter): expired entries swept, by store
//! - `guard_tracked_clients` (gauge): identities held by the rate limiter
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_rate_limited() {
    ::metrics::counter!("guard_rate_limited_total").increment(1);
}

pub fn record_auth_rejected(reason: &'static str) {
    ::metrics::counter!("guard_auth_rejected_total", "reason" => reason).increment(1);
}

pub fn record_path_rejected(kind: &'static str) {
    ::metrics::counter!("guard_path_rejected_total", "kind" => kind).increment(1);
}

pub fn record_sweep(store: &'static str, removed: usize) {
    ::metrics::counter!("guard_sweep_removed_total", "store" => store).increment(removed as u64);
}

pub fn record_tracked_clients(count: usize) {
    ::metrics::gauge!("guard_tracked_clients").set(count as f64);
}
