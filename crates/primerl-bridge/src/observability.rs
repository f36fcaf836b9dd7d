//! Metric names/labels and install helper.
//!
//! Call sites use the small wrapper functions below instead of the raw
//! `metrics` macros so the label set for each series lives in one place.
//! When no recorder is installed (`PRIMERL_METRICS_PORT` unset) the `metrics`
//! crate's default no-op recorder absorbs every call, so the core code paths
//! never need to branch on whether metrics are enabled.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter, binding its scrape endpoint. No-op
/// installation is implicit: if this is never called, `metrics` macros
/// elsewhere in the crate simply drop their recordings.
pub fn install(bind_addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(bind_addr)
        .install()?;
    Ok(())
}

pub fn record_tokens(phase: &'static str, model: &str, count: u64) {
    metrics::counter!("primerl_tokens_total", "phase" => phase, "model" => model.to_string())
        .increment(count);
}

pub fn record_cache_hit(model: &str) {
    metrics::counter!("primerl_prefix_cache_hits_total", "model" => model.to_string()).increment(1);
}

pub fn record_cache_miss(model: &str) {
    metrics::counter!("primerl_prefix_cache_misses_total", "model" => model.to_string()).increment(1);
}

pub fn queue_depth_inc(model: &str) {
    metrics::gauge!("primerl_queue_depth", "model" => model.to_string()).increment(1.0);
}

pub fn queue_depth_dec(model: &str) {
    metrics::gauge!("primerl_queue_depth", "model" => model.to_string()).decrement(1.0);
}

pub fn set_kv_resident_bytes(model: &str, bytes: i64) {
    metrics::gauge!("primerl_kv_resident_bytes", "model" => model.to_string()).set(bytes as f64);
}

pub fn observe_latency(route: &'static str, model: &str, seconds: f64) {
    metrics::histogram!("primerl_request_latency_seconds", "route" => route, "model" => model.to_string())
        .record(seconds);
}

pub fn record_slo_violation(model: &str) {
    metrics::counter!("primerl_batch_slo_violations_total", "model" => model.to_string()).increment(1);
}
