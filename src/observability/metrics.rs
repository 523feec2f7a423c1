//! Metrics collection and exposition.
//!
//! # Metrics
//! - `engine_queries_total` (counter): queries by kind and status
//! - `engine_query_duration_seconds` (histogram): latency by kind
//! - `engine_active_queries` (gauge): in-flight queries on the shared gate
//! - `engine_generation_swaps_total` (counter): generations installed
//! - `engine_current_generation` (gauge): id of the current generation
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until an
//!   exporter is installed, so tests need no setup

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

use crate::dataset::GenerationId;
use crate::engine::Status;

/// Install the Prometheus exporter on `addr`. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_query(kind: &'static str, status: Status, start: Instant) {
    counter!("engine_queries_total", "kind" => kind, "status" => status.as_str()).increment(1);
    histogram!("engine_query_duration_seconds", "kind" => kind)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_active_queries(active: u64) {
    gauge!("engine_active_queries").set(active as f64);
}

pub fn record_generation_swap(generation: GenerationId) {
    counter!("engine_generation_swaps_total").increment(1);
    set_current_generation(generation);
}

pub fn set_current_generation(generation: GenerationId) {
    gauge!("engine_current_generation").set(generation.get() as f64);
}
