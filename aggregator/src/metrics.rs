//! Prometheus metrics for the aggregator service

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Encoder, Gauge, Histogram, TextEncoder,
};

// ── Ingest requests ──────────────────────────────────────────────────────────

pub static INGEST_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "lumen_kernel_trace_requests_total",
        "Kernel trace batches received",
        &["status"]
    )
    .unwrap()
});

pub static INGEST_EVENTS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "lumen_kernel_trace_events_total",
        "Kernel dispatch events ingested"
    )
    .unwrap()
});

pub static INGEST_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "lumen_kernel_trace_request_duration_seconds",
        "Kernel trace request handling latency",
        vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap()
});

pub static LAST_INGEST_TIMESTAMP: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "lumen_kernel_trace_last_ingest_timestamp_seconds",
        "Unix time of the last accepted kernel trace batch"
    )
    .unwrap()
});

// ── Per-kernel statistics ────────────────────────────────────────────────────

pub static KERNEL_DISPATCH_COUNT: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "lumen_kernel_dispatch_count",
        "Kernel dispatches observed per card",
        &["card", "kernel"]
    )
    .unwrap()
});

pub static KERNEL_TOTAL_DURATION_NS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "lumen_kernel_total_duration_ns",
        "Summed kernel execution time in nanoseconds per card",
        &["card", "kernel"]
    )
    .unwrap()
});

/// Render all registered metrics to Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
