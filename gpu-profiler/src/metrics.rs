//! Prometheus metrics for counter sampling and trace flushing

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram, CounterVec, GaugeVec,
    Histogram,
};

// ── Counter sampling ─────────────────────────────────────────────────────────

pub static GPU_PERFORMANCE_COUNTER: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "lumen_gpu_performance_counter",
        "Aggregated hardware performance counter value",
        &["card", "name"]
    )
    .unwrap()
});

// ── Trace flushing ───────────────────────────────────────────────────────────

pub static TRACE_FLUSH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "lumen_trace_flush_total",
        "Kernel trace flush attempts",
        &["status"]
    )
    .unwrap()
});

pub static TRACE_RECORDS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "lumen_trace_records_total",
        "Kernel dispatch records handed to the sink",
        &["status"]
    )
    .unwrap()
});

pub static TRACE_FLUSH_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "lumen_trace_flush_duration_seconds",
        "Kernel trace sink latency",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .unwrap()
});

/// Record one finished flush attempt
pub(crate) fn observe_flush(records: usize, ok: bool, seconds: f64) {
    let status = if ok { "ok" } else { "error" };
    TRACE_FLUSH_TOTAL.with_label_values(&[status]).inc();
    TRACE_RECORDS_TOTAL
        .with_label_values(&[status])
        .inc_by(records as f64);
    TRACE_FLUSH_DURATION.observe(seconds);
}
