//! Metrics module for invoice-engine.
//! Provides Prometheus metrics for generation runs and produced items.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter,
    register_int_counter_vec, Encoder, HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Raw usage read duration histogram
pub static USAGE_READ_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "invoice_usage_read_duration_seconds",
            "Raw usage read duration"
        ),
        &["store"]
    )
    .expect("Failed to register USAGE_READ_DURATION")
});

/// Generation runs counter
pub static GENERATION_RUNS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Generation duration histogram
pub static GENERATION_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Generated items counter by type
pub static ITEMS_GENERATED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Items excluded by the pruner
pub static PRUNED_ITEMS_TOTAL: OnceLock<IntCounter> = OnceLock::new();

/// Error counter for alerting
pub static ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    // Generation runs
    GENERATION_RUNS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "invoice_generation_runs_total",
                "Total generation runs by outcome"
            ),
            &["outcome"]
        )
        .expect("Failed to register GENERATION_RUNS_TOTAL")
    });

    // Generation duration
    GENERATION_DURATION.get_or_init(|| {
        register_histogram_vec!(
            histogram_opts!(
                "invoice_generation_duration_seconds",
                "Generation run duration",
                vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
            ),
            &["dry_run"]
        )
        .expect("Failed to register GENERATION_DURATION")
    });

    // Generated items
    ITEMS_GENERATED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "invoice_items_generated_total",
                "Total generated invoice items by type"
            ),
            &["item_type"]
        )
        .expect("Failed to register ITEMS_GENERATED_TOTAL")
    });

    // Pruned items
    PRUNED_ITEMS_TOTAL.get_or_init(|| {
        register_int_counter!(opts!(
            "invoice_pruned_items_total",
            "Existing items excluded as fully repaired"
        ))
        .expect("Failed to register PRUNED_ITEMS_TOTAL")
    });

    // Error counter for alerting
    ERRORS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("invoice_errors_total", "Total errors by type for alerting"),
            &["error_type"]
        )
        .expect("Failed to register ERRORS_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*USAGE_READ_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Failed to convert metrics to string")
}

/// Record a finished generation run.
pub fn record_generation_run(outcome: &str, dry_run: bool, duration_secs: f64) {
    if let Some(counter) = GENERATION_RUNS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
    if let Some(histogram) = GENERATION_DURATION.get() {
        let label = if dry_run { "true" } else { "false" };
        histogram.with_label_values(&[label]).observe(duration_secs);
    }
}

/// Record a generated item.
pub fn record_item_generated(item_type: &str) {
    if let Some(counter) = ITEMS_GENERATED_TOTAL.get() {
        counter.with_label_values(&[item_type]).inc();
    }
}

/// Record items excluded by the pruner.
pub fn record_pruned_items(count: usize) {
    if let Some(counter) = PRUNED_ITEMS_TOTAL.get() {
        counter.inc_by(count as u64);
    }
}

/// Record an error for alerting.
pub fn record_error(error_type: &str) {
    if let Some(counter) = ERRORS_TOTAL.get() {
        counter.with_label_values(&[error_type]).inc();
    }
}

/// Record a raw usage read.
pub fn record_usage_read_duration(store: &str, duration_secs: f64) {
    USAGE_READ_DURATION
        .with_label_values(&[store])
        .observe(duration_secs);
}
