//! Metric hooks for the worker.
//!
//! With the `metrics` feature the hooks record into OpenTelemetry instruments
//! registered by [`init_metric_handles`]; the embedding binary owns the meter
//! provider. Without the feature every hook compiles to a no-op.

#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(feature = "metrics")]
static TASKS_DEQUEUED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static DUPLICATES_SUPPRESSED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static GENERATIONS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static GENERATION_ERRORS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static GENERATION_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static PENDING_FOUND: OnceLock<Histogram<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static ACTIVE_SUBSCRIBERS: OnceLock<Gauge<u64>> = OnceLock::new();

#[cfg(feature = "metrics")]
pub fn init_metric_handles(meter: &Meter) {
    let _ = TASKS_DEQUEUED.set(
        meter
            .u64_counter("tasks_dequeued")
            .with_description("Tasks taken off the queue by dispatchers")
            .build(),
    );

    let _ = DUPLICATES_SUPPRESSED.set(
        meter
            .u64_counter("duplicates_suppressed")
            .with_description("Tasks dropped by the in-flight guard")
            .build(),
    );

    let _ = GENERATIONS.set(
        meter
            .u64_counter("generations")
            .with_description("Entries generated and persisted")
            .build(),
    );

    let _ = GENERATION_ERRORS.set(
        meter
            .u64_counter("generation_errors")
            .with_description("Backend or store failures during a dispatcher pass")
            .build(),
    );

    let _ = GENERATION_DURATION_MS.set(
        meter
            .f64_histogram("generation_duration")
            .with_unit("ms")
            .with_description("Backend call duration")
            .build(),
    );

    let _ = PENDING_FOUND.set(
        meter
            .u64_histogram("pending_found")
            .with_description("Pending items found per scanner pass")
            .build(),
    );

    let _ = ACTIVE_SUBSCRIBERS.set(
        meter
            .u64_gauge("active_subscribers")
            .with_description("Connected event subscribers")
            .build(),
    );
}

#[cfg(feature = "metrics")]
pub fn increment_tasks_dequeued() {
    if let Some(counter) = TASKS_DEQUEUED.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_tasks_dequeued() {}

#[cfg(feature = "metrics")]
pub fn increment_duplicates_suppressed() {
    if let Some(counter) = DUPLICATES_SUPPRESSED.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_duplicates_suppressed() {}

#[cfg(feature = "metrics")]
pub fn increment_generations() {
    if let Some(counter) = GENERATIONS.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_generations() {}

#[cfg(feature = "metrics")]
pub fn increment_generation_errors() {
    if let Some(counter) = GENERATION_ERRORS.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_generation_errors() {}

#[cfg(feature = "metrics")]
pub fn record_generation_duration(duration_ms: f64) {
    if let Some(histogram) = GENERATION_DURATION_MS.get() {
        histogram.record(duration_ms, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_generation_duration(_duration_ms: f64) {}

#[cfg(feature = "metrics")]
pub fn record_pending_found(count: usize) {
    if let Some(histogram) = PENDING_FOUND.get() {
        histogram.record(count as u64, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_pending_found(_count: usize) {}

#[cfg(feature = "metrics")]
pub fn record_active_subscribers(count: usize) {
    if let Some(gauge) = ACTIVE_SUBSCRIBERS.get() {
        gauge.record(count as u64, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_active_subscribers(_count: usize) {}
