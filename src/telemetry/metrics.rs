//! Metric instrument factories for case-reconciler.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"case-reconciler"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for case-reconciler instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("case-reconciler")
}

/// Counter: work items offered to the queue.
/// Labels: `result` ("ok" | "duplicate").
pub fn work_enqueued() -> Counter<u64> {
    meter()
        .u64_counter("reconciler.work.enqueued")
        .with_description("Number of work items offered to the queue")
        .build()
}

/// Counter: work item state transitions.
/// Labels: `from`, `to`.
pub fn work_state_transitions() -> Counter<u64> {
    meter()
        .u64_counter("reconciler.work.state_transitions")
        .with_description("Number of work item state transitions")
        .build()
}

/// Counter: entities seen by discovery.
/// Labels: `outcome` ("candidate" | "reason_mismatch" | "active_marker").
pub fn discovery_entities() -> Counter<u64> {
    meter()
        .u64_counter("reconciler.discovery.entities")
        .with_description("Entities returned by the candidate query, by filter outcome")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("reconciler.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
