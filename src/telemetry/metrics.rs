//! Metric instruments.
//!
//! Created from the `"mailq"` meter on the globally registered provider, so
//! they are no-ops until [`super::init_telemetry`] installs an exporter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("mailq")
}

/// Counter: submissions offered to the dispatcher.
/// Labels: `result` ("accepted" | "invalid" | "queue_full" | "closed").
pub fn messages_submitted() -> Counter<u64> {
    meter()
        .u64_counter("mailq.dispatch.submitted")
        .with_description("Messages offered to the dispatcher")
        .build()
}

/// Counter: submissions that reached a terminal state.
/// Labels: `outcome` ("completed" | "failed").
pub fn messages_finished() -> Counter<u64> {
    meter()
        .u64_counter("mailq.dispatch.finished")
        .with_description("Messages that completed or failed")
        .build()
}

/// Histogram: time a worker spent executing one message.
pub fn execution_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("mailq.dispatch.execution_ms")
        .with_description("Per-message execution time in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: record store calls.
/// Labels: `operation` ("save" | "lookup").
pub fn record_operations() -> Counter<u64> {
    meter()
        .u64_counter("mailq.records.operations")
        .with_description("Number of record store operations")
        .build()
}
