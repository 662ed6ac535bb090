//! Metric instrument factories for discourse-unsubscriber.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without an OTLP endpoint the global provider is a no-op.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for discourse-unsubscriber instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("discourse-unsubscriber")
}

/// Counter: queue-level operations.
/// Labels: `queue` ("work" | "status"), `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("unsubscriber.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: remote unsubscribe attempts.
/// Labels: `result` ("ok" | "error").
pub fn unsubscribe_attempts() -> Counter<u64> {
    meter()
        .u64_counter("unsubscriber.unsubscribe.attempts")
        .with_description("Number of remote unsubscribe attempts")
        .build()
}

/// Histogram: time from dequeue to acknowledgement, in milliseconds.
pub fn unsubscribe_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("unsubscriber.unsubscribe.duration_ms")
        .with_description("Time spent handling one unsubscribe target")
        .with_unit("ms")
        .build()
}
