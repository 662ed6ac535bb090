//! Unsubscribe span helpers.
//!
//! One span covers a target from dequeue to acknowledgement; every attempt
//! is recorded as an event inside it.

use tracing::Span;

/// Start a span for handling one unsubscribe target.
///
/// The `unsubscribe.attempts` field is declared empty and is filled in by
/// [`record_attempt`].
pub fn start_unsubscribe_span(target: &str) -> Span {
    tracing::info_span!(
        "unsubscribe",
        "unsubscribe.target" = target,
        "unsubscribe.attempts" = tracing::field::Empty,
    )
}

/// Record the outcome of one attempt on the given span.
///
/// `error` is `None` for a successful attempt.
pub fn record_attempt(span: &Span, attempt: u32, error: Option<&dyn std::fmt::Display>) {
    span.record("unsubscribe.attempts", attempt);
    span.in_scope(|| match error {
        None => tracing::info!(attempt, "unsubscribe succeeded"),
        Some(error) => tracing::warn!(attempt, %error, "unsubscribe failed"),
    });
}
