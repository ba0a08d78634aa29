//! Span helpers for a message moving through a worker.

use tracing::Span;

use crate::model::{Message, State};

/// Start the span covering one message's execution on `worker_id`.
///
/// `delivery.state` starts empty and is filled by [`record_state_transition`].
pub fn start_delivery_span(worker_id: usize, message: &Message) -> Span {
    tracing::info_span!(
        "delivery.execute",
        "delivery.worker" = worker_id,
        "delivery.message" = %message,
        "delivery.state" = tracing::field::Empty,
    )
}

/// Emit a transition event inside `span` and record the new state on it.
pub fn record_state_transition(span: &Span, from: State, to: State) {
    debug_assert!(from.can_transition_to(to), "illegal transition {from} -> {to}");
    span.record("delivery.state", tracing::field::display(to));
    span.in_scope(|| {
        tracing::debug!(%from, %to, "state_transition");
    });
}
