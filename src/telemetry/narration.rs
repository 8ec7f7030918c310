//! Narration span helpers.
//!
//! One span per narration, from the moment it goes on screen until it
//! ends or is preempted.

use tracing::Span;

use crate::model::NormalizedEvent;

/// Start a span for one narration.
///
/// The `narration.outcome` field is declared empty and filled by
/// [`record_outcome`].
pub fn start_narration_span(event: &NormalizedEvent) -> Span {
    tracing::info_span!(
        "narration",
        "narration.event_id" = %event.id,
        "narration.kind" = %event.kind,
        "narration.priority" = event.priority,
        "narration.presenter_state" = %event.kind.presenter_state(),
        "narration.outcome" = tracing::field::Empty,
    )
}

/// Record a presenter transition as an event scoped to the span.
pub fn record_presenter_transition(span: &Span, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "presenter_transition");
    });
}

/// Record how the narration ended ("completed" | "preempted").
pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("narration.outcome", outcome);
}
