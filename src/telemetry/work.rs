//! Work processing span helpers.
//!
//! Provides span creation and state-transition recording for work items
//! moving through a processing run.

use tracing::Span;

use crate::model::work::WorkItem;

/// Start a span covering one claimed work item.
///
/// The `work.state` field is declared empty and is filled in by
/// [`record_state_transition`].
pub fn start_work_span(item: &WorkItem) -> Span {
    tracing::info_span!(
        "work.process",
        "work.id" = %item.id,
        "work.reference" = %item.reference,
        "work.attempt" = item.attempts,
        "work.state" = tracing::field::Empty,
    )
}

/// Record a state transition on the span and emit it as an event.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.record("work.state", to);
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "state_transition");
    });
}
