//! Span helpers for relay operations
//!
//! Pre-configured spans so every log line emitted inside a session carries the
//! same identifying fields.

use tracing::Span;

/// Create a span covering one relay session, from resolve to teardown.
///
/// # Example
/// ```
/// use riffkit_telemetry::session_span;
/// let span = session_span("5f0c", "!room:example.org");
/// let _enter = span.enter();
/// ```
pub fn session_span(session_id: &str, room_id: &str) -> Span {
    tracing::info_span!("relay.session", session.id = session_id, room.id = room_id)
}

/// Create a span for resolving a user-supplied reference.
pub fn resolve_span(reference: &str) -> Span {
    tracing::debug_span!("relay.resolve", reference = reference)
}

/// Create a span for one external pipeline stage.
pub fn pipeline_stage_span(stage: &str, program: &str) -> Span {
    tracing::debug_span!("relay.stage", stage = stage, program = program)
}
