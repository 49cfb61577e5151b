//! Per-user event stream

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use flashq_common::sse::user_event_stream;
use futures::stream::Stream;
use std::convert::Infallible;

use crate::api::auth::AuthUser;
use crate::AppState;

/// GET /api/events
///
/// Registers the caller's live connection, replacing any earlier one, and
/// streams `pong`, `start`, `delta` and `end` events.
pub async fn event_stream(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.events.register(user_id);
    user_event_stream(subscription, state.shutdown.clone())
}
