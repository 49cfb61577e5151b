//! Server-Sent Events (SSE) utilities
//!
//! Turns a per-user [`Subscription`] into an axum SSE response.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::events::{Subscription, UserEvent};

/// Interval of keep-alive comments on idle connections
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Convert a user event into an SSE frame
pub fn to_sse_event(event: &UserEvent) -> Event {
    Event::default().event(event.kind.as_str()).data(&event.data)
}

/// Stream the events of one subscription until the client disconnects,
/// the registration is replaced, or `shutdown` fires
///
/// A `pong` event is sent first so the client knows the registration is live.
pub fn user_event_stream(
    mut subscription: Subscription,
    shutdown: CancellationToken,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let user_id = subscription.user_id();
    info!(user_id, "SSE client connected");

    let stream = async_stream::stream! {
        yield Ok(to_sse_event(&UserEvent::pong()));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(user_id, "SSE: shutting down event stream");
                    break;
                }
                next = subscription.recv() => {
                    match next {
                        Some(event) => {
                            debug!(user_id, kind = event.kind.as_str(), "SSE: forwarding event");
                            yield Ok(to_sse_event(&event));
                        }
                        None => {
                            debug!(user_id, "SSE: registration replaced, closing stream");
                            break;
                        }
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
