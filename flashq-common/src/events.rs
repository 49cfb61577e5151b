//! Per-user event delivery
//!
//! The EventBus routes recommendation output to the live connection of the
//! user that owns the session. Unlike a broadcast bus every user has at most
//! one sink; a new registration replaces the previous one and the old
//! subscriber's stream ends.
//!
//! Delivery is best-effort: publishing never blocks. When the user has no
//! sink, the sink's queue is full, or the receiver is gone, the event is
//! dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::models::UserId;

/// Event names understood by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Sent once when a connection is registered
    Pong,
    /// Recommendation generation started
    Start,
    /// Accumulated recommendation text so far
    Delta,
    /// Recommendation finished; payload is the full text
    End,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Pong => "pong",
            EventKind::Start => "start",
            EventKind::Delta => "delta",
            EventKind::End => "end",
        }
    }
}

/// Event addressed to one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEvent {
    pub kind: EventKind,
    pub data: String,
}

impl UserEvent {
    pub fn new(kind: EventKind, data: impl Into<String>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }

    pub fn pong() -> Self {
        Self::new(EventKind::Pong, "pong")
    }

    pub fn start(session_id: uuid::Uuid) -> Self {
        Self::new(EventKind::Start, session_id.to_string())
    }

    pub fn delta(text_so_far: impl Into<String>) -> Self {
        Self::new(EventKind::Delta, text_so_far)
    }

    pub fn end(full_text: impl Into<String>) -> Self {
        Self::new(EventKind::End, full_text)
    }
}

/// Identifies one registration so a stale connection cannot remove its replacement
pub type SinkId = u64;

struct Sink {
    id: SinkId,
    tx: mpsc::Sender<UserEvent>,
}

/// Registry of live user connections
///
/// Cloning is cheap; all clones share the same registry.
///
/// # Examples
///
/// ```
/// use flashq_common::events::{EventBus, UserEvent};
///
/// let bus = EventBus::new(16);
/// let mut subscription = bus.register(7);
///
/// assert!(bus.publish(7, UserEvent::delta("partial")));
/// assert!(!bus.publish(8, UserEvent::delta("nobody listening")));
/// assert_eq!(subscription.try_recv().unwrap().data, "partial");
/// ```
#[derive(Clone)]
pub struct EventBus {
    sinks: Arc<RwLock<HashMap<UserId, Sink>>>,
    next_id: Arc<AtomicU64>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus
    ///
    /// `capacity` bounds every user's outbound queue; once full, further
    /// events for that user are dropped until the consumer catches up.
    pub fn new(capacity: usize) -> Self {
        Self {
            sinks: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            capacity: capacity.max(1),
        }
    }

    /// Register the live connection of `user_id`, replacing any previous one
    pub fn register(&self, user_id: UserId) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let replaced = {
            let mut sinks = self.sinks.write().unwrap_or_else(|e| e.into_inner());
            sinks.insert(user_id, Sink { id, tx }).is_some()
        };
        if replaced {
            debug!(user_id, sink_id = id, "Replaced existing event sink");
        } else {
            debug!(user_id, sink_id = id, "Registered event sink");
        }

        Subscription {
            user_id,
            sink_id: id,
            rx,
            bus: self.clone(),
        }
    }

    /// Remove the sink of `user_id` if it is still the one identified by `sink_id`
    ///
    /// Returns true when a sink was removed.
    pub fn unregister(&self, user_id: UserId, sink_id: SinkId) -> bool {
        let mut sinks = self.sinks.write().unwrap_or_else(|e| e.into_inner());
        match sinks.get(&user_id) {
            Some(sink) if sink.id == sink_id => {
                sinks.remove(&user_id);
                debug!(user_id, sink_id, "Unregistered event sink");
                true
            }
            _ => false,
        }
    }

    /// Deliver `event` to the user's sink without waiting
    ///
    /// Returns true when the event was queued.
    pub fn publish(&self, user_id: UserId, event: UserEvent) -> bool {
        let tx = {
            let sinks = self.sinks.read().unwrap_or_else(|e| e.into_inner());
            match sinks.get(&user_id) {
                Some(sink) => sink.tx.clone(),
                None => {
                    trace!(user_id, kind = event.kind.as_str(), "No sink, event dropped");
                    return false;
                }
            }
        };

        match tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                debug!(user_id, kind = event.kind.as_str(), "Sink queue full, event dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                debug!(user_id, kind = event.kind.as_str(), "Sink closed, event dropped");
                false
            }
        }
    }

    /// Whether `user_id` currently has a live sink
    pub fn is_registered(&self, user_id: UserId) -> bool {
        self.sinks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&user_id)
    }

    /// Number of live sinks
    pub fn connection_count(&self) -> usize {
        self.sinks.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Receiving end of one user registration
///
/// Dropping the subscription unregisters it (unless it was already replaced).
pub struct Subscription {
    user_id: UserId,
    sink_id: SinkId,
    rx: mpsc::Receiver<UserEvent>,
    bus: EventBus,
}

impl Subscription {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Wait for the next event
    ///
    /// Returns `None` once this registration has been replaced or removed and
    /// every queued event has been received.
    pub async fn recv(&mut self) -> Option<UserEvent> {
        self.rx.recv().await
    }

    /// Take the next queued event without waiting
    pub fn try_recv(&mut self) -> Option<UserEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unregister(self.user_id, self.sink_id);
    }
}
