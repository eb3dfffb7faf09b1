//! Session events and the sinks that receive them

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::session::Failure;

/// Opaque token identifying one in-flight request
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CorrelationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Events delivered to the consumer of a session.
///
/// Per correlation id: zero or more `Delta`s, then exactly one of
/// `Completed` or `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Reply text appended (never empty)
    Delta { id: CorrelationId, text: String },
    /// The reply is complete and recorded in the history
    Completed { id: CorrelationId },
    /// The session failed; nothing was recorded
    Failed { id: CorrelationId, failure: Failure },
}

impl ChatEvent {
    /// The session this event belongs to
    pub fn id(&self) -> &CorrelationId {
        match self {
            ChatEvent::Delta { id, .. } | ChatEvent::Completed { id } | ChatEvent::Failed { id, .. } => id,
        }
    }

    /// Event text: the delta, nothing on completion, the error description on failure
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            ChatEvent::Delta { text, .. } => Cow::Borrowed(text),
            ChatEvent::Completed { .. } => Cow::Borrowed(""),
            ChatEvent::Failed { failure, .. } => Cow::Owned(failure.to_string()),
        }
    }

    /// Check if this is a terminal event (Completed or Failed)
    pub fn is_done(&self) -> bool {
        matches!(self, ChatEvent::Completed { .. } | ChatEvent::Failed { .. })
    }
}

/// Receiver of session events.
///
/// Invoked from the session's background task; implementations must hand
/// events over to whatever context owns consumer state.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn on_event(&self, event: ChatEvent);
}

struct FnSink<F>(F);

#[async_trait]
impl<F> EventSink for FnSink<F>
where
    F: Fn(ChatEvent) + Send + Sync,
{
    async fn on_event(&self, event: ChatEvent) {
        (self.0)(event);
    }
}

/// Wrap a plain closure as a sink
pub fn callback_sink<F>(f: F) -> Arc<dyn EventSink>
where
    F: Fn(ChatEvent) + Send + Sync + 'static,
{
    Arc::new(FnSink(f))
}

/// Sink side of the consumer hand-off queue. Cheap to clone; one instance
/// can serve every session that reports to the same consumer.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<ChatEvent>,
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn on_event(&self, event: ChatEvent) {
        let id = event.id().clone();
        if self.tx.send(event).await.is_err() {
            tracing::warn!(correlation_id = %id, "Event consumer is gone, dropping event");
        }
    }
}

/// Consumer side of the hand-off queue. Events arrive in the order the
/// sessions produced them.
pub struct EventReceiver {
    rx: mpsc::Receiver<ChatEvent>,
}

impl EventReceiver {
    /// Wait for the next event; `None` once every sink is dropped
    pub async fn recv(&mut self) -> Option<ChatEvent> {
        self.rx.recv().await
    }

    /// Take an event if one is already queued
    pub fn try_recv(&mut self) -> Option<ChatEvent> {
        self.rx.try_recv().ok()
    }
}

/// Create a bounded hand-off queue. Producers wait while it is full.
pub fn event_channel(capacity: usize) -> (ChannelSink, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChannelSink { tx }, EventReceiver { rx })
}
