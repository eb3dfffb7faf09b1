//! Routing of session events to the sink registered for their correlation id

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::events::{ChatEvent, CorrelationId, EventSink};

/// What happened to a delivered event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Forwarded to the registered sink
    Delivered,
    /// Forwarded as the terminal event; the id is no longer registered
    Retired,
    /// No sink registered for the id (unknown or already retired)
    Dropped,
}

/// Maps correlation ids of open sessions to their sinks.
///
/// An id is registered from the moment its session is started until its
/// terminal event has been routed, and never longer.
#[derive(Default)]
pub struct SessionRegistry {
    entries: Mutex<HashMap<CorrelationId, Arc<dyn EventSink>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the sink for a new session
    pub fn register(&self, id: CorrelationId, sink: Arc<dyn EventSink>) -> Result<()> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&id) {
            return Err(Error::DuplicateCorrelationId(id.to_string()));
        }
        entries.insert(id, sink);
        Ok(())
    }

    /// Route an event to the sink registered for its id.
    ///
    /// A terminal event takes the entry out under the lock before the sink
    /// runs, so of two racing terminal deliveries exactly one reaches the
    /// sink. Unknown ids are logged and dropped. The lock is never held while
    /// the sink runs.
    pub async fn deliver(&self, event: ChatEvent) -> Delivery {
        let done = event.is_done();
        let sink = {
            let mut entries = self.entries.lock();
            if done {
                entries.remove(event.id())
            } else {
                entries.get(event.id()).cloned()
            }
        };

        let Some(sink) = sink else {
            tracing::warn!(
                correlation_id = %event.id(),
                done,
                "Routing anomaly: no session registered for event, dropping"
            );
            return Delivery::Dropped;
        };

        sink.on_event(event).await;

        if done {
            Delivery::Retired
        } else {
            Delivery::Delivered
        }
    }

    /// Whether a session with this id is still open
    pub fn is_active(&self, id: &CorrelationId) -> bool {
        self.entries.lock().contains_key(id)
    }

    /// Number of open sessions
    pub fn active_count(&self) -> usize {
        self.entries.lock().len()
    }
}
