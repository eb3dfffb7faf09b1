//! capchat-session: streaming conversation engine
//!
//! This crate runs request/response cycles against the chat-completions
//! transport on background tasks, correlates every streamed delta with the
//! request that produced it, and keeps the shared conversation history.

pub mod error;
pub mod events;
pub mod history;
pub mod manager;
pub mod registry;
pub mod session;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use events::{ChannelSink, ChatEvent, CorrelationId, EventReceiver, EventSink, callback_sink, event_channel};
pub use history::{ConversationHistory, ConversationTurn};
pub use manager::{DEFAULT_SYSTEM_PROMPT, SessionConfig, SessionManager};
pub use registry::{Delivery, SessionRegistry};
pub use session::{ChatSession, ChatSessionState, Failure, SessionOutcome};
