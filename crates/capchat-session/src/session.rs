//! One request/response cycle against the chat-completions transport

use std::sync::Arc;

use capchat_ai::{ChatRequest, Frame, StreamFrameDecoder, Transport, WireMessage};
use futures::StreamExt;
use thiserror::Error;

use crate::events::{ChatEvent, CorrelationId};
use crate::history::{ConversationHistory, ConversationTurn};
use crate::manager::SessionConfig;
use crate::registry::SessionRegistry;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatSessionState {
    /// Built, waiting for the response headers
    Pending,
    /// Receiving and forwarding deltas
    Streaming,
    /// Termination token seen, history updated
    Completed,
    /// Transport, status or stream error; history untouched
    Failed,
}

impl ChatSessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatSessionState::Completed | ChatSessionState::Failed)
    }
}

/// Why a session failed. The `Display` text is what the consumer sees.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// Connection, DNS, TLS or timeout before a response arrived
    #[error("Request failed: {0}")]
    Transport(String),

    /// Non-success HTTP status
    #[error("API request failed: {status} - {body}")]
    Status { status: u16, body: String },

    /// The body ended (or broke) before the termination token
    #[error("{}", premature_end_text(.partial, .cause.as_deref()))]
    PrematureEnd {
        partial: String,
        cause: Option<String>,
    },

    /// A bug inside the session (e.g. a panic)
    #[error("Internal error: {0}")]
    Internal(String),
}

fn premature_end_text(partial: &str, cause: Option<&str>) -> String {
    let mut text = String::from("Stream ended before completion");
    if let Some(cause) = cause {
        text.push_str(&format!(" ({})", cause));
    }
    if !partial.is_empty() {
        text.push_str(&format!(". Partial reply: {}", partial));
    }
    text
}

impl From<capchat_ai::Error> for Failure {
    fn from(e: capchat_ai::Error) -> Self {
        match e {
            capchat_ai::Error::Api { status, body } => Failure::Status { status, body },
            other => Failure::Transport(other.to_string()),
        }
    }
}

/// Final result of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed { reply: String },
    Failed(Failure),
}

/// Prefix the user message with a delimited context section, if any.
///
/// Blank context counts as none.
pub fn compose_message(message: &str, context: Option<&str>) -> String {
    match context.map(str::trim) {
        Some(context) if !context.is_empty() => {
            format!("Context:\n{}\n\nQuestion:\n{}", context, message)
        }
        _ => message.to_string(),
    }
}

/// Drives one exchange: compose, send, decode, forward, commit.
///
/// The session must be registered in `registry` under its id before
/// [`run`](Self::run) is called; every event it produces is routed there.
pub struct ChatSession {
    id: CorrelationId,
    message: String,
    context: Option<String>,
    state: ChatSessionState,
    outcome: Option<SessionOutcome>,
    config: Arc<SessionConfig>,
    transport: Arc<dyn Transport>,
    history: Arc<ConversationHistory>,
    registry: Arc<SessionRegistry>,
}

impl ChatSession {
    pub fn new(
        id: CorrelationId,
        message: impl Into<String>,
        context: Option<String>,
        config: Arc<SessionConfig>,
        transport: Arc<dyn Transport>,
        history: Arc<ConversationHistory>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            id,
            message: message.into(),
            context,
            state: ChatSessionState::Pending,
            outcome: None,
            config,
            transport,
            history,
            registry,
        }
    }

    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    pub fn state(&self) -> ChatSessionState {
        self.state
    }

    /// Build the outgoing request: system turn, history, new user turn
    pub fn build_request(&self, user_message: &str) -> ChatRequest {
        let history = self.history.snapshot();
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(WireMessage::system(self.config.system_prompt.clone()));
        messages.extend(history.iter().map(ConversationTurn::to_wire));
        messages.push(WireMessage::user(user_message));

        ChatRequest::streaming(&self.config.settings, messages)
    }

    /// Run the exchange to its end and deliver the terminal event.
    ///
    /// Calling this again after the session finished returns the same
    /// outcome without contacting the transport or delivering anything.
    pub async fn run(&mut self) -> SessionOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }

        let user_message = compose_message(&self.message, self.context.as_deref());

        let outcome = match self.exchange(&user_message).await {
            Ok(reply) => {
                self.history.append(
                    ConversationTurn::user(user_message),
                    ConversationTurn::assistant(reply.clone()),
                );
                self.transition(ChatSessionState::Completed);
                tracing::info!(
                    correlation_id = %self.id,
                    reply_chars = reply.chars().count(),
                    "Session completed"
                );
                SessionOutcome::Completed { reply }
            }
            Err(failure) => {
                self.transition(ChatSessionState::Failed);
                tracing::error!(correlation_id = %self.id, "Session failed: {}", failure);
                SessionOutcome::Failed(failure)
            }
        };

        let terminal = match &outcome {
            SessionOutcome::Completed { .. } => ChatEvent::Completed {
                id: self.id.clone(),
            },
            SessionOutcome::Failed(failure) => ChatEvent::Failed {
                id: self.id.clone(),
                failure: failure.clone(),
            },
        };
        self.registry.deliver(terminal).await;

        self.outcome = Some(outcome.clone());
        outcome
    }

    async fn exchange(&mut self, user_message: &str) -> Result<String, Failure> {
        let request = self.build_request(user_message);

        let response = self.transport.send(&request).await?;
        if !response.is_success() {
            let status = response.status;
            let body = response.text().await;
            return Err(Failure::Status { status, body });
        }

        self.transition(ChatSessionState::Streaming);

        let mut decoder = StreamFrameDecoder::new();
        let mut reply = String::new();
        let mut body = response.body;

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    return Err(Failure::PrematureEnd {
                        partial: reply,
                        cause: Some(e.to_string()),
                    });
                }
            };
            tracing::trace!(correlation_id = %self.id, bytes = chunk.len(), "Received chunk");

            if self.forward(decoder.feed(&chunk), &mut reply).await {
                return Ok(reply);
            }
        }

        if self.forward(decoder.finish(), &mut reply).await {
            return Ok(reply);
        }

        Err(Failure::PrematureEnd {
            partial: reply,
            cause: None,
        })
    }

    /// Forward decoded frames in order. Returns true once the termination
    /// token has been seen.
    async fn forward(&self, frames: Vec<Frame>, reply: &mut String) -> bool {
        for frame in frames {
            match frame {
                Frame::ContentDelta(text) => {
                    reply.push_str(&text);
                    self.registry
                        .deliver(ChatEvent::Delta {
                            id: self.id.clone(),
                            text,
                        })
                        .await;
                }
                Frame::DoneMarker => {
                    tracing::debug!(correlation_id = %self.id, "Termination token received");
                    return true;
                }
                Frame::MalformedPayload(_) => {
                    tracing::debug!(correlation_id = %self.id, "Malformed frame skipped");
                }
            }
        }
        false
    }

    fn transition(&mut self, next: ChatSessionState) {
        if self.state.is_terminal() {
            return;
        }
        tracing::debug!(correlation_id = %self.id, from = ?self.state, to = ?next, "Session state change");
        self.state = next;
    }
}
