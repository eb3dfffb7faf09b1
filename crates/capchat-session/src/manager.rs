//! Session manager: owns the shared state and runs sessions in the background

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use capchat_ai::{GenerationSettings, Transport};
use futures::FutureExt;
use tokio::sync::Semaphore;

use crate::error::{Error, Result};
use crate::events::{ChatEvent, CorrelationId, EventSink};
use crate::history::{ConversationHistory, ConversationTurn};
use crate::registry::SessionRegistry;
use crate::session::{ChatSession, Failure};

/// System instruction sent as the first turn of every request
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are the assistant built into a packet capture analysis tool. Your job is to \
help the user use the tool and understand its results.

You can:
1. Explain the capture statistics the tool produces: packet counts and total \
traffic, protocol distribution (TCP/UDP), source and destination addresses, \
and port usage.
2. Guide the user: help them read the results, explain what each statistic \
means, and describe what specific protocols or ports are used for.
3. Answer questions about a loaded capture: interpret the statistics given as \
context, point out traffic patterns and explain anomalies.

Only answer questions related to the tool and its results; steer unrelated \
questions back to what the tool can do. Keep answers concise, professional and \
practical.";

/// Configuration shared by every session of a manager
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// System instruction
    pub system_prompt: String,
    /// Model, temperature and output length
    pub settings: GenerationSettings,
    /// Upper bound on sessions talking to the transport at once.
    /// Sessions beyond it wait for a slot. `None` means unbounded.
    pub max_concurrent_sessions: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            settings: GenerationSettings::default(),
            max_concurrent_sessions: None,
        }
    }
}

/// Starts sessions and owns what they share: transport, history and registry.
///
/// Construct one per conversation and pass it to whatever issues requests.
pub struct SessionManager {
    config: Arc<SessionConfig>,
    transport: Arc<dyn Transport>,
    history: Arc<ConversationHistory>,
    registry: Arc<SessionRegistry>,
    permits: Option<Arc<Semaphore>>,
}

impl SessionManager {
    /// Create a new manager
    pub fn new(config: SessionConfig, transport: Arc<dyn Transport>) -> Self {
        let permits = config
            .max_concurrent_sessions
            .map(|n| Arc::new(Semaphore::new(n.max(1))));
        Self {
            config: Arc::new(config),
            transport,
            history: Arc::new(ConversationHistory::new()),
            registry: Arc::new(SessionRegistry::new()),
            permits,
        }
    }

    /// Get the session config
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start a session on a background task and return immediately.
    ///
    /// All results, including failures of the request, arrive at `sink`
    /// tagged with `id`. Errors here mean the session was never started.
    pub fn start(
        &self,
        message: impl Into<String>,
        context: Option<String>,
        id: CorrelationId,
        sink: Arc<dyn EventSink>,
    ) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;

        self.registry.register(id.clone(), sink)?;

        let session = ChatSession::new(
            id.clone(),
            message,
            context,
            Arc::clone(&self.config),
            Arc::clone(&self.transport),
            Arc::clone(&self.history),
            Arc::clone(&self.registry),
        );

        tracing::debug!(correlation_id = %id, "Starting session");
        runtime.spawn(run_guarded(
            session,
            Arc::clone(&self.registry),
            self.permits.clone(),
        ));

        Ok(())
    }

    /// Start a session under a freshly generated correlation id
    pub fn start_new(
        &self,
        message: impl Into<String>,
        context: Option<String>,
        sink: Arc<dyn EventSink>,
    ) -> Result<CorrelationId> {
        let id = CorrelationId::generate();
        self.start(message, context, id.clone(), sink)?;
        Ok(id)
    }

    /// Forget the conversation so far. Sessions already running are not
    /// affected and still record their exchange when they complete.
    pub fn clear_history(&self) {
        self.history.clear();
        tracing::info!("Conversation history cleared");
    }

    /// Copy of the conversation so far
    pub fn history(&self) -> Vec<ConversationTurn> {
        self.history.snapshot()
    }

    /// Whether a session with this id is still open
    pub fn is_active(&self, id: &CorrelationId) -> bool {
        self.registry.is_active(id)
    }

    /// Number of open sessions
    pub fn active_sessions(&self) -> usize {
        self.registry.active_count()
    }
}

/// Run a session so that nothing escapes the task and the id always retires
async fn run_guarded(
    mut session: ChatSession,
    registry: Arc<SessionRegistry>,
    permits: Option<Arc<Semaphore>>,
) {
    let id = session.id().clone();

    let _permit = match permits {
        Some(semaphore) => semaphore.acquire_owned().await.ok(),
        None => None,
    };

    if let Err(panic) = AssertUnwindSafe(session.run()).catch_unwind().await {
        let message = panic_message(panic.as_ref());
        tracing::error!(correlation_id = %id, "Session panicked: {}", message);
        registry
            .deliver(ChatEvent::Failed {
                id,
                failure: Failure::Internal(message),
            })
            .await;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "session task panicked".to_string()
    }
}
