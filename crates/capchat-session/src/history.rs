//! Conversation history shared by all sessions of a manager

use capchat_ai::{Role, WireMessage};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// One role-tagged message of the conversation. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }

    /// Convert to the outgoing `{role, content}` shape
    pub fn to_wire(&self) -> WireMessage {
        WireMessage::new(self.role, self.text.clone())
    }
}

/// Ordered record of completed exchanges.
///
/// Only grows by whole (user, assistant) pairs; turns are never edited or
/// removed individually.
#[derive(Debug, Default)]
pub struct ConversationHistory {
    turns: Mutex<Vec<ConversationTurn>>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed exchange. Both turns land under one lock.
    pub fn append(&self, user: ConversationTurn, assistant: ConversationTurn) {
        let mut turns = self.turns.lock();
        turns.push(user);
        turns.push(assistant);
    }

    /// Copy of the current turns, in insertion order
    pub fn snapshot(&self) -> Vec<ConversationTurn> {
        self.turns.lock().clone()
    }

    /// Forget every turn
    pub fn clear(&self) {
        self.turns.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.turns.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_append_keeps_pair_order() {
        let history = ConversationHistory::new();
        history.append(ConversationTurn::user("ping"), ConversationTurn::assistant("pong"));
        history.append(ConversationTurn::user("again"), ConversationTurn::assistant("pong 2"));

        let turns = history.snapshot();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0], ConversationTurn::user("ping"));
        assert_eq!(turns[1], ConversationTurn::assistant("pong"));
        assert_eq!(turns[2].text, "again");
        assert_eq!(turns[3].role, Role::Assistant);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let history = ConversationHistory::new();
        let before = history.snapshot();
        history.append(ConversationTurn::user("a"), ConversationTurn::assistant("b"));
        assert!(before.is_empty());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_clear() {
        let history = ConversationHistory::new();
        history.append(ConversationTurn::user("a"), ConversationTurn::assistant("b"));
        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn test_concurrent_appends_never_interleave() {
        let history = Arc::new(ConversationHistory::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let history = Arc::clone(&history);
                std::thread::spawn(move || {
                    for j in 0..50 {
                        history.append(
                            ConversationTurn::user(format!("{i}-{j}")),
                            ConversationTurn::assistant(format!("{i}-{j}")),
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let turns = history.snapshot();
        assert_eq!(turns.len(), 8 * 50 * 2);
        for pair in turns.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(pair[0].text, pair[1].text);
        }
    }

    #[test]
    fn test_to_wire() {
        let wire = ConversationTurn::assistant("hi").to_wire();
        assert_eq!(wire, WireMessage::assistant("hi"));
    }
}
