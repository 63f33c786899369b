//! Conversation turns
//!
//! Turns are owned by an external store; the retriever appends but never
//! mutates history. Turns are kept in an ordered sequence keyed by
//! `(user_id, session_id)` - no parent/child links between turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of the speaker in a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }

    /// Display label used when serializing a conversation window
    pub fn label(&self) -> &'static str {
        match self {
            TurnRole::User => "User",
            TurnRole::Assistant => "Assistant",
        }
    }
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single turn in a conversation, ordered by timestamp within a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_labels() {
        assert_eq!(TurnRole::User.label(), "User");
        assert_eq!(TurnRole::Assistant.as_str(), "assistant");
    }

    #[test]
    fn test_turn_constructors() {
        let turn = Turn::user("hello");
        assert_eq!(turn.role, TurnRole::User);
        assert_eq!(turn.content, "hello");
    }
}
