//! In-memory conversation store
//!
//! Single-node implementation of the conversation contract for development
//! and tests. Turns append per `(user_id, session_id)`; history is never
//! rewritten.

use async_trait::async_trait;
use dashmap::DashMap;

use askfuze_core::{ConversationStore, Error, Turn};

#[derive(Default)]
pub struct InMemoryConversationStore {
    sessions: DashMap<(String, String), Vec<Turn>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn context(
        &self,
        user_id: &str,
        session_id: &str,
        max_pairs: usize,
    ) -> Result<Vec<Turn>, Error> {
        let key = (user_id.to_string(), session_id.to_string());
        let turns = self
            .sessions
            .get(&key)
            .map(|entry| {
                let turns = entry.value();
                let keep = max_pairs * 2;
                if turns.len() > keep {
                    turns[turns.len() - keep..].to_vec()
                } else {
                    turns.clone()
                }
            })
            .unwrap_or_default();
        Ok(turns)
    }

    async fn append(&self, user_id: &str, session_id: &str, turn: Turn) -> Result<(), Error> {
        let key = (user_id.to_string(), session_id.to_string());
        self.sessions.entry(key).or_default().push(turn);
        Ok(())
    }
}
