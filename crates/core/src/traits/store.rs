//! Conversation store and trace exporter contracts

use async_trait::async_trait;

use crate::conversation::Turn;
use crate::error::Result;
use crate::trace::{FeedbackRating, RequestTrace};

/// Per-session conversation history
///
/// Append-only per `(user_id, session_id)`; historical turns are never
/// mutated. Writes are keyed by user so there is no cross-user contention.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Most recent turns for a session, oldest first, at most
    /// `max_pairs` user/assistant pairs
    async fn context(&self, user_id: &str, session_id: &str, max_pairs: usize)
        -> Result<Vec<Turn>>;

    async fn append(&self, user_id: &str, session_id: &str, turn: Turn) -> Result<()>;
}

/// Trace and feedback export
///
/// Export runs fire-and-forget; a failing exporter must never fail the
/// user request.
#[async_trait]
pub trait TraceExporter: Send + Sync {
    async fn export(&self, trace: &RequestTrace) -> Result<()>;

    /// Attach user feedback to a previously exported trace
    async fn score(
        &self,
        trace_id: &str,
        rating: FeedbackRating,
        comment: Option<String>,
    ) -> Result<()>;
}
