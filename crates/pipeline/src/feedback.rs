//! Answer feedback
//!
//! Thumbs up/down with an optional free-text reason, attached to a trace.
//! Idempotent per `(trace_id, user_id)`: a later submission overwrites the
//! earlier one. Scores are forwarded to the trace exporter append-only;
//! export failures are absorbed.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;

use askfuze_core::{Error, FeedbackRating, TraceExporter};

#[derive(Debug, Clone)]
pub struct FeedbackEntry {
    pub rating: FeedbackRating,
    pub comment: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Feedback registry keyed by `(trace_id, user_id)`
pub struct FeedbackStore {
    entries: DashMap<(String, String), FeedbackEntry>,
    exporter: Arc<dyn TraceExporter>,
}

impl FeedbackStore {
    pub fn new(exporter: Arc<dyn TraceExporter>) -> Self {
        Self {
            entries: DashMap::new(),
            exporter,
        }
    }

    /// Record feedback, overwriting any earlier entry for the same key
    pub async fn submit(
        &self,
        trace_id: &str,
        user_id: &str,
        rating: FeedbackRating,
        comment: Option<String>,
    ) -> Result<(), Error> {
        self.entries.insert(
            (trace_id.to_string(), user_id.to_string()),
            FeedbackEntry {
                rating,
                comment: comment.clone(),
                submitted_at: Utc::now(),
            },
        );

        if let Err(e) = self.exporter.score(trace_id, rating, comment).await {
            tracing::warn!(trace_id, error = %e, "Feedback export failed");
        }
        Ok(())
    }

    pub fn get(&self, trace_id: &str, user_id: &str) -> Option<FeedbackEntry> {
        self.entries
            .get(&(trace_id.to_string(), user_id.to_string()))
            .map(|e| e.clone())
    }
}
