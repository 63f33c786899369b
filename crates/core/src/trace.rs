//! Per-request trace types
//!
//! A trace is a span tree rooted at the request with one child span per
//! pipeline stage. Retrieval spans additionally carry per-candidate scores
//! and boost reasons so an answer can be audited offline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::query::DetectedTerm;
use crate::retrieval::Candidate;

/// Terminal status of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    Completed,
    Cancelled,
    Failed,
}

/// User feedback rating on an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackRating {
    Up,
    Down,
}

/// Per-candidate scores recorded in a retrieval span
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateTrace {
    pub chunk_id: String,
    pub dense_score: Option<f32>,
    pub sparse_score: Option<f32>,
    pub rerank_score: Option<f32>,
    pub boost: f32,
    pub final_score: f32,
    pub reasons: Vec<String>,
}

impl From<&Candidate> for CandidateTrace {
    fn from(c: &Candidate) -> Self {
        Self {
            chunk_id: c.chunk_id.clone(),
            dense_score: c.dense_score,
            sparse_score: c.sparse_score,
            rerank_score: c.rerank_score,
            boost: c.boost,
            final_score: c.final_score,
            reasons: c.reasons.clone(),
        }
    }
}

/// One stage of the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub input_summary: String,
    pub output_summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<CandidateTrace>,
}

impl Span {
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }
}

/// The full per-request observability record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTrace {
    pub trace_id: String,
    pub user_id: String,
    pub session_id: String,
    pub question: String,
    pub prepared_question: String,
    pub detected_terms: Vec<DetectedTerm>,
    pub spans: Vec<Span>,
    /// Compiled prompt, concatenated form
    pub prompt: String,
    pub answer: String,
    pub refused: bool,
    pub rerank_failed: bool,
    pub status: TraceStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl RequestTrace {
    pub fn latency_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }

    pub fn span(&self, name: &str) -> Option<&Span> {
        self.spans.iter().find(|s| s.name == name)
    }
}
