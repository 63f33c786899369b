//! The AskFuze answer pipeline
//!
//! Wires query preparation, hybrid retrieval, context assembly, prompt
//! compilation and streaming generation into a single per-request flow,
//! recording a trace span per stage. Control is single-threaded per
//! request; concurrent requests interleave at the await points.

pub mod assemble;
pub mod conversation;
pub mod engine;
pub mod export;
pub mod feedback;
pub mod prepare;
pub mod registry;
pub mod trace;

pub use assemble::{assemble_context, dedup_candidates, AssembledContext};
pub use conversation::InMemoryConversationStore;
pub use engine::{AnswerPipeline, AskOutcome, GenerationMode};
pub use export::{HttpTraceExporter, NoopTraceExporter, TraceExporterConfig};
pub use feedback::FeedbackStore;
pub use prepare::{gate_context, prepare_question, serialize_window};
pub use registry::Registry;
pub use trace::TraceRecorder;

use thiserror::Error;

/// Pipeline errors surfaced to the HTTP layer
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Upstream unavailable: {0}")]
    Upstream(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Request deadline exceeded")]
    Deadline,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<askfuze_core::Error> for PipelineError {
    fn from(err: askfuze_core::Error) -> Self {
        match err {
            askfuze_core::Error::RateLimited(msg) => PipelineError::RateLimited(msg),
            askfuze_core::Error::Unavailable(msg) | askfuze_core::Error::Timeout(msg) => {
                PipelineError::Upstream(msg)
            }
            other => PipelineError::Internal(other.to_string()),
        }
    }
}

impl PipelineError {
    /// Message safe to show a user: no internal identifiers, tags or
    /// stack frames
    pub fn user_message(&self) -> &'static str {
        match self {
            PipelineError::Upstream(_) => {
                "The assistant is temporarily unavailable. Please try again shortly."
            }
            PipelineError::RateLimited(_) => {
                "The assistant is handling too many requests. Please try again shortly."
            }
            PipelineError::Deadline => "The request took too long and was stopped.",
            PipelineError::Internal(_) => "Something went wrong answering this question.",
        }
    }
}
