//! Core types and traits for the AskFuze retriever
//!
//! This crate provides the foundational types used across all other crates:
//! - Chunk and metadata types for the knowledge store
//! - Conversation turns
//! - Retrieval candidates and citations
//! - Stream events for answer delivery
//! - Trace types for per-request observability
//! - Collaborator traits (embedding, vector search, reranking, LLM,
//!   conversation store, trace export, token counting)

pub mod chunk;
pub mod conversation;
pub mod error;
pub mod query;
pub mod retrieval;
pub mod stream;
pub mod trace;
pub mod traits;

pub use chunk::{Chunk, ChunkMetadata, SourceType};
pub use conversation::{Turn, TurnRole};
pub use error::{Error, Result};
pub use query::DetectedTerm;
pub use retrieval::{Candidate, Citation, ScoredChunk};
pub use stream::{StatusTag, StreamEvent};
pub use trace::{CandidateTrace, FeedbackRating, RequestTrace, Span, TraceStatus};

pub use traits::{
    CompletionRequest,
    ConversationStore,
    Embedder,
    LlmBackend,
    RerankScorer,
    StreamOutcome,
    TokenCounter,
    TraceExporter,
    VectorSearch,
};
