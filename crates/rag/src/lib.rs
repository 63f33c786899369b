//! Hybrid retrieval for the AskFuze pipeline
//!
//! Features:
//! - Dense vector search via Qdrant
//! - Sparse BM25 over content and metadata tokens, persisted to disk
//! - Weighted score fusion with metadata-driven boosts
//! - Optional HTTP cross-encoder reranking (with shadow mode)
//! - Technical-term detection over static weighted dictionaries
//! - HTTP embedding client with retry and jitter

pub mod embeddings;
pub mod fusion;
pub mod reranker;
pub mod retriever;
pub mod retry;
pub mod sparse;
pub mod terms;
pub mod tokenize;
pub mod vector_store;

pub use embeddings::{EmbeddingClientConfig, HttpEmbedder};
pub use fusion::{fuse_and_boost, min_max_normalize, FusionConfig};
pub use reranker::{apply_rerank, HttpReranker, RerankerClientConfig};
pub use retriever::{HybridRetriever, RetrievalOutcome};
pub use sparse::{SparseHit, SparseIndex};
pub use terms::{detect_terms, TermDictionaries};
pub use tokenize::tokenize;
pub use vector_store::{QdrantStore, QdrantStoreConfig};

use thiserror::Error;

/// Retrieval errors
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Reranker error: {0}")]
    Reranker(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<RagError> for askfuze_core::Error {
    fn from(err: RagError) -> Self {
        match err {
            RagError::Embedding(msg) => askfuze_core::Error::Embedding(msg),
            RagError::RateLimited(msg) => askfuze_core::Error::RateLimited(msg),
            RagError::Timeout(msg) => askfuze_core::Error::Timeout(msg),
            RagError::Connection(msg) => askfuze_core::Error::Unavailable(msg),
            other => askfuze_core::Error::Retrieval(other.to_string()),
        }
    }
}
