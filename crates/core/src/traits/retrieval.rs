//! Retrieval collaborator traits

use async_trait::async_trait;

use crate::chunk::Chunk;
use crate::error::Result;
use crate::retrieval::ScoredChunk;

/// Embedding provider: `embed(text) -> vector[D]` with stable dimension D
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Fixed output dimension of the model
    fn dimension(&self) -> usize;
}

/// Vector store in cosine space
///
/// The store is read-mostly and thread-safe per its own contract; rebuilds
/// happen behind it, never through the retriever.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// k-NN search returning chunks with raw similarity scores
    async fn similarity_search(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    /// Add chunks with their embeddings (ingestion-side contract)
    async fn add_documents(&self, chunks: &[Chunk]) -> Result<()>;

    async fn count(&self) -> Result<u64>;
}

/// Cross-encoder scoring: `score(query, passages) -> [float]`
///
/// Returns one score per passage, in input order.
#[async_trait]
pub trait RerankScorer: Send + Sync {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>>;
}
