//! Hybrid retriever
//!
//! Orchestrates dense and sparse retrieval, fusion with boosts, and
//! optional reranking. Dense search suspends on embedding and store I/O;
//! sparse scoring is CPU-bound and runs on a blocking worker. The two run
//! concurrently for each request.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use askfuze_config::RetrievalConfig;
use askfuze_core::{Candidate, DetectedTerm, Embedder, RerankScorer, ScoredChunk, VectorSearch};

use crate::fusion::{fuse_and_boost, FusionConfig};
use crate::reranker::apply_rerank;
use crate::sparse::{SparseHit, SparseIndex};
use crate::RagError;

/// Number of detected terms appended to the dense search string
const EXPANSION_TERMS: usize = 5;

/// Result of a full retrieval pass
#[derive(Debug)]
pub struct RetrievalOutcome {
    /// Top `final_k` candidates, ranked
    pub candidates: Vec<Candidate>,
    pub dense_hits: usize,
    pub sparse_hits: usize,
    /// Set when dense retrieval timed out or the store failed; the pass
    /// degrades to sparse-only rather than failing
    pub dense_error: Option<String>,
    /// Set when the reranker failed and fusion ordering was kept
    pub rerank_failed: bool,
}

/// Hybrid dense + sparse retriever
pub struct HybridRetriever {
    config: RetrievalConfig,
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorSearch>,
    sparse: Arc<SparseIndex>,
    reranker: Option<Arc<dyn RerankScorer>>,
}

impl HybridRetriever {
    pub fn new(
        config: RetrievalConfig,
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorSearch>,
        sparse: Arc<SparseIndex>,
    ) -> Self {
        Self {
            config,
            embedder,
            vectors,
            sparse,
            reranker: None,
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn RerankScorer>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// The expanded dense search string: prepared question plus the top
    /// detected terms by weight
    pub fn expanded_query(prepared: &str, terms: &[DetectedTerm]) -> String {
        let mut sorted: Vec<&DetectedTerm> = terms.iter().collect();
        sorted.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.text.cmp(&b.text))
        });

        let expansion: Vec<&str> = sorted
            .iter()
            .take(EXPANSION_TERMS)
            .map(|t| t.text.as_str())
            .collect();

        if expansion.is_empty() {
            prepared.to_string()
        } else {
            format!("{} {}", prepared, expansion.join(" "))
        }
    }

    /// Dense retrieval: embed the expanded query, then k-NN search.
    ///
    /// The whole call is bounded by the configured dense timeout.
    pub async fn search_dense(
        &self,
        prepared: &str,
        terms: &[DetectedTerm],
    ) -> Result<Vec<ScoredChunk>, RagError> {
        let query = Self::expanded_query(prepared, terms);
        let deadline = Duration::from_millis(self.config.dense_timeout_ms);

        let result = tokio::time::timeout(deadline, async {
            let vector = self
                .embedder
                .embed(&query)
                .await
                .map_err(|e| RagError::Embedding(e.to_string()))?;
            self.vectors
                .similarity_search(&vector, self.config.dense_k)
                .await
                .map_err(|e| RagError::Search(e.to_string()))
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(RagError::Timeout(format!(
                "dense retrieval exceeded {}ms",
                self.config.dense_timeout_ms
            ))),
        }
    }

    /// Sparse BM25 retrieval on a blocking worker
    pub async fn search_sparse(&self, prepared: &str) -> Result<Vec<SparseHit>, RagError> {
        let index = Arc::clone(&self.sparse);
        let query = prepared.to_string();
        let k = self.config.sparse_k;

        tokio::task::spawn_blocking(move || index.query(&query, k))
            .await
            .map_err(|e| RagError::Search(format!("sparse search task failed: {}", e)))
    }

    /// Fuse dense and sparse hits and apply boosts
    pub fn fuse(
        &self,
        dense: &[ScoredChunk],
        sparse: &[SparseHit],
        terms: &[DetectedTerm],
    ) -> Vec<Candidate> {
        fuse_and_boost(
            dense,
            sparse,
            terms,
            Utc::now(),
            &FusionConfig::from(&self.config),
        )
    }

    /// Rerank the fused candidates when a scorer is configured.
    ///
    /// A reranker failure is a partial success: fusion ordering is kept and
    /// the failure is reported to the caller for the trace.
    pub async fn rerank(
        &self,
        prepared: &str,
        candidates: Vec<Candidate>,
    ) -> (Vec<Candidate>, bool) {
        if !self.config.rerank_enabled || candidates.is_empty() {
            return (candidates, false);
        }
        let Some(reranker) = self.reranker.as_ref() else {
            return (candidates, false);
        };

        let passages: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        match reranker.score(prepared, &passages).await {
            Ok(scores) if scores.len() == candidates.len() => (
                apply_rerank(candidates, &scores, self.config.rerank_shadow),
                false,
            ),
            Ok(scores) => {
                tracing::warn!(
                    expected = candidates.len(),
                    got = scores.len(),
                    "Reranker returned wrong score count, keeping fusion order"
                );
                (candidates, true)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Reranker failed, keeping fusion order");
                (candidates, true)
            }
        }
    }

    /// Full retrieval pass: dense and sparse concurrently, fuse, rerank,
    /// keep the final top-K
    pub async fn retrieve(
        &self,
        prepared: &str,
        terms: &[DetectedTerm],
    ) -> Result<RetrievalOutcome, RagError> {
        let (dense_result, sparse_result) =
            tokio::join!(self.search_dense(prepared, terms), self.search_sparse(prepared));

        // Dense failure degrades to sparse-only; the span records it
        let (dense, dense_error) = match dense_result {
            Ok(hits) => (hits, None),
            Err(e) => {
                tracing::warn!(error = %e, "Dense retrieval failed, continuing sparse-only");
                (Vec::new(), Some(e.to_string()))
            }
        };
        let sparse = sparse_result?;

        let fused = self.fuse(&dense, &sparse, terms);
        let (mut candidates, rerank_failed) = self.rerank(prepared, fused).await;
        candidates.truncate(self.config.final_k);

        Ok(RetrievalOutcome {
            dense_hits: dense.len(),
            sparse_hits: sparse.len(),
            candidates,
            dense_error,
            rerank_failed,
        })
    }
}
