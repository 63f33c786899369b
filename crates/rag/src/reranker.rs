//! Cross-encoder reranking
//!
//! A remote cross-encoder scores (query, passage) pairs for the fused
//! top-K. The blended score replaces the fusion score unless shadow mode
//! is on, in which case rerank scores are recorded for offline comparison
//! but the fusion ordering is kept.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use askfuze_core::{Candidate, Error, RerankScorer};

use crate::fusion::min_max_normalize;
use crate::retry::retry;
use crate::RagError;

/// Weight on the fused score in the blended ranking
const FUSED_WEIGHT: f32 = 0.4;
/// Weight on the batch-normalized rerank score
const RERANK_WEIGHT: f32 = 0.6;

/// Reranker client configuration
#[derive(Debug, Clone)]
pub struct RerankerClientConfig {
    /// Base URL, e.g. `https://api.cohere.com/v2`
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RerankerClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.cohere.com/v2".to_string(),
            api_key: String::new(),
            model: "rerank-english-v3.0".to_string(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

/// Cross-encoder scoring backed by an HTTP rerank API
pub struct HttpReranker {
    config: RerankerClientConfig,
    client: Client,
}

impl HttpReranker {
    pub fn new(config: RerankerClientConfig) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;
        Ok(Self { config, client })
    }

    async fn score_once(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, RagError> {
        let request = RerankRequest {
            model: &self.config.model,
            query,
            documents: passages,
        };

        let response = self
            .client
            .post(format!("{}/rerank", self.config.endpoint))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RagError::Timeout(format!("rerank request: {}", e))
                } else {
                    RagError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(RagError::RateLimited(format!("rerank HTTP {}", status)));
        }
        if status.is_server_error() {
            return Err(RagError::Connection(format!("rerank HTTP {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Reranker(format!("HTTP {}: {}", status, body)));
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| RagError::Reranker(format!("invalid response: {}", e)))?;

        // The API returns results ranked by relevance; map back to input order
        let mut scores = vec![0.0f32; passages.len()];
        for result in parsed.results {
            if result.index < scores.len() {
                scores[result.index] = result.relevance_score;
            } else {
                return Err(RagError::Reranker(format!(
                    "result index {} out of range",
                    result.index
                )));
            }
        }
        Ok(scores)
    }
}

#[async_trait]
impl RerankScorer for HttpReranker {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, Error> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }
        let scores = retry(
            self.config.max_retries,
            self.config.initial_backoff,
            || self.score_once(query, passages),
        )
        .await?;
        Ok(scores)
    }
}

/// Blend rerank scores into the fused ranking
///
/// `scores` must align with `candidates` by index. In shadow mode the
/// scores are recorded on each candidate but the incoming ordering is
/// returned untouched.
pub fn apply_rerank(mut candidates: Vec<Candidate>, scores: &[f32], shadow: bool) -> Vec<Candidate> {
    debug_assert_eq!(candidates.len(), scores.len());

    let normalized = min_max_normalize(scores);
    for (candidate, (&raw, &norm)) in candidates
        .iter_mut()
        .zip(scores.iter().zip(normalized.iter()))
    {
        candidate.rerank_score = Some(raw);
        if !shadow {
            candidate.final_score = FUSED_WEIGHT * candidate.final_score + RERANK_WEIGHT * norm;
        }
    }

    if !shadow {
        candidates.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
    }
    candidates
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use askfuze_core::ChunkMetadata;

    fn candidate(id: &str, final_score: f32) -> Candidate {
        Candidate {
            chunk_id: id.to_string(),
            text: format!("text {}", id),
            metadata: ChunkMetadata::default(),
            dense_score: Some(final_score),
            sparse_score: None,
            rerank_score: None,
            boost: 1.0,
            final_score,
            reasons: Vec::new(),
        }
    }

    #[test]
    fn test_rerank_reorders() {
        let candidates = vec![candidate("a", 0.9), candidate("b", 0.5)];
        // The cross-encoder strongly prefers b
        let reranked = apply_rerank(candidates, &[0.1, 0.95], false);

        assert_eq!(reranked[0].chunk_id, "b");
        // 0.4 * 0.5 + 0.6 * 1.0
        assert!((reranked[0].final_score - 0.8).abs() < 1e-6);
        // 0.4 * 0.9 + 0.6 * 0.0
        assert!((reranked[1].final_score - 0.36).abs() < 1e-6);
    }

    #[test]
    fn test_shadow_keeps_ordering() {
        let candidates = vec![candidate("a", 0.9), candidate("b", 0.5)];
        let reranked = apply_rerank(candidates, &[0.1, 0.95], true);

        assert_eq!(reranked[0].chunk_id, "a");
        assert!((reranked[0].final_score - 0.9).abs() < 1e-6);
        // Scores recorded for offline comparison
        assert_eq!(reranked[0].rerank_score, Some(0.1));
        assert_eq!(reranked[1].rerank_score, Some(0.95));
    }

    #[test]
    fn test_tied_rerank_scores_keep_fused_order() {
        let candidates = vec![candidate("a", 0.9), candidate("b", 0.5)];
        // Tied scores normalize to zero, leaving 0.4 * fused as the rank key
        let reranked = apply_rerank(candidates, &[0.5, 0.5], false);
        assert_eq!(reranked[0].chunk_id, "a");
    }

    #[test]
    fn test_response_maps_to_input_order() {
        let json = r#"{"results": [
            {"index": 1, "relevance_score": 0.9},
            {"index": 0, "relevance_score": 0.2}
        ]}"#;
        let parsed: RerankResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[0].index, 1);
    }
}
