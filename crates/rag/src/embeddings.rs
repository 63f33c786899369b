//! HTTP embedding client
//!
//! Calls an OpenAI-compatible embeddings endpoint. Non-streaming, so
//! transient failures are retried with backoff and jitter.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use askfuze_core::{Embedder, Error};

use crate::retry::retry;
use crate::RagError;

/// Embedding client configuration
#[derive(Debug, Clone)]
pub struct EmbeddingClientConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    /// Fixed output dimension
    pub dimension: usize,
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for EmbeddingClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            timeout: Duration::from_secs(5),
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

/// Embedding provider backed by an HTTP API
pub struct HttpEmbedder {
    config: EmbeddingClientConfig,
    client: Client,
}

impl HttpEmbedder {
    pub fn new(config: EmbeddingClientConfig) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;
        Ok(Self { config, client })
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: vec![text],
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.config.endpoint))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RagError::Timeout(format!("embedding request: {}", e))
                } else {
                    RagError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(RagError::RateLimited(format!("embedding HTTP {}", status)));
        }
        if status.is_server_error() {
            return Err(RagError::Connection(format!("embedding HTTP {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!("HTTP {}: {}", status, body)));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("invalid response: {}", e)))?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| RagError::Embedding("empty embedding response".to_string()))?;

        if embedding.len() != self.config.dimension {
            return Err(RagError::Embedding(format!(
                "dimension mismatch: got {}, expected {}",
                embedding.len(),
                self.config.dimension
            )));
        }

        Ok(embedding)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, Error> {
        let result = retry(
            self.config.max_retries,
            self.config.initial_backoff,
            || self.embed_once(text),
        )
        .await?;
        Ok(result)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}
