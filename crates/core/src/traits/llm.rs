//! LLM collaborator trait

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// A compiled request to the language model
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System text, when the backend separates system from user content
    pub system: Option<String>,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl CompletionRequest {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
            temperature: 0.2,
            max_tokens: 2000,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Result of a streamed generation
#[derive(Debug, Clone)]
pub struct StreamOutcome {
    /// Full text accumulated from the stream
    pub text: String,
    pub output_tokens: usize,
    /// True when the consumer dropped the channel and the upstream call
    /// was aborted before completion
    pub cancelled: bool,
}

/// Language model backend
///
/// `complete` is used for classification and non-streaming answers and may
/// be retried; `stream` delivers tokens as they arrive and is never retried
/// mid-flight. When the receiver side of `tx` is dropped, implementations
/// must abort the upstream call promptly and return with `cancelled = true`.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String>;

    async fn stream(
        &self,
        request: CompletionRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<StreamOutcome>;

    fn model_name(&self) -> &str;
}
