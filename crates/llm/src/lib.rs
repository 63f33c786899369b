//! LLM integration for AskFuze
//!
//! Features:
//! - Messages-API backend with SSE streaming and prompt cancellation
//! - Relevance gate: one-token FOLLOWUP/NEW classification
//! - Prompt template with strict two-placeholder compilation
//! - Token counting (HuggingFace tokenizer file or heuristic)

pub mod backend;
pub mod gate;
pub mod prompt;
pub mod tokenizer;

pub use backend::{MessagesBackend, MessagesClientConfig};
pub use gate::{GateDecision, RelevanceGate};
pub use prompt::{CompiledPrompt, PromptTemplate};
pub use tokenizer::{load_token_counter, HeuristicTokenCounter, HfTokenCounter};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for askfuze_core::Error {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::RateLimited(msg) => askfuze_core::Error::RateLimited(msg),
            LlmError::Timeout => askfuze_core::Error::Timeout("llm call".to_string()),
            LlmError::Network(msg) => askfuze_core::Error::Unavailable(msg),
            LlmError::Configuration(msg) => askfuze_core::Error::Config(msg),
            other => askfuze_core::Error::Llm(other.to_string()),
        }
    }
}
