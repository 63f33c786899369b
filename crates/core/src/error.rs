//! Top-level error type shared across crates

use thiserror::Error;

/// Errors surfaced across crate boundaries
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

/// Result alias using the shared error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether a retry could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::RateLimited(_) | Error::Unavailable(_) | Error::Timeout(_)
        )
    }
}
