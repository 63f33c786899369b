//! Configuration for the AskFuze retriever
//!
//! Settings load in three layers, later layers winning:
//! 1. Built-in defaults
//! 2. An optional config file (`config/default.yaml`, overridable via
//!    `ASKFUZE_CONFIG`)
//! 3. Environment variables - both the `ASKFUZE__` prefixed form
//!    (`ASKFUZE__RETRIEVAL__DENSE_K`) and the short operational names
//!    (`DENSE_K`, `SPARSE_K`, `RERANK_ENABLED`, ...)
//!
//! Configuration is immutable after startup; invalid settings abort startup
//! with a diagnostic rather than surfacing at runtime.

pub mod settings;

pub use settings::{
    load_settings, ContextConfig, EndpointConfig, GateConfig, GenerationConfig,
    ObservabilityConfig, RetrievalConfig, ServerConfig, Settings, SparseIndexConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
