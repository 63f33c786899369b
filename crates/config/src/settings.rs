//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Main application settings, process-wide immutable after startup
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub gate: GateConfig,

    #[serde(default)]
    pub endpoints: EndpointConfig,

    #[serde(default)]
    pub sparse: SparseIndexConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Per-request deadline in milliseconds
    #[serde(default = "default_deadline_ms")]
    pub request_deadline_ms: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_deadline_ms() -> u64 {
    60_000
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
            request_deadline_ms: default_deadline_ms(),
        }
    }
}

/// Retrieval pipeline knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Dense top-K
    #[serde(default = "default_dense_k")]
    pub dense_k: usize,
    /// Sparse top-K
    #[serde(default = "default_sparse_k")]
    pub sparse_k: usize,
    /// Post-fusion top-K handed to the reranker
    #[serde(default = "default_fuse_k")]
    pub fuse_k: usize,
    /// Chunks sent to the context assembler
    #[serde(default = "default_final_k")]
    pub final_k: usize,
    /// Fusion weight for dense scores
    #[serde(default = "default_alpha_dense")]
    pub alpha_dense: f32,
    /// Fusion weight for sparse scores
    #[serde(default = "default_beta_sparse")]
    pub beta_sparse: f32,
    #[serde(default = "default_true")]
    pub rerank_enabled: bool,
    /// Compute rerank scores but do not reorder
    #[serde(default)]
    pub rerank_shadow: bool,
    /// Dense retrieval timeout in milliseconds (embedding + k-NN)
    #[serde(default = "default_dense_timeout_ms")]
    pub dense_timeout_ms: u64,
    /// Lower clamp on the combined boost multiplier
    #[serde(default = "default_boost_floor")]
    pub boost_floor: f32,
    /// Upper clamp on the combined boost multiplier
    #[serde(default = "default_boost_ceiling")]
    pub boost_ceiling: f32,
    /// Age in months after which the soft recency decay applies
    #[serde(default = "default_recency_soft_months")]
    pub recency_soft_months: u32,
    /// Age in months after which the hard recency decay applies
    #[serde(default = "default_recency_hard_months")]
    pub recency_hard_months: u32,
}

fn default_dense_k() -> usize {
    40
}

fn default_sparse_k() -> usize {
    40
}

fn default_fuse_k() -> usize {
    50
}

fn default_final_k() -> usize {
    8
}

fn default_alpha_dense() -> f32 {
    0.7
}

fn default_beta_sparse() -> f32 {
    0.3
}

fn default_dense_timeout_ms() -> u64 {
    5_000
}

fn default_boost_floor() -> f32 {
    0.5
}

fn default_boost_ceiling() -> f32 {
    1.75
}

fn default_recency_soft_months() -> u32 {
    24
}

fn default_recency_hard_months() -> u32 {
    48
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            dense_k: default_dense_k(),
            sparse_k: default_sparse_k(),
            fuse_k: default_fuse_k(),
            final_k: default_final_k(),
            alpha_dense: default_alpha_dense(),
            beta_sparse: default_beta_sparse(),
            rerank_enabled: true,
            rerank_shadow: false,
            dense_timeout_ms: default_dense_timeout_ms(),
            boost_floor: default_boost_floor(),
            boost_ceiling: default_boost_ceiling(),
            recency_soft_months: default_recency_soft_months(),
            recency_hard_months: default_recency_hard_months(),
        }
    }
}

/// Context assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Token cap on the assembled context
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
    /// Optional path to a tokenizer.json; heuristic counting when absent
    #[serde(default)]
    pub tokenizer_path: Option<String>,
}

fn default_token_budget() -> usize {
    4_000
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            tokenizer_path: None,
        }
    }
}

/// Generation parameters and model identifiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default = "default_gate_model")]
    pub gate_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_reranker_model")]
    pub reranker_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: usize,
    /// Retry attempts for non-streaming upstream calls
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Initial backoff in milliseconds, doubled each retry with jitter
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Embedding vector dimension
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
    /// Optional file overriding the built-in system prompt template
    #[serde(default)]
    pub prompt_template_path: Option<String>,
}

fn default_llm_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_gate_model() -> String {
    "claude-3-5-haiku-20241022".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_reranker_model() -> String {
    "rerank-english-v3.0".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_output_tokens() -> usize {
    2_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_embedding_dim() -> usize {
    1536
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            llm_model: default_llm_model(),
            gate_model: default_gate_model(),
            embedding_model: default_embedding_model(),
            reranker_model: default_reranker_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            embedding_dim: default_embedding_dim(),
            prompt_template_path: None,
        }
    }
}

/// Relevance gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Conversation pairs included in the prepared-question window
    #[serde(default = "default_max_pairs")]
    pub conversation_max_pairs: usize,
    /// Pairs serialized for the gate classifier itself
    #[serde(default = "default_gate_max_pairs")]
    pub classifier_max_pairs: usize,
    /// Token ceiling on the classifier context
    #[serde(default = "default_gate_max_tokens")]
    pub classifier_max_tokens: usize,
    /// Second-opinion token-overlap heuristic on borderline NEW verdicts
    #[serde(default)]
    pub overlap_check: bool,
}

fn default_max_pairs() -> usize {
    5
}

fn default_gate_max_pairs() -> usize {
    10
}

fn default_gate_max_tokens() -> usize {
    2_000
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            conversation_max_pairs: default_max_pairs(),
            classifier_max_pairs: default_gate_max_pairs(),
            classifier_max_tokens: default_gate_max_tokens(),
            overlap_check: false,
        }
    }
}

/// Upstream collaborator endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_llm_endpoint")]
    pub llm_endpoint: String,
    #[serde(default)]
    pub llm_api_key: String,
    #[serde(default = "default_embedding_endpoint")]
    pub embedding_endpoint: String,
    #[serde(default)]
    pub embedding_api_key: String,
    #[serde(default = "default_qdrant_endpoint")]
    pub qdrant_endpoint: String,
    #[serde(default = "default_qdrant_collection")]
    pub qdrant_collection: String,
    #[serde(default)]
    pub qdrant_api_key: Option<String>,
    #[serde(default = "default_reranker_endpoint")]
    pub reranker_endpoint: String,
    #[serde(default)]
    pub reranker_api_key: String,
    /// Observability backend; export disabled when empty
    #[serde(default)]
    pub trace_endpoint: String,
    #[serde(default)]
    pub trace_api_key: String,
}

fn default_llm_endpoint() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_embedding_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_qdrant_endpoint() -> String {
    "http://localhost:6334".to_string()
}

fn default_qdrant_collection() -> String {
    "cloudfuze_kb".to_string()
}

fn default_reranker_endpoint() -> String {
    "https://api.cohere.com/v2".to_string()
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            llm_endpoint: default_llm_endpoint(),
            llm_api_key: String::new(),
            embedding_endpoint: default_embedding_endpoint(),
            embedding_api_key: String::new(),
            qdrant_endpoint: default_qdrant_endpoint(),
            qdrant_collection: default_qdrant_collection(),
            qdrant_api_key: None,
            reranker_endpoint: default_reranker_endpoint(),
            reranker_api_key: String::new(),
            trace_endpoint: String::new(),
            trace_api_key: String::new(),
        }
    }
}

/// Sparse index persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseIndexConfig {
    /// Directory holding the serialized inverted index
    #[serde(default = "default_sparse_dir")]
    pub dir: String,
}

fn default_sparse_dir() -> String {
    "data/sparse".to_string()
}

impl Default for SparseIndexConfig {
    fn default() -> Self {
        Self {
            dir: default_sparse_dir(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

impl Settings {
    /// Validate settings; any violation aborts startup
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.retrieval;

        if r.dense_k == 0 || r.sparse_k == 0 || r.final_k == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.dense_k/sparse_k/final_k".to_string(),
                message: "top-K values must be at least 1".to_string(),
            });
        }

        for (field, value) in [
            ("retrieval.alpha_dense", r.alpha_dense),
            ("retrieval.beta_sparse", r.beta_sparse),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("must be between 0.0 and 1.0, got {}", value),
                });
            }
        }

        // The reranker needs a meaningfully larger candidate pool than it keeps
        if r.rerank_enabled && r.fuse_k < r.final_k * 5 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.fuse_k".to_string(),
                message: format!(
                    "must be at least final_k * 5 ({}) when reranking is enabled, got {}",
                    r.final_k * 5,
                    r.fuse_k
                ),
            });
        }

        if r.boost_floor >= r.boost_ceiling {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.boost_floor".to_string(),
                message: format!(
                    "must be below boost_ceiling ({}), got {}",
                    r.boost_ceiling, r.boost_floor
                ),
            });
        }

        if r.recency_soft_months >= r.recency_hard_months {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.recency_soft_months".to_string(),
                message: "must be below recency_hard_months".to_string(),
            });
        }

        if self.context.token_budget == 0 {
            return Err(ConfigError::InvalidValue {
                field: "context.token_budget".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.server.request_deadline_ms < 1_000 {
            return Err(ConfigError::InvalidValue {
                field: "server.request_deadline_ms".to_string(),
                message: "deadline below 1000ms cannot cover a generation".to_string(),
            });
        }

        if self.gate.conversation_max_pairs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "gate.conversation_max_pairs".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

/// Load settings from file and environment
///
/// Layering, later wins: defaults, then the optional config file, then
/// `ASKFUZE__`-prefixed environment variables, then the short operational
/// names (`DENSE_K`, `RERANK_ENABLED`, ...).
pub fn load_settings() -> Result<Settings, ConfigError> {
    let file = std::env::var("ASKFUZE_CONFIG").unwrap_or_else(|_| "config/default".to_string());

    let builder = Config::builder()
        .add_source(File::with_name(&file).required(false))
        .add_source(Environment::with_prefix("ASKFUZE").separator("__"));

    let mut settings: Settings = builder.build()?.try_deserialize()?;
    apply_operational_env(&mut settings)?;
    Ok(settings)
}

/// Apply the short operational environment names
///
/// These are the names operators actually set; they win over everything.
fn apply_operational_env(settings: &mut Settings) -> Result<(), ConfigError> {
    fn set<T: std::str::FromStr>(name: &str, target: &mut T) -> Result<(), ConfigError> {
        if let Ok(raw) = std::env::var(name) {
            *target = raw.parse().map_err(|_| ConfigError::InvalidValue {
                field: name.to_string(),
                message: format!("could not parse {:?}", raw),
            })?;
        }
        Ok(())
    }

    set("DENSE_K", &mut settings.retrieval.dense_k)?;
    set("SPARSE_K", &mut settings.retrieval.sparse_k)?;
    set("FUSE_K", &mut settings.retrieval.fuse_k)?;
    set("FINAL_K", &mut settings.retrieval.final_k)?;
    set("ALPHA_DENSE", &mut settings.retrieval.alpha_dense)?;
    set("BETA_SPARSE", &mut settings.retrieval.beta_sparse)?;
    set("RERANK_ENABLED", &mut settings.retrieval.rerank_enabled)?;
    set("RERANK_SHADOW", &mut settings.retrieval.rerank_shadow)?;
    set("CONTEXT_TOKEN_BUDGET", &mut settings.context.token_budget)?;
    set("REQUEST_DEADLINE_MS", &mut settings.server.request_deadline_ms)?;
    set(
        "CONVERSATION_MAX_PAIRS",
        &mut settings.gate.conversation_max_pairs,
    )?;
    set("LLM_MODEL", &mut settings.generation.llm_model)?;
    set("EMBEDDING_MODEL", &mut settings.generation.embedding_model)?;
    set("RERANKER_MODEL", &mut settings.generation.reranker_model)?;
    Ok(())
}
