//! The collaborator registry
//!
//! An immutable value constructed at startup holding every external
//! dependency of the pipeline. Passed explicitly to components - there are
//! no hidden singletons, and tests build a registry from mocks.

use std::sync::Arc;

use askfuze_config::Settings;
use askfuze_core::{
    ConversationStore, Embedder, LlmBackend, RerankScorer, TokenCounter, TraceExporter,
    VectorSearch,
};
use askfuze_llm::PromptTemplate;
use askfuze_rag::SparseIndex;

/// Everything the pipeline needs, wired once at startup
#[derive(Clone)]
pub struct Registry {
    pub settings: Arc<Settings>,
    pub embedder: Arc<dyn Embedder>,
    pub vectors: Arc<dyn VectorSearch>,
    pub sparse: Arc<SparseIndex>,
    pub reranker: Option<Arc<dyn RerankScorer>>,
    /// Answer generation model
    pub llm: Arc<dyn LlmBackend>,
    /// Small model used by the relevance gate
    pub gate_llm: Arc<dyn LlmBackend>,
    pub conversations: Arc<dyn ConversationStore>,
    pub exporter: Arc<dyn TraceExporter>,
    pub tokens: Arc<dyn TokenCounter>,
    pub template: Arc<PromptTemplate>,
}
