//! AskFuze server entry point

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use askfuze_config::{load_settings, Settings};
use askfuze_core::{LlmBackend, RerankScorer, TraceExporter};
use askfuze_llm::{load_token_counter, MessagesBackend, MessagesClientConfig, PromptTemplate};
use askfuze_pipeline::{
    AnswerPipeline, FeedbackStore, HttpTraceExporter, InMemoryConversationStore,
    NoopTraceExporter, Registry, TraceExporterConfig,
};
use askfuze_rag::{
    EmbeddingClientConfig, HttpEmbedder, HttpReranker, QdrantStore, QdrantStoreConfig,
    RerankerClientConfig, SparseIndex,
};
use askfuze_server::{create_router, AppState, IdentityTokenValidator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configuration problems abort startup with a diagnostic; they never
    // surface at runtime
    let settings = match load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = settings.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    init_tracing(&settings);
    tracing::info!("Starting AskFuze v{}", env!("CARGO_PKG_VERSION"));

    let metrics_handle = init_metrics();
    tracing::info!("Prometheus metrics at /metrics");

    let settings = Arc::new(settings);
    let registry = build_registry(settings.clone())?;
    let exporter = registry.exporter.clone();

    let pipeline = Arc::new(AnswerPipeline::new(registry));
    let feedback = Arc::new(FeedbackStore::new(exporter));

    let state = AppState::new(
        settings.clone(),
        pipeline,
        feedback,
        Arc::new(IdentityTokenValidator),
    )
    .with_metrics(metrics_handle);

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wire every collaborator once; the pipeline owns them for the process
/// lifetime
fn build_registry(settings: Arc<Settings>) -> anyhow::Result<Registry> {
    let endpoints = &settings.endpoints;
    let generation = &settings.generation;

    let sparse = Arc::new(SparseIndex::open(&settings.sparse.dir)?);
    tracing::info!(
        docs = sparse.doc_count(),
        dir = %settings.sparse.dir,
        "Sparse index ready"
    );

    let vectors = Arc::new(QdrantStore::new(QdrantStoreConfig {
        endpoint: endpoints.qdrant_endpoint.clone(),
        collection: endpoints.qdrant_collection.clone(),
        vector_dim: generation.embedding_dim,
        api_key: endpoints.qdrant_api_key.clone(),
    })?);

    let embedder = Arc::new(HttpEmbedder::new(EmbeddingClientConfig {
        endpoint: endpoints.embedding_endpoint.clone(),
        api_key: key_or_env(&endpoints.embedding_api_key, "OPENAI_API_KEY"),
        model: generation.embedding_model.clone(),
        dimension: generation.embedding_dim,
        timeout: Duration::from_millis(settings.retrieval.dense_timeout_ms),
        max_retries: generation.max_retries,
        initial_backoff: Duration::from_millis(generation.initial_backoff_ms),
    })?);

    let reranker: Option<Arc<dyn RerankScorer>> = if settings.retrieval.rerank_enabled {
        Some(Arc::new(HttpReranker::new(RerankerClientConfig {
            endpoint: endpoints.reranker_endpoint.clone(),
            api_key: key_or_env(&endpoints.reranker_api_key, "COHERE_API_KEY"),
            model: generation.reranker_model.clone(),
            timeout: Duration::from_secs(10),
            max_retries: generation.max_retries,
            initial_backoff: Duration::from_millis(generation.initial_backoff_ms),
        })?))
    } else {
        None
    };

    let llm_api_key = key_or_env(&endpoints.llm_api_key, "ANTHROPIC_API_KEY");
    let llm: Arc<dyn LlmBackend> = Arc::new(MessagesBackend::new(MessagesClientConfig {
        endpoint: endpoints.llm_endpoint.clone(),
        api_key: llm_api_key.clone(),
        model: generation.llm_model.clone(),
        timeout: Duration::from_millis(settings.server.request_deadline_ms),
        max_retries: generation.max_retries,
        initial_backoff: Duration::from_millis(generation.initial_backoff_ms),
    })?);
    let gate_llm: Arc<dyn LlmBackend> = Arc::new(MessagesBackend::new(MessagesClientConfig {
        endpoint: endpoints.llm_endpoint.clone(),
        api_key: llm_api_key,
        model: generation.gate_model.clone(),
        timeout: Duration::from_secs(10),
        max_retries: generation.max_retries,
        initial_backoff: Duration::from_millis(generation.initial_backoff_ms),
    })?);

    let exporter: Arc<dyn TraceExporter> = if endpoints.trace_endpoint.is_empty() {
        tracing::info!("No trace endpoint configured, traces stay local");
        Arc::new(NoopTraceExporter)
    } else {
        Arc::new(HttpTraceExporter::new(TraceExporterConfig {
            endpoint: endpoints.trace_endpoint.clone(),
            api_key: endpoints.trace_api_key.clone(),
            timeout: Duration::from_secs(10),
        })?)
    };

    let tokens = load_token_counter(settings.context.tokenizer_path.as_deref())?;
    let template = Arc::new(PromptTemplate::load(
        generation.prompt_template_path.as_deref(),
    )?);

    Ok(Registry {
        settings,
        embedder,
        vectors,
        sparse,
        reranker,
        llm,
        gate_llm,
        conversations: Arc::new(InMemoryConversationStore::new()),
        exporter,
        tokens,
        template,
    })
}

fn key_or_env(configured: &str, env_name: &str) -> String {
    if configured.is_empty() {
        std::env::var(env_name).unwrap_or_default()
    } else {
        configured.to_string()
    }
}

fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "askfuze={},tower_http=info",
            settings.observability.log_level
        )
        .into()
    });

    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
