//! End-to-end pipeline tests against a mock registry
//!
//! Every collaborator is an in-process fake: a deterministic hash
//! embedder, an in-memory cosine store, scripted LLMs, and a capturing
//! trace exporter. The pipeline itself runs unmodified.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use askfuze_config::Settings;
use askfuze_core::{
    Chunk, ChunkMetadata, CompletionRequest, ConversationStore, Embedder, Error, FeedbackRating,
    LlmBackend, RequestTrace, ScoredChunk, StreamEvent, StreamOutcome, TokenCounter, TraceExporter,
    TraceStatus, Turn, VectorSearch,
};
use askfuze_llm::PromptTemplate;
use askfuze_pipeline::{
    AnswerPipeline, GenerationMode, InMemoryConversationStore, Registry,
};
use askfuze_rag::SparseIndex;

// ---------------------------------------------------------------------------
// Mock collaborators
// ---------------------------------------------------------------------------

fn hash_embed(text: &str, dim: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dim];
    for token in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let mut h: u64 = 1469598103934665603;
        for b in token.bytes() {
            h ^= u64::from(b);
            h = h.wrapping_mul(1099511628211);
        }
        v[(h % dim as u64) as usize] += 1.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, Error> {
        Ok(hash_embed(text, 64))
    }

    fn dimension(&self) -> usize {
        64
    }
}

struct MemoryVectorStore {
    chunks: Vec<Chunk>,
}

#[async_trait]
impl VectorSearch for MemoryVectorStore {
    async fn similarity_search(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, Error> {
        let mut hits: Vec<ScoredChunk> = self
            .chunks
            .iter()
            .map(|c| ScoredChunk {
                chunk_id: c.id.clone(),
                text: c.text.clone(),
                metadata: c.metadata.clone(),
                score: c
                    .embedding
                    .iter()
                    .zip(vector.iter())
                    .map(|(a, b)| a * b)
                    .sum(),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap()
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn add_documents(&self, _chunks: &[Chunk]) -> Result<(), Error> {
        Ok(())
    }

    async fn count(&self) -> Result<u64, Error> {
        Ok(self.chunks.len() as u64)
    }
}

/// LLM that returns a fixed reply; streaming splits it into word tokens
struct ScriptedLlm {
    reply: String,
    delay: Duration,
}

impl ScriptedLlm {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            delay: Duration::ZERO,
        }
    }

    fn slow(reply: &str, delay: Duration) -> Self {
        Self {
            reply: reply.to_string(),
            delay,
        }
    }
}

#[async_trait]
impl LlmBackend for ScriptedLlm {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, Error> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.reply.clone())
    }

    async fn stream(
        &self,
        _request: CompletionRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<StreamOutcome, Error> {
        let mut sent = String::new();
        for word in self.reply.split_inclusive(' ') {
            if tx.send(word.to_string()).await.is_err() {
                return Ok(StreamOutcome {
                    text: sent,
                    output_tokens: 0,
                    cancelled: true,
                });
            }
            sent.push_str(word);
        }
        Ok(StreamOutcome {
            output_tokens: sent.split_whitespace().count(),
            text: sent,
            cancelled: false,
        })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[derive(Default)]
struct CaptureExporter {
    traces: Mutex<Vec<RequestTrace>>,
}

#[async_trait]
impl TraceExporter for CaptureExporter {
    async fn export(&self, trace: &RequestTrace) -> Result<(), Error> {
        self.traces.lock().unwrap().push(trace.clone());
        Ok(())
    }

    async fn score(
        &self,
        _trace_id: &str,
        _rating: FeedbackRating,
        _comment: Option<String>,
    ) -> Result<(), Error> {
        Ok(())
    }
}

struct WordCounter;

impl TokenCounter for WordCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

fn kb_chunk(id: &str, text: &str, file_name: &str, source_type: &str, folder: &str) -> Chunk {
    let mut map = HashMap::new();
    map.insert("file_name".to_string(), file_name.to_string());
    map.insert("source_type".to_string(), source_type.to_string());
    map.insert("folder_path".to_string(), folder.to_string());
    map.insert("source_path".to_string(), format!("kb/{}", id));
    Chunk::new(id, text)
        .with_embedding(hash_embed(text, 64))
        .with_metadata(ChunkMetadata::from_map(map))
}

fn cloudfuze_kb() -> Vec<Chunk> {
    vec![
        kb_chunk(
            "slack-json",
            "CloudFuze exports Slack conversations as JSON files. Each channel becomes a JSON \
             export file containing messages, timestamps and user mappings for the Teams migration.",
            "slack-json-export.pdf",
            "document",
            "guides/migration/slack-teams",
        ),
        kb_chunk(
            "slack-channels",
            "Private channels in Slack require admin consent before CloudFuze can read their \
             JSON export during a Slack to Teams migration.",
            "slack-private-channels.pdf",
            "document",
            "guides/migration/slack-teams",
        ),
        kb_chunk(
            "teams-mapping",
            "User mapping CSV files map Slack user ids to Microsoft Teams accounts during \
             migration cutover.",
            "teams-user-mapping.docx",
            "document",
            "guides/migration/slack-teams",
        ),
        kb_chunk(
            "sharepoint-metadata",
            "CloudFuze preserves created-by metadata and modified dates when migrating \
             SharePoint document libraries to OneDrive.",
            "sharepoint-onedrive-metadata.pdf",
            "document",
            "guides/migration/sharepoint",
        ),
        kb_chunk(
            "sharepoint-permissions",
            "SharePoint permissions are translated to OneDrive sharing settings; permission \
             mapping runs after the content migration completes.",
            "sharepoint-permissions.pdf",
            "page",
            "guides/migration/sharepoint",
        ),
        kb_chunk(
            "blog-marketing",
            "Our latest blog covers five reasons enterprises love cloud migrations.",
            "five-reasons.html",
            "blog",
            "blog/2024",
        ),
    ]
}

struct Fixture {
    pipeline: AnswerPipeline,
    exporter: Arc<CaptureExporter>,
    conversations: Arc<InMemoryConversationStore>,
    _tmp: tempfile::TempDir,
}

fn fixture(chunks: Vec<Chunk>, gate_reply: &str, llm_reply: &str) -> Fixture {
    fixture_with(chunks, gate_reply, Arc::new(ScriptedLlm::new(llm_reply)), |_| {})
}

fn fixture_with(
    chunks: Vec<Chunk>,
    gate_reply: &str,
    llm: Arc<dyn LlmBackend>,
    tweak: impl FnOnce(&mut Settings),
) -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let sparse = Arc::new(SparseIndex::open(tmp.path()).unwrap());
    sparse.rebuild(&chunks).unwrap();

    let mut settings = Settings::default();
    settings.retrieval.rerank_enabled = false;
    tweak(&mut settings);

    let exporter = Arc::new(CaptureExporter::default());
    let conversations = Arc::new(InMemoryConversationStore::new());

    let registry = Registry {
        settings: Arc::new(settings),
        embedder: Arc::new(HashEmbedder),
        vectors: Arc::new(MemoryVectorStore { chunks }),
        sparse,
        reranker: None,
        llm,
        gate_llm: Arc::new(ScriptedLlm::new(gate_reply)),
        conversations: conversations.clone(),
        exporter: exporter.clone(),
        tokens: Arc::new(WordCounter),
        template: Arc::new(PromptTemplate::load(None).unwrap()),
    };

    Fixture {
        pipeline: AnswerPipeline::new(registry),
        exporter,
        conversations,
        _tmp: tmp,
    }
}

/// Wait for the background export to land
async fn exported_trace(exporter: &CaptureExporter) -> RequestTrace {
    for _ in 0..100 {
        if let Some(trace) = exporter.traces.lock().unwrap().last().cloned() {
            return trace;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("trace was never exported");
}

fn drain_channel() -> (mpsc::Sender<StreamEvent>, mpsc::Receiver<StreamEvent>) {
    mpsc::channel(256)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn technical_in_corpus_question_is_grounded() {
    let fx = fixture(
        cloudfuze_kb(),
        "NEW",
        "Slack data is exported as JSON files per channel, as described in the Slack JSON \
         Export guide (slack-json-export.pdf).",
    );

    let (tx, mut rx) = drain_channel();
    let outcome = fx
        .pipeline
        .answer(
            "How does JSON export work in Slack to Teams migration?",
            "u1",
            "s1",
            GenerationMode::Buffered,
            tx,
        )
        .await
        .unwrap();

    assert!(!outcome.refused);
    assert!(outcome.answer.contains("JSON"));
    assert!(!outcome.citations.is_empty());
    assert!(outcome
        .citations
        .iter()
        .any(|c| c.file_name.contains("slack") && c.file_name.contains("json")));

    let trace = exported_trace(&fx.exporter).await;
    assert_eq!(trace.status, TraceStatus::Completed);

    // The fused top-8 leans on authoritative documents
    let fused = trace.span("fuse_boost").unwrap();
    assert!(!fused.candidates.is_empty());
    let document_ids = ["slack-json", "slack-channels", "teams-mapping", "sharepoint-metadata"];
    let documents_in_top8 = fused
        .candidates
        .iter()
        .take(8)
        .filter(|c| document_ids.contains(&c.chunk_id.as_str()))
        .count();
    assert!(documents_in_top8 >= 3);

    // Detected terms include the migration phrase and its components
    let texts: Vec<&str> = trace.detected_terms.iter().map(|t| t.text.as_str()).collect();
    for expected in ["json", "slack", "teams", "migration", "slack to teams"] {
        assert!(texts.contains(&expected), "missing term {}", expected);
    }

    // A done event closed the stream
    let mut saw_done = false;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, StreamEvent::Done { .. }) {
            saw_done = true;
        }
    }
    assert!(saw_done);
}

#[tokio::test]
async fn greeting_refuses_with_identity() {
    let fx = fixture(
        cloudfuze_kb(),
        "NEW",
        "Hello! I'm the CloudFuze Knowledge Assistant. I don't have information to answer \
         generic questions, but I can help with CloudFuze migration topics.",
    );

    let (tx, _rx) = drain_channel();
    let outcome = fx
        .pipeline
        .answer("Hi", "u1", "s1", GenerationMode::Buffered, tx)
        .await
        .unwrap();

    assert!(outcome.refused);
    assert!(outcome.citations.is_empty());
    assert!(outcome.answer.contains("CloudFuze"));
}

#[tokio::test]
async fn followup_carries_prior_turn_into_retrieval() {
    let fx = fixture(
        cloudfuze_kb(),
        "FOLLOWUP",
        "Permissions are mapped after content migration, per the SharePoint permissions guide.",
    );

    // Prior turn about metadata retention referencing SharePoint
    fx.conversations
        .append(
            "u1",
            "s1",
            Turn::user("Does CloudFuze keep metadata when migrating SharePoint?"),
        )
        .await
        .unwrap();
    fx.conversations
        .append(
            "u1",
            "s1",
            Turn::assistant("Yes, created-by metadata is preserved for SharePoint libraries."),
        )
        .await
        .unwrap();

    let (tx, _rx) = drain_channel();
    let outcome = fx
        .pipeline
        .answer(
            "What about permissions?",
            "u1",
            "s1",
            GenerationMode::Buffered,
            tx,
        )
        .await
        .unwrap();
    assert!(!outcome.cancelled);

    let trace = exported_trace(&fx.exporter).await;
    // The prepared question embeds the prior user turn
    assert!(trace
        .prepared_question
        .contains("Does CloudFuze keep metadata when migrating SharePoint?"));
    assert!(trace.prepared_question.ends_with("User: What about permissions?"));

    // Retrieval surfaces the chunks the prior turn was grounded on
    let fused = trace.span("fuse_boost").unwrap();
    assert!(fused
        .candidates
        .iter()
        .any(|c| c.chunk_id.starts_with("sharepoint")));
}

#[tokio::test]
async fn new_topic_isolates_prior_turns() {
    let fx = fixture(cloudfuze_kb(), "NEW", "Slack exports are JSON files.");

    fx.conversations
        .append("u1", "s1", Turn::user("Tell me about SharePoint metadata"))
        .await
        .unwrap();
    fx.conversations
        .append("u1", "s1", Turn::assistant("It is preserved."))
        .await
        .unwrap();

    let (tx, _rx) = drain_channel();
    fx.pipeline
        .answer(
            "How does Slack export work?",
            "u1",
            "s1",
            GenerationMode::Buffered,
            tx,
        )
        .await
        .unwrap();

    let trace = exported_trace(&fx.exporter).await;
    // Invariant: a NEW verdict leaves no prior-turn text in the prepared question
    assert_eq!(trace.prepared_question, "How does Slack export work?");
    assert!(!trace.prepared_question.contains("SharePoint"));
}

#[tokio::test]
async fn unknown_domain_refuses_without_citations() {
    let fx = fixture(
        cloudfuze_kb(),
        "NEW",
        "I don't have information about that topic. I can help with CloudFuze migration \
         questions such as Slack to Teams or SharePoint to OneDrive.",
    );

    let (tx, _rx) = drain_channel();
    let outcome = fx
        .pipeline
        .answer(
            "What is the capital of France?",
            "u1",
            "s1",
            GenerationMode::Buffered,
            tx,
        )
        .await
        .unwrap();

    assert!(outcome.refused);
    assert!(outcome.citations.is_empty());
}

#[tokio::test]
async fn empty_corpus_forces_refusal_closure() {
    // No chunks at all: the assembler returns empty context and the answer
    // must close as a refusal with no citations regardless of model output
    let fx = fixture(Vec::new(), "NEW", "Anything the model might say.");

    let (tx, _rx) = drain_channel();
    let outcome = fx
        .pipeline
        .answer("How does export work?", "u1", "s1", GenerationMode::Buffered, tx)
        .await
        .unwrap();

    assert!(outcome.refused);
    assert!(outcome.citations.is_empty());
}

#[tokio::test]
async fn streaming_tokens_reassemble_into_answer() {
    let fx = fixture(
        cloudfuze_kb(),
        "NEW",
        "Slack exports arrive as JSON files per channel.",
    );

    let (tx, mut rx) = drain_channel();
    let outcome = fx
        .pipeline
        .answer(
            "How does the Slack JSON export work?",
            "u1",
            "s1",
            GenerationMode::Streaming,
            tx,
        )
        .await
        .unwrap();

    let mut statuses = Vec::new();
    let mut tokens = String::new();
    let mut done_seen = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            StreamEvent::Status { tag, .. } => statuses.push(tag),
            StreamEvent::Token { token } => tokens.push_str(&token),
            StreamEvent::Done { refused, .. } => {
                done_seen = true;
                assert!(!refused);
            }
            StreamEvent::Error { message } => panic!("unexpected error: {}", message),
        }
    }

    assert!(done_seen);
    assert_eq!(tokens, outcome.answer);
    // Status events precede token emission
    assert!(statuses.len() >= 3);
}

#[tokio::test]
async fn client_disconnect_cancels_without_done() {
    let fx = fixture(cloudfuze_kb(), "NEW", "answer text");

    let (tx, mut rx) = mpsc::channel::<StreamEvent>(1);
    let pipeline_task = async { fx.pipeline.answer("How does Slack export work?", "u1", "s1", GenerationMode::Streaming, tx).await };

    let client_task = async {
        // Read two status events, then disconnect
        let mut seen = 0;
        while let Some(event) = rx.recv().await {
            if matches!(event, StreamEvent::Status { .. }) {
                seen += 1;
                if seen == 2 {
                    break;
                }
            }
        }
        drop(rx);
    };

    let (outcome, ()) = tokio::join!(pipeline_task, client_task);
    let outcome = outcome.unwrap();
    assert!(outcome.cancelled);

    let trace = exported_trace(&fx.exporter).await;
    assert_eq!(trace.status, TraceStatus::Cancelled);
}

#[tokio::test]
async fn deadline_produces_terminator_error() {
    let slow = Arc::new(ScriptedLlm::slow("too late", Duration::from_secs(5)));
    let fx = fixture_with(cloudfuze_kb(), "NEW", slow, |settings| {
        settings.server.request_deadline_ms = 1_000;
    });

    let (tx, mut rx) = drain_channel();
    let result = fx
        .pipeline
        .answer("How does Slack export work?", "u1", "s1", GenerationMode::Buffered, tx)
        .await;

    assert!(result.is_err());

    let mut saw_error = false;
    while let Ok(event) = rx.try_recv() {
        if let StreamEvent::Error { message } = event {
            saw_error = true;
            // User-visible message carries no internals
            assert!(!message.contains("scripted"));
        }
    }
    assert!(saw_error);
}

#[tokio::test]
async fn completed_answers_append_to_conversation() {
    let fx = fixture(cloudfuze_kb(), "NEW", "Slack exports are JSON files.");

    let (tx, _rx) = drain_channel();
    fx.pipeline
        .answer("How does Slack export work?", "u1", "s1", GenerationMode::Buffered, tx)
        .await
        .unwrap();

    let turns = fx.conversations.context("u1", "s1", 5).await.unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].content, "How does Slack export work?");
    assert_eq!(turns[1].content, "Slack exports are JSON files.");
}

#[tokio::test]
async fn trace_records_all_pipeline_spans() {
    let fx = fixture(cloudfuze_kb(), "NEW", "Slack exports are JSON files.");

    let (tx, _rx) = drain_channel();
    fx.pipeline
        .answer("How does Slack export work?", "u1", "s1", GenerationMode::Buffered, tx)
        .await
        .unwrap();

    let trace = exported_trace(&fx.exporter).await;
    for span in [
        "relevance_gate",
        "query_prepare",
        "dense_retrieve",
        "sparse_retrieve",
        "fuse_boost",
        "assemble_context",
        "compile_prompt",
        "generate",
    ] {
        assert!(trace.span(span).is_some(), "missing span {}", span);
    }
    assert!(!trace.prompt.is_empty());
    assert!(trace.prompt.contains("How does Slack export work?"));
}
