//! The answer engine
//!
//! One request flows: relevance gate -> query prepare -> dense + sparse
//! retrieval -> fusion and boosts -> rerank -> context assembly -> prompt
//! compilation -> generation. Every stage lands in the trace; status
//! events precede token emission so clients can show progress.
//!
//! Failure posture: the gate, dense retrieval and the reranker degrade
//! in place; only LLM failure and the global deadline reach the caller.
//! Client disconnect is detected on the next event send and aborts the
//! upstream generation within one token chunk.

use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use askfuze_core::{
    Candidate, Citation, CompletionRequest, StatusTag, StreamEvent, TraceStatus, Turn,
};
use askfuze_llm::{GateDecision, RelevanceGate};
use askfuze_rag::{detect_terms, HybridRetriever};

use crate::assemble::assemble_context;
use crate::prepare::{gate_context, prepare_question};
use crate::trace::{export_in_background, TraceRecorder};
use crate::{PipelineError, Registry};

/// How the answer is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    /// One-shot completion; transient upstream failures are retried
    Buffered,
    /// Token streaming; never retried mid-flight
    Streaming,
}

/// Final result of a request
#[derive(Debug, Clone)]
pub struct AskOutcome {
    pub answer: String,
    pub trace_id: String,
    pub citations: Vec<Citation>,
    pub refused: bool,
    /// The client went away before completion; no `done` event was sent
    pub cancelled: bool,
}

struct RunResult {
    answer: String,
    citations: Vec<Citation>,
    refused: bool,
    cancelled: bool,
}

impl RunResult {
    fn cancelled_early() -> Self {
        Self {
            answer: String::new(),
            citations: Vec::new(),
            refused: false,
            cancelled: true,
        }
    }
}

/// The wired pipeline, shared across requests
pub struct AnswerPipeline {
    registry: Registry,
    retriever: HybridRetriever,
    gate: RelevanceGate,
}

impl AnswerPipeline {
    pub fn new(registry: Registry) -> Self {
        let mut retriever = HybridRetriever::new(
            registry.settings.retrieval.clone(),
            registry.embedder.clone(),
            registry.vectors.clone(),
            registry.sparse.clone(),
        );
        if let Some(reranker) = registry.reranker.clone() {
            retriever = retriever.with_reranker(reranker);
        }

        let gate = RelevanceGate::new(registry.gate_llm.clone())
            .with_overlap_check(registry.settings.gate.overlap_check);

        Self {
            registry,
            retriever,
            gate,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Answer one question, emitting events on `events` as the pipeline
    /// progresses. The whole request runs under the configured deadline.
    pub async fn answer(
        &self,
        question: &str,
        user_id: &str,
        session_id: &str,
        mode: GenerationMode,
        events: mpsc::Sender<StreamEvent>,
    ) -> Result<AskOutcome, PipelineError> {
        let trace_id = Uuid::new_v4().to_string();
        let recorder = TraceRecorder::new(&trace_id, user_id, session_id, question);
        let deadline = Duration::from_millis(self.registry.settings.server.request_deadline_ms);
        let started = std::time::Instant::now();

        metrics::counter!("askfuze_requests_total").increment(1);

        let result = tokio::time::timeout(
            deadline,
            self.run(&recorder, question, user_id, session_id, mode, &events),
        )
        .await;

        let outcome = match result {
            Err(_) => {
                tracing::warn!(trace_id = %trace_id, "Request deadline exceeded");
                // Explicit terminator so a partial stream is closed cleanly
                let _ = events
                    .send(StreamEvent::Error {
                        message: PipelineError::Deadline.user_message().to_string(),
                    })
                    .await;
                let trace = recorder.finalize("", false, TraceStatus::Failed);
                export_in_background(self.registry.exporter.clone(), trace);
                Err(PipelineError::Deadline)
            }
            Ok(Err(err)) => {
                tracing::error!(trace_id = %trace_id, error = %err, "Pipeline failed");
                let _ = events
                    .send(StreamEvent::Error {
                        message: err.user_message().to_string(),
                    })
                    .await;
                let trace = recorder.finalize("", false, TraceStatus::Failed);
                export_in_background(self.registry.exporter.clone(), trace);
                Err(err)
            }
            Ok(Ok(run)) if run.cancelled => {
                let trace = recorder.finalize(&run.answer, run.refused, TraceStatus::Cancelled);
                export_in_background(self.registry.exporter.clone(), trace);
                Ok(AskOutcome {
                    answer: run.answer,
                    trace_id: trace_id.clone(),
                    citations: run.citations,
                    refused: run.refused,
                    cancelled: true,
                })
            }
            Ok(Ok(run)) => {
                if run.refused {
                    metrics::counter!("askfuze_refusals_total").increment(1);
                }
                let trace = recorder.finalize(&run.answer, run.refused, TraceStatus::Completed);
                export_in_background(self.registry.exporter.clone(), trace);

                self.append_turns(user_id, session_id, question, &run.answer)
                    .await;

                let _ = events
                    .send(StreamEvent::Done {
                        trace_id: trace_id.clone(),
                        citations: run.citations.clone(),
                        refused: run.refused,
                    })
                    .await;

                Ok(AskOutcome {
                    answer: run.answer,
                    trace_id: trace_id.clone(),
                    citations: run.citations,
                    refused: run.refused,
                    cancelled: false,
                })
            }
        };

        metrics::histogram!("askfuze_request_seconds").record(started.elapsed().as_secs_f64());
        outcome
    }

    async fn run(
        &self,
        recorder: &TraceRecorder,
        question: &str,
        user_id: &str,
        session_id: &str,
        mode: GenerationMode,
        events: &mpsc::Sender<StreamEvent>,
    ) -> Result<RunResult, PipelineError> {
        let settings = &self.registry.settings;

        if events
            .send(StreamEvent::status(StatusTag::Analyzing))
            .await
            .is_err()
        {
            return Ok(RunResult::cancelled_early());
        }

        // Relevance gate
        let timer = recorder.start_span("relevance_gate");
        let turns = match self
            .registry
            .conversations
            .context(user_id, session_id, settings.gate.classifier_max_pairs)
            .await
        {
            Ok(turns) => turns,
            Err(e) => {
                tracing::warn!(error = %e, "Conversation store read failed, assuming no history");
                Vec::new()
            }
        };
        let classifier_ctx = gate_context(
            &turns,
            settings.gate.classifier_max_pairs,
            settings.gate.classifier_max_tokens,
            self.registry.tokens.as_ref(),
        );
        let decision = self.gate.classify(question, &classifier_ctx).await;
        recorder.finish_span(
            timer,
            format!("{} prior turns", turns.len()),
            match decision {
                GateDecision::Followup => "FOLLOWUP",
                GateDecision::New => "NEW",
            },
            None,
        );

        // Query preparation and term detection
        let timer = recorder.start_span("query_prepare");
        let prepared = prepare_question(
            decision,
            &turns,
            question,
            settings.gate.conversation_max_pairs,
        );
        let terms = detect_terms(&prepared);
        recorder.set_prepared(&prepared, &terms);
        recorder.finish_span(
            timer,
            question.to_string(),
            format!("{} detected terms", terms.len()),
            None,
        );

        // Dense and sparse retrieval, concurrently, each with its own span.
        // Either side failing degrades to an empty list for that side.
        if events
            .send(StreamEvent::status(StatusTag::Retrieving))
            .await
            .is_err()
        {
            return Ok(RunResult::cancelled_early());
        }

        let dense_fut = async {
            let timer = recorder.start_span("dense_retrieve");
            match self.retriever.search_dense(&prepared, &terms).await {
                Ok(hits) => {
                    recorder.finish_span(
                        timer,
                        format!("k={}", settings.retrieval.dense_k),
                        format!("{} hits", hits.len()),
                        None,
                    );
                    hits
                }
                Err(e) => {
                    recorder.finish_span(
                        timer,
                        format!("k={}", settings.retrieval.dense_k),
                        "0 hits",
                        Some(e.to_string()),
                    );
                    Vec::new()
                }
            }
        };
        let sparse_fut = async {
            let timer = recorder.start_span("sparse_retrieve");
            match self.retriever.search_sparse(&prepared).await {
                Ok(hits) => {
                    recorder.finish_span(
                        timer,
                        format!("k={}", settings.retrieval.sparse_k),
                        format!("{} hits", hits.len()),
                        None,
                    );
                    hits
                }
                Err(e) => {
                    recorder.finish_span(
                        timer,
                        format!("k={}", settings.retrieval.sparse_k),
                        "0 hits",
                        Some(e.to_string()),
                    );
                    Vec::new()
                }
            }
        };
        let (dense, sparse) = tokio::join!(dense_fut, sparse_fut);

        // Fusion and boosts
        let timer = recorder.start_span("fuse_boost");
        let fused = self.retriever.fuse(&dense, &sparse, &terms);
        recorder.finish_span_with_candidates(
            timer,
            format!("{} dense + {} sparse", dense.len(), sparse.len()),
            format!("{} fused", fused.len()),
            None,
            &fused,
        );

        // Rerank (optional; failure keeps fusion order)
        let mut candidates = if settings.retrieval.rerank_enabled && !fused.is_empty() {
            if events
                .send(StreamEvent::status(StatusTag::Reranking))
                .await
                .is_err()
            {
                return Ok(RunResult::cancelled_early());
            }
            let timer = recorder.start_span("rerank");
            let (ranked, failed) = self.retriever.rerank(&prepared, fused).await;
            if failed {
                recorder.set_rerank_failed();
                metrics::counter!("askfuze_rerank_failures_total").increment(1);
            }
            recorder.finish_span_with_candidates(
                timer,
                format!("{} candidates", ranked.len()),
                if settings.retrieval.rerank_shadow {
                    "shadow: scores recorded, order kept"
                } else {
                    "reordered"
                },
                failed.then(|| "reranker failed, fusion order kept".to_string()),
                &ranked,
            );
            ranked
        } else {
            fused
        };
        candidates.truncate(settings.retrieval.final_k);

        // Context assembly under the token budget
        if events
            .send(StreamEvent::status(StatusTag::ReadingSources))
            .await
            .is_err()
        {
            return Ok(RunResult::cancelled_early());
        }
        let candidate_count = candidates.len();
        let timer = recorder.start_span("assemble_context");
        let assembled = assemble_context(
            candidates,
            settings.context.token_budget,
            self.registry.tokens.as_ref(),
        );
        recorder.finish_span(
            timer,
            format!("{} candidates", candidate_count),
            format!(
                "{} chunks, {} tokens",
                assembled.included.len(),
                assembled.token_count
            ),
            None,
        );

        // Prompt compilation
        let timer = recorder.start_span("compile_prompt");
        let compiled = self.registry.template.compile(&assembled.text, &prepared);
        recorder.set_prompt(compiled.concatenated());
        recorder.finish_span(
            timer,
            format!("{} context chars", assembled.text.len()),
            format!("{} prompt chars", compiled.system_text.len()),
            None,
        );

        // Generation
        if events
            .send(StreamEvent::status(StatusTag::Generating))
            .await
            .is_err()
        {
            return Ok(RunResult::cancelled_early());
        }
        let request = CompletionRequest {
            system: Some(compiled.system_text),
            user: compiled.user_text,
            temperature: settings.generation.temperature,
            max_tokens: settings.generation.max_output_tokens,
        };

        let timer = recorder.start_span("generate");
        let (answer, cancelled) = match mode {
            GenerationMode::Buffered => match self.registry.llm.complete(request).await {
                Ok(text) => (text, false),
                Err(e) => {
                    recorder.finish_span(
                        timer,
                        self.registry.llm.model_name().to_string(),
                        "",
                        Some(e.to_string()),
                    );
                    return Err(e.into());
                }
            },
            GenerationMode::Streaming => {
                let (tx, mut rx) = mpsc::channel::<String>(32);
                let stream_fut = self.registry.llm.stream(request, tx);
                let forward_fut = async {
                    let mut client_gone = false;
                    while let Some(token) = rx.recv().await {
                        if events.send(StreamEvent::token(token)).await.is_err() {
                            // Dropping rx below closes the channel and the
                            // backend aborts the upstream call
                            client_gone = true;
                            break;
                        }
                    }
                    client_gone
                };
                let (stream_result, client_gone) = tokio::join!(stream_fut, forward_fut);
                match stream_result {
                    Ok(outcome) => (outcome.text, outcome.cancelled || client_gone),
                    Err(e) => {
                        recorder.finish_span(
                            timer,
                            self.registry.llm.model_name().to_string(),
                            "",
                            Some(e.to_string()),
                        );
                        return Err(e.into());
                    }
                }
            }
        };
        recorder.finish_span(
            timer,
            self.registry.llm.model_name().to_string(),
            format!(
                "{} chars{}",
                answer.len(),
                if cancelled { " (cancelled)" } else { "" }
            ),
            None,
        );

        // Empty context forces a refusal by construction; otherwise detect
        // the refusal sentence the system prompt mandates
        let refused = assembled.is_empty() || looks_like_refusal(&answer);
        let citations = if refused {
            Vec::new()
        } else {
            collect_citations(&assembled.included)
        };

        Ok(RunResult {
            answer,
            citations,
            refused,
            cancelled,
        })
    }

    async fn append_turns(&self, user_id: &str, session_id: &str, question: &str, answer: &str) {
        for turn in [Turn::user(question), Turn::assistant(answer)] {
            if let Err(e) = self
                .registry
                .conversations
                .append(user_id, session_id, turn)
                .await
            {
                tracing::warn!(error = %e, "Conversation append failed");
                return;
            }
        }
    }
}

/// The refusal sentence the system prompt instructs the model to produce
fn looks_like_refusal(answer: &str) -> bool {
    let lower = answer.to_lowercase();
    lower.contains("don't have information") || lower.contains("do not have information")
}

/// Unique citations in rank order; internal metadata never leaks
fn collect_citations(included: &[Candidate]) -> Vec<Citation> {
    let mut seen = std::collections::HashSet::new();
    included
        .iter()
        .filter_map(|c| Citation::from_metadata(&c.metadata))
        .filter(|c| seen.insert(c.file_name.clone()))
        .collect()
}
