//! Trace recording
//!
//! Builds the per-request span tree as the pipeline runs. Recording is
//! cheap and synchronous; the finished trace is handed to the exporter
//! fire-and-forget so a slow or failing backend never delays the answer.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

use askfuze_core::{
    Candidate, CandidateTrace, DetectedTerm, RequestTrace, Span, TraceExporter, TraceStatus,
};

/// An open span handle
#[must_use = "finish the span to record it"]
pub struct SpanTimer {
    name: &'static str,
    started_at: DateTime<Utc>,
}

struct Inner {
    trace_id: String,
    user_id: String,
    session_id: String,
    question: String,
    prepared_question: String,
    detected_terms: Vec<DetectedTerm>,
    spans: Vec<Span>,
    prompt: String,
    rerank_failed: bool,
    started_at: DateTime<Utc>,
}

/// Collects spans and request fields for one request
pub struct TraceRecorder {
    inner: Mutex<Inner>,
}

impl TraceRecorder {
    pub fn new(trace_id: &str, user_id: &str, session_id: &str, question: &str) -> Self {
        Self {
            inner: Mutex::new(Inner {
                trace_id: trace_id.to_string(),
                user_id: user_id.to_string(),
                session_id: session_id.to_string(),
                question: question.to_string(),
                prepared_question: question.to_string(),
                detected_terms: Vec::new(),
                spans: Vec::new(),
                prompt: String::new(),
                rerank_failed: false,
                started_at: Utc::now(),
            }),
        }
    }

    pub fn start_span(&self, name: &'static str) -> SpanTimer {
        SpanTimer {
            name,
            started_at: Utc::now(),
        }
    }

    pub fn finish_span(
        &self,
        timer: SpanTimer,
        input_summary: impl Into<String>,
        output_summary: impl Into<String>,
        error: Option<String>,
    ) {
        self.finish_span_with_candidates(timer, input_summary, output_summary, error, &[]);
    }

    /// Finish a retrieval span, recording per-candidate scores and reasons
    pub fn finish_span_with_candidates(
        &self,
        timer: SpanTimer,
        input_summary: impl Into<String>,
        output_summary: impl Into<String>,
        error: Option<String>,
        candidates: &[Candidate],
    ) {
        let span = Span {
            name: timer.name.to_string(),
            started_at: timer.started_at,
            ended_at: Utc::now(),
            input_summary: input_summary.into(),
            output_summary: output_summary.into(),
            error,
            candidates: candidates.iter().map(CandidateTrace::from).collect(),
        };
        self.inner.lock().spans.push(span);
    }

    pub fn set_prepared(&self, prepared: &str, terms: &[DetectedTerm]) {
        let mut inner = self.inner.lock();
        inner.prepared_question = prepared.to_string();
        inner.detected_terms = terms.to_vec();
    }

    pub fn set_prompt(&self, prompt: String) {
        self.inner.lock().prompt = prompt;
    }

    pub fn set_rerank_failed(&self) {
        self.inner.lock().rerank_failed = true;
    }

    /// Seal the trace with the terminal status and answer
    pub fn finalize(&self, answer: &str, refused: bool, status: TraceStatus) -> RequestTrace {
        let inner = self.inner.lock();
        RequestTrace {
            trace_id: inner.trace_id.clone(),
            user_id: inner.user_id.clone(),
            session_id: inner.session_id.clone(),
            question: inner.question.clone(),
            prepared_question: inner.prepared_question.clone(),
            detected_terms: inner.detected_terms.clone(),
            spans: inner.spans.clone(),
            prompt: inner.prompt.clone(),
            answer: answer.to_string(),
            refused,
            rerank_failed: inner.rerank_failed,
            status,
            started_at: inner.started_at,
            ended_at: Utc::now(),
        }
    }
}

/// Ship a finished trace without blocking the request
pub fn export_in_background(exporter: Arc<dyn TraceExporter>, trace: RequestTrace) {
    tokio::spawn(async move {
        if let Err(e) = exporter.export(&trace).await {
            tracing::warn!(trace_id = %trace.trace_id, error = %e, "Trace export failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans_accumulate_in_order() {
        let recorder = TraceRecorder::new("t1", "u1", "s1", "question");

        let timer = recorder.start_span("relevance_gate");
        recorder.finish_span(timer, "2 turns", "NEW", None);
        let timer = recorder.start_span("dense_retrieve");
        recorder.finish_span(timer, "query", "0 hits", Some("timeout".into()));

        let trace = recorder.finalize("answer", false, TraceStatus::Completed);
        assert_eq!(trace.spans.len(), 2);
        assert_eq!(trace.spans[0].name, "relevance_gate");
        assert_eq!(trace.spans[1].error.as_deref(), Some("timeout"));
        assert!(trace.spans[0].duration_ms() >= 0);
        assert!(trace.latency_ms() >= 0);
    }

    #[test]
    fn test_finalize_carries_flags() {
        let recorder = TraceRecorder::new("t1", "u1", "s1", "q");
        recorder.set_prepared("prepared q", &[DetectedTerm::new("slack", 2.5)]);
        recorder.set_prompt("full prompt".into());
        recorder.set_rerank_failed();

        let trace = recorder.finalize("", true, TraceStatus::Cancelled);
        assert_eq!(trace.prepared_question, "prepared q");
        assert_eq!(trace.detected_terms.len(), 1);
        assert_eq!(trace.prompt, "full prompt");
        assert!(trace.rerank_failed);
        assert!(trace.refused);
        assert_eq!(trace.status, TraceStatus::Cancelled);
    }
}
