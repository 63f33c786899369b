//! Relevance gate
//!
//! Decides whether the current question continues the prior conversation
//! or opens a new topic, preventing context bleed from unrelated earlier
//! turns. A small model classifies with a strict one-token output; the
//! gate fails open to FOLLOWUP because downstream tolerates extra context
//! far better than missing context.

use std::collections::HashSet;
use std::sync::Arc;

use askfuze_core::{CompletionRequest, LlmBackend};

/// Classifier verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Followup,
    New,
}

impl GateDecision {
    pub fn is_followup(&self) -> bool {
        matches!(self, GateDecision::Followup)
    }
}

const GATE_SYSTEM: &str = "You decide whether a user's new question continues the prior \
conversation or starts a new topic. Respond with exactly one word: FOLLOWUP if the question \
references entities, pronouns or intent from the conversation, or NEW if it stands alone. \
Do not explain.";

/// Minimum share of question content words found in the context for the
/// overlap second opinion to flip a NEW verdict
const OVERLAP_THRESHOLD: f32 = 0.5;

/// Follow-up classifier over a small LLM
pub struct RelevanceGate {
    llm: Arc<dyn LlmBackend>,
    overlap_check: bool,
}

impl RelevanceGate {
    pub fn new(llm: Arc<dyn LlmBackend>) -> Self {
        Self {
            llm,
            overlap_check: false,
        }
    }

    /// Enable the token-overlap second opinion on NEW verdicts
    pub fn with_overlap_check(mut self, enabled: bool) -> Self {
        self.overlap_check = enabled;
        self
    }

    /// Classify the question against the serialized conversation context.
    ///
    /// Never raises: an empty context is NEW, a classifier failure is
    /// FOLLOWUP.
    pub async fn classify(&self, question: &str, context: &str) -> GateDecision {
        if context.trim().is_empty() {
            return GateDecision::New;
        }

        let user = format!(
            "Conversation so far:\n{}\n\nNew question: {}\n\nAnswer FOLLOWUP or NEW.",
            context, question
        );
        let request = CompletionRequest::new(user)
            .with_system(GATE_SYSTEM)
            .with_temperature(0.0)
            .with_max_tokens(50);

        let decision = match self.llm.complete(request).await {
            Ok(response) => Self::parse_verdict(&response),
            Err(e) => {
                tracing::warn!(error = %e, "Relevance gate classifier failed, keeping context");
                GateDecision::Followup
            }
        };

        if decision == GateDecision::New
            && self.overlap_check
            && token_overlap(question, context) >= OVERLAP_THRESHOLD
        {
            tracing::debug!("Overlap second opinion flipped NEW to FOLLOWUP");
            return GateDecision::Followup;
        }

        decision
    }

    /// First occurrence of either keyword wins; neither keyword present is
    /// treated as a classifier failure and keeps the context
    fn parse_verdict(response: &str) -> GateDecision {
        let upper = response.to_uppercase();
        match (upper.find("FOLLOWUP"), upper.find("NEW")) {
            (Some(f), Some(n)) if n < f => GateDecision::New,
            (Some(_), _) => GateDecision::Followup,
            (None, Some(_)) => GateDecision::New,
            (None, None) => GateDecision::Followup,
        }
    }
}

/// Share of the question's content words that appear in the context
fn token_overlap(question: &str, context: &str) -> f32 {
    let content_words = |text: &str| -> HashSet<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 3)
            .map(|w| w.to_string())
            .collect()
    };

    let question_words = content_words(question);
    if question_words.is_empty() {
        return 0.0;
    }
    let context_words = content_words(context);
    let shared = question_words
        .iter()
        .filter(|w| context_words.contains(*w))
        .count();
    shared as f32 / question_words.len() as f32
}
