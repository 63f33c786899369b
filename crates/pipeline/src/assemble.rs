//! Context assembly
//!
//! Deduplicates the final candidates, walks them in score order under the
//! token budget, and renders each surviving chunk with an attribution
//! header. Curly braces in chunk text are escaped because the compiled
//! prompt travels through brace-sensitive client layers downstream.

use sha2::{Digest, Sha256};

use askfuze_core::{Candidate, TokenCounter};

/// Characters of normalized text hashed for dedup
const HASH_PREFIX_CHARS: usize = 500;

/// The assembled context and the chunks that made it in
#[derive(Debug, Clone, Default)]
pub struct AssembledContext {
    pub text: String,
    pub included: Vec<Candidate>,
    pub token_count: usize,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.included.is_empty()
    }
}

/// Stable content hash: source path plus the normalized head of the text
fn content_hash(candidate: &Candidate) -> [u8; 32] {
    let normalized: String = candidate
        .text
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(HASH_PREFIX_CHARS)
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(candidate.metadata.source_path.as_deref().unwrap_or(""));
    hasher.update([0x1f]);
    hasher.update(normalized.as_bytes());
    hasher.finalize().into()
}

/// Collapse duplicates, keeping the highest-scored instance
///
/// Input is walked in rank order, so the first occurrence of a hash is the
/// winner. Running this twice yields the same list.
pub fn dedup_candidates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(content_hash(c)))
        .collect()
}

/// Escape literal braces so no downstream layer treats chunk text as a
/// template: `{` becomes `{{`, `}` becomes `}}`
pub fn escape_braces(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

fn header(index: usize, candidate: &Candidate) -> String {
    let source_type = candidate
        .metadata
        .source_type
        .map(|s| s.as_str())
        .unwrap_or("document");
    let name = candidate
        .metadata
        .file_name
        .as_deref()
        .or(candidate.metadata.source_path.as_deref())
        .unwrap_or(&candidate.chunk_id);
    format!("[Document {} — {} — {}]", index, source_type, name)
}

/// Assemble chunks under the token budget
///
/// Chunks are added in final-score order; assembly stops at the first
/// chunk that would push the context past the budget, measured with the
/// same counter the LLM request is budgeted with. An empty result is
/// valid and drives the downstream refusal.
pub fn assemble_context(
    candidates: Vec<Candidate>,
    budget: usize,
    counter: &dyn TokenCounter,
) -> AssembledContext {
    let deduped = dedup_candidates(candidates);

    let mut text = String::new();
    let mut included = Vec::new();

    for candidate in deduped {
        let block = format!(
            "{}\n{}",
            header(included.len() + 1, &candidate),
            escape_braces(&candidate.text)
        );
        let tentative = if text.is_empty() {
            block.clone()
        } else {
            format!("{}\n\n{}", text, block)
        };

        if counter.count(&tentative) > budget {
            break;
        }
        text = tentative;
        included.push(candidate);
    }

    let token_count = counter.count(&text);
    AssembledContext {
        text,
        included,
        token_count,
    }
}
