//! Query preparation
//!
//! Forms the prepared question used by retrieval and generation. When the
//! relevance gate says FOLLOWUP, a serialized window of recent turns is
//! prepended; otherwise the raw question passes through untouched so a new
//! topic never drags along stale context.

use askfuze_core::{TokenCounter, Turn};
use askfuze_llm::GateDecision;

/// Character cap on the prepared-question window
const WINDOW_MAX_CHARS: usize = 1500;

/// Serialize the most recent turns as a conversation window
///
/// Pairs are rendered `User: ...` / `Assistant: ...` with blank lines
/// between pairs. The window keeps at most `max_pairs` pairs and at most
/// `max_chars` characters, dropping oldest turns first.
pub fn serialize_window(turns: &[Turn], max_pairs: usize, max_chars: usize) -> String {
    let recent: &[Turn] = if turns.len() > max_pairs * 2 {
        &turns[turns.len() - max_pairs * 2..]
    } else {
        turns
    };

    // Drop oldest turns until the serialized form fits the character cap
    let mut start = 0;
    loop {
        let window = render(&recent[start..]);
        if window.len() <= max_chars || start + 1 >= recent.len() {
            return window;
        }
        start += 1;
    }
}

fn render(turns: &[Turn]) -> String {
    let mut out = String::new();
    for turn in turns {
        if !out.is_empty() {
            // Blank line before each user turn groups the pairs
            if turn.role == askfuze_core::TurnRole::User {
                out.push_str("\n\n");
            } else {
                out.push('\n');
            }
        }
        out.push_str(turn.role.label());
        out.push_str(": ");
        out.push_str(&turn.content);
    }
    out
}

/// The prepared question: raw, or window-prefixed on follow-up
pub fn prepare_question(decision: GateDecision, turns: &[Turn], question: &str, max_pairs: usize) -> String {
    if !decision.is_followup() {
        return question.to_string();
    }

    let window = serialize_window(turns, max_pairs, WINDOW_MAX_CHARS);
    if window.is_empty() {
        return question.to_string();
    }
    format!("{}\n\nUser: {}", window, question)
}

/// Serialize context for the gate classifier itself: at most `max_pairs`
/// pairs and `max_tokens` tokens, dropping oldest turns first
pub fn gate_context(
    turns: &[Turn],
    max_pairs: usize,
    max_tokens: usize,
    counter: &dyn TokenCounter,
) -> String {
    let recent: &[Turn] = if turns.len() > max_pairs * 2 {
        &turns[turns.len() - max_pairs * 2..]
    } else {
        turns
    };

    let mut start = 0;
    loop {
        let window = render(&recent[start..]);
        if counter.count(&window) <= max_tokens || start + 1 >= recent.len() {
            return window;
        }
        start += 1;
    }
}
