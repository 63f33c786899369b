//! Query and document tokenization
//!
//! One tokenizer is shared by term detection and the sparse index so the
//! same text always yields the same token bag.

/// Lowercase alphanumeric tokens, in input order
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}
