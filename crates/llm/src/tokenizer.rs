//! Token counting
//!
//! The context assembler budgets with the same counter that measures the
//! LLM request. When a tokenizer file is configured, counts come from the
//! real vocabulary; otherwise a grapheme heuristic approximates them.

use std::sync::Arc;

use askfuze_core::TokenCounter;

use crate::LlmError;

/// Grapheme-based estimate, roughly four characters per token for English
pub struct HeuristicTokenCounter;

impl TokenCounter for HeuristicTokenCounter {
    fn count(&self, text: &str) -> usize {
        use unicode_segmentation::UnicodeSegmentation;

        if text.is_empty() {
            return 0;
        }
        (text.graphemes(true).count() / 4).max(1)
    }
}

/// Counter backed by a HuggingFace tokenizer file
pub struct HfTokenCounter {
    tokenizer: tokenizers::Tokenizer,
}

impl HfTokenCounter {
    pub fn from_file(path: &str) -> Result<Self, LlmError> {
        let tokenizer = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| LlmError::Configuration(format!("load tokenizer {}: {}", path, e)))?;
        Ok(Self { tokenizer })
    }
}

impl TokenCounter for HfTokenCounter {
    fn count(&self, text: &str) -> usize {
        match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding.get_ids().len(),
            Err(e) => {
                // Encoding failure is unexpected; overestimating beats
                // blowing the budget
                tracing::warn!(error = %e, "Tokenizer encode failed, using heuristic");
                HeuristicTokenCounter.count(text)
            }
        }
    }
}

/// Build the configured token counter
pub fn load_token_counter(path: Option<&str>) -> Result<Arc<dyn TokenCounter>, LlmError> {
    match path {
        Some(path) => Ok(Arc::new(HfTokenCounter::from_file(path)?)),
        None => Ok(Arc::new(HeuristicTokenCounter)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heuristic_scales_with_length() {
        let counter = HeuristicTokenCounter;
        assert_eq!(counter.count(""), 0);
        assert!(counter.count("word") >= 1);

        let short = counter.count("a short sentence");
        let long = counter.count(&"a short sentence ".repeat(50));
        assert!(long > short * 10);
    }

    #[test]
    fn test_missing_tokenizer_file_is_config_error() {
        let result = HfTokenCounter::from_file("/nonexistent/tokenizer.json");
        assert!(matches!(result, Err(LlmError::Configuration(_))));
    }

    #[test]
    fn test_default_counter_is_heuristic() {
        let counter = load_token_counter(None).unwrap();
        assert!(counter.count("hello world from the test") > 0);
    }
}
