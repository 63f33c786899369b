//! Detected-term types
//!
//! Query state is ephemeral: the prepared question and its detected terms
//! live for one request and are released on response completion.

use serde::{Deserialize, Serialize};

/// A technical term detected in the prepared question
///
/// Weights come from the static term dictionaries and fall in [2.0, 3.5].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedTerm {
    pub text: String,
    pub weight: f32,
}

impl DetectedTerm {
    pub fn new(text: impl Into<String>, weight: f32) -> Self {
        Self {
            text: text.into(),
            weight,
        }
    }
}
