//! Answer stream events
//!
//! The answer stream is a lazy sequence of tagged events. Status events are
//! distinguishable on the wire from content tokens via the `type` field.

use serde::{Deserialize, Serialize};

use crate::retrieval::Citation;

/// Pipeline progress stages announced before token emission begins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusTag {
    Analyzing,
    Retrieving,
    Reranking,
    ReadingSources,
    Generating,
}

impl StatusTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analyzing => "analyzing",
            Self::Retrieving => "retrieving",
            Self::Reranking => "reranking",
            Self::ReadingSources => "reading_sources",
            Self::Generating => "generating",
        }
    }

    /// Default human-readable message for the stage
    pub fn message(&self) -> &'static str {
        match self {
            Self::Analyzing => "Analyzing your question",
            Self::Retrieving => "Searching the knowledge base",
            Self::Reranking => "Ranking the best matches",
            Self::ReadingSources => "Reading the top sources",
            Self::Generating => "Writing the answer",
        }
    }
}

/// One event on the answer stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Status {
        tag: StatusTag,
        message: String,
    },
    Token {
        token: String,
    },
    Done {
        trace_id: String,
        citations: Vec<Citation>,
        refused: bool,
    },
    Error {
        message: String,
    },
}

impl StreamEvent {
    pub fn status(tag: StatusTag) -> Self {
        Self::Status {
            tag,
            message: tag.message().to_string(),
        }
    }

    pub fn token(token: impl Into<String>) -> Self {
        Self::Token {
            token: token.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_distinguishable_on_wire() {
        let status = serde_json::to_value(StreamEvent::status(StatusTag::Retrieving)).unwrap();
        assert_eq!(status["type"], "status");
        assert_eq!(status["tag"], "retrieving");

        let token = serde_json::to_value(StreamEvent::token("hi")).unwrap();
        assert_eq!(token["type"], "token");

        let done = serde_json::to_value(StreamEvent::Done {
            trace_id: "t".into(),
            citations: vec![],
            refused: true,
        })
        .unwrap();
        assert_eq!(done["type"], "done");
        assert_eq!(done["refused"], true);
    }

    #[test]
    fn test_status_tag_wire_names() {
        assert_eq!(StatusTag::ReadingSources.as_str(), "reading_sources");
        let v = serde_json::to_value(StatusTag::ReadingSources).unwrap();
        assert_eq!(v, "reading_sources");
    }
}
