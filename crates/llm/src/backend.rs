//! Messages-API backend
//!
//! Implements the Anthropic Messages API for both one-shot completions and
//! SSE token streaming. Non-streaming calls retry transient failures with
//! exponential backoff and jitter; a generation already streaming is never
//! retried. When the downstream token channel closes, the response stream
//! is dropped, which aborts the upstream call.

use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

use askfuze_core::{CompletionRequest, Error, LlmBackend, StreamOutcome};

use crate::LlmError;

const API_VERSION: &str = "2023-06-01";

/// Messages backend configuration
#[derive(Debug, Clone)]
pub struct MessagesClientConfig {
    /// API origin, e.g. `https://api.anthropic.com`
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for MessagesClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.anthropic.com".to_string(),
            api_key: String::new(),
            model: "claude-sonnet-4-20250514".to_string(),
            timeout: Duration::from_secs(60),
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

/// LLM backend over the Messages API
pub struct MessagesBackend {
    config: MessagesClientConfig,
    client: Client,
}

impl MessagesBackend {
    pub fn new(config: MessagesClientConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::Configuration(
                "LLM API key not set. Set endpoints.llm_api_key or the provider env var."
                    .to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn build_request(&self, request: &CompletionRequest, stream: bool) -> ApiRequest {
        ApiRequest {
            model: self.config.model.clone(),
            max_tokens: request.max_tokens,
            messages: vec![ApiMessage {
                role: "user".to_string(),
                content: request.user.clone(),
            }],
            system: request.system.clone(),
            temperature: Some(request.temperature),
            stream: Some(stream),
        }
    }

    async fn send(&self, body: &ApiRequest) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.endpoint))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited(format!("HTTP {}", status)));
        }
        if status.is_server_error() {
            return Err(LlmError::Network(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
        }
        Ok(response)
    }

    async fn complete_once(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let body = self.build_request(request, false);
        let response = self.send(&body).await?;

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let text = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
            })
            .collect::<Vec<_>>()
            .join("");

        Ok(text)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.config.initial_backoff.saturating_mul(1u32 << attempt.min(8));
        let jitter = rand::thread_rng().gen_range(0..=base.as_millis().max(1) as u64 / 2);
        base + Duration::from_millis(jitter)
    }
}

#[async_trait]
impl LlmBackend for MessagesBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<String, Error> {
        let mut attempt = 0;
        loop {
            match self.complete_once(&request).await {
                Ok(text) => return Ok(text),
                Err(err)
                    if attempt < self.config.max_retries
                        && matches!(
                            err,
                            LlmError::RateLimited(_) | LlmError::Network(_) | LlmError::Timeout
                        ) =>
                {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "LLM completion failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn stream(
        &self,
        request: CompletionRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<StreamOutcome, Error> {
        let body = self.build_request(&request, true);
        let response = self.send(&body).await.map_err(Error::from)?;

        use futures::StreamExt;
        let mut byte_stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut full_text = String::new();
        let mut output_tokens = 0usize;
        let mut cancelled = false;

        'outer: while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.map_err(|e| Error::Unavailable(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].trim().to_string();
                buffer = buffer[line_end + 1..].to_string();

                if line.is_empty() {
                    continue;
                }

                let Some(json_str) = line.strip_prefix("data: ") else {
                    continue;
                };

                let Ok(event) = serde_json::from_str::<StreamEvent>(json_str) else {
                    continue;
                };

                match event {
                    StreamEvent::ContentBlockDelta { delta, .. } => {
                        if let Delta::TextDelta { text } = delta {
                            full_text.push_str(&text);
                            if tx.send(text).await.is_err() {
                                // Consumer is gone; dropping the byte stream
                                // below closes the upstream connection
                                cancelled = true;
                                break 'outer;
                            }
                        }
                    }
                    StreamEvent::MessageDelta { usage, .. } => {
                        if let Some(u) = usage {
                            output_tokens = u.output_tokens;
                        }
                    }
                    StreamEvent::Error { error } => {
                        return Err(Error::Llm(error.message));
                    }
                    _ => {}
                }
            }
        }

        drop(byte_stream);

        Ok(StreamOutcome {
            text: full_text,
            output_tokens,
            cancelled,
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// =============================================================================
// API types
// =============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: usize,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[allow(dead_code)] // Fields required for serde deserialization
enum StreamEvent {
    MessageStart {
        message: serde_json::Value,
    },
    ContentBlockStart {
        index: usize,
        content_block: serde_json::Value,
    },
    ContentBlockDelta {
        index: usize,
        delta: Delta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: serde_json::Value,
        usage: Option<UsageDelta>,
    },
    MessageStop,
    Ping,
    Error {
        error: ApiError,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
}

#[derive(Debug, Deserialize)]
struct UsageDelta {
    output_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_rejected() {
        let result = MessagesBackend::new(MessagesClientConfig::default());
        assert!(matches!(result, Err(LlmError::Configuration(_))));
    }

    #[test]
    fn test_request_serialization() {
        let config = MessagesClientConfig {
            api_key: "test-key".to_string(),
            ..Default::default()
        };
        let backend = MessagesBackend::new(config).unwrap();
        let request = CompletionRequest::new("Hello")
            .with_system("You are helpful")
            .with_temperature(0.2)
            .with_max_tokens(100);

        let body = backend.build_request(&request, false);
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("Hello"));
        assert!(json.contains("You are helpful"));
        assert!(json.contains("\"max_tokens\":100"));
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{
            "content": [{"type": "text", "text": "Hi there"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 3}
        }"#;
        let parsed: ApiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.content.len(), 1);
    }

    #[test]
    fn test_stream_event_parsing() {
        let json = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"tok"}}"#;
        let event: StreamEvent = serde_json::from_str(json).unwrap();
        match event {
            StreamEvent::ContentBlockDelta {
                delta: Delta::TextDelta { text },
                ..
            } => assert_eq!(text, "tok"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_usage_delta_parsing() {
        let json = r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":42}}"#;
        let event: StreamEvent = serde_json::from_str(json).unwrap();
        match event {
            StreamEvent::MessageDelta { usage, .. } => {
                assert_eq!(usage.unwrap().output_tokens, 42);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
