//! Trace exporter implementations
//!
//! The default exporter ships traces and feedback scores to a hosted
//! observability backend over HTTP. When no endpoint is configured the
//! noop exporter keeps the pipeline wiring uniform.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use askfuze_core::{Error, FeedbackRating, RequestTrace, TraceExporter};

/// Exporter configuration
#[derive(Debug, Clone)]
pub struct TraceExporterConfig {
    pub endpoint: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl Default for TraceExporterConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP exporter for a hosted observability backend
pub struct HttpTraceExporter {
    config: TraceExporterConfig,
    client: Client,
}

impl HttpTraceExporter {
    pub fn new(config: TraceExporterConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl TraceExporter for HttpTraceExporter {
    async fn export(&self, trace: &RequestTrace) -> Result<(), Error> {
        let response = self
            .client
            .post(format!("{}/traces", self.config.endpoint))
            .bearer_auth(&self.config.api_key)
            .json(trace)
            .send()
            .await
            .map_err(|e| Error::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Unavailable(format!(
                "trace export HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn score(
        &self,
        trace_id: &str,
        rating: FeedbackRating,
        comment: Option<String>,
    ) -> Result<(), Error> {
        let body = serde_json::json!({
            "trace_id": trace_id,
            "rating": rating,
            "comment": comment,
        });

        let response = self
            .client
            .post(format!("{}/scores", self.config.endpoint))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Unavailable(format!(
                "score export HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Exporter that drops everything; used when no backend is configured
#[derive(Default)]
pub struct NoopTraceExporter;

#[async_trait]
impl TraceExporter for NoopTraceExporter {
    async fn export(&self, _trace: &RequestTrace) -> Result<(), Error> {
        Ok(())
    }

    async fn score(
        &self,
        _trace_id: &str,
        _rating: FeedbackRating,
        _comment: Option<String>,
    ) -> Result<(), Error> {
        Ok(())
    }
}
