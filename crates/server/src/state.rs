//! Application state
//!
//! Shared, immutable after startup. The pipeline and feedback store are
//! the only entry points handlers need; the validator seam lets tests and
//! deployments swap authentication.

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use askfuze_config::Settings;
use askfuze_pipeline::{AnswerPipeline, FeedbackStore};

use crate::auth::TokenValidator;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub pipeline: Arc<AnswerPipeline>,
    pub feedback: Arc<FeedbackStore>,
    pub validator: Arc<dyn TokenValidator>,
    /// Render handle for `/metrics`; absent in tests
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        settings: Arc<Settings>,
        pipeline: Arc<AnswerPipeline>,
        feedback: Arc<FeedbackStore>,
        validator: Arc<dyn TokenValidator>,
    ) -> Self {
        Self {
            settings,
            pipeline,
            feedback,
            validator,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
