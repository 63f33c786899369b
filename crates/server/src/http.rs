//! HTTP endpoints
//!
//! `POST /ask` answers in one response; `POST /ask/stream` delivers the
//! same pipeline as server-sent events; `POST /feedback` attaches a rating
//! to a trace. Authentication runs as middleware; handlers additionally
//! verify that the body's user id matches the authenticated identity.

use axum::{
    extract::rejection::JsonRejection,
    extract::{Json, State},
    http::{HeaderValue, Method, StatusCode},
    middleware,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{get, post},
    Extension, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use askfuze_core::{Citation, FeedbackRating, StreamEvent};
use askfuze_pipeline::{GenerationMode, PipelineError};

use crate::auth::{auth_middleware, AuthenticatedUser};
use crate::state::AppState;

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(
        &state.settings.server.cors_origins,
        state.settings.server.cors_enabled,
    );

    Router::new()
        .route("/ask", post(ask))
        .route("/ask/stream", post(ask_stream))
        .route("/feedback", post(feedback))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// CORS from configured origins; permissive only when disabled outright
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin, "Invalid CORS origin, skipping");
                None
            }
        })
        .collect();

    if parsed.is_empty() {
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);
    }

    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

// ---------------------------------------------------------------------------
// Request/response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AskRequest {
    question: String,
    user_id: String,
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct AskResponse {
    answer: String,
    trace_id: String,
    citations: Vec<Citation>,
    refused: bool,
}

#[derive(Debug, Deserialize)]
struct FeedbackRequest {
    trace_id: String,
    rating: FeedbackRating,
    comment: Option<String>,
}

/// Error payload with its HTTP status
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = match err {
            PipelineError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            PipelineError::Upstream(_) | PipelineError::Deadline => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            PipelineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, err.user_message())
    }
}

fn validate_ask(
    body: Result<Json<AskRequest>, JsonRejection>,
    auth: &AuthenticatedUser,
) -> Result<AskRequest, ApiError> {
    let Json(request) = body
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, format!("Malformed body: {}", e)))?;

    if request.question.trim().is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "question must not be empty",
        ));
    }
    if request.user_id != auth.user_id {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "user_id does not match the authenticated user",
        ));
    }
    Ok(request)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Non-streaming ask
async fn ask(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    body: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let request = validate_ask(body, &auth)?;
    let session_id = request.session_id.unwrap_or_else(|| "default".to_string());

    // Nothing consumes progress events on the buffered path; keep the
    // receiver alive so the pipeline never observes a closed channel
    let (tx, _rx) = mpsc::channel::<StreamEvent>(64);
    let outcome = state
        .pipeline
        .answer(
            &request.question,
            &auth.user_id,
            &session_id,
            GenerationMode::Buffered,
            tx,
        )
        .await?;

    Ok(Json(AskResponse {
        answer: outcome.answer,
        trace_id: outcome.trace_id,
        citations: outcome.citations,
        refused: outcome.refused,
    }))
}

/// Streaming ask over server-sent events
async fn ask_stream(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    body: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Sse<impl futures::Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let request = validate_ask(body, &auth)?;
    let session_id = request.session_id.unwrap_or_else(|| "default".to_string());

    let (tx, rx) = mpsc::channel::<StreamEvent>(64);
    let pipeline = state.pipeline.clone();
    let user_id = auth.user_id.clone();

    // The pipeline owns the send side; when the client disconnects the
    // receiver drops, sends fail, and generation aborts upstream
    tokio::spawn(async move {
        let _ = pipeline
            .answer(
                &request.question,
                &user_id,
                &session_id,
                GenerationMode::Streaming,
                tx,
            )
            .await;
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event)
            .unwrap_or_else(|_| r#"{"type":"error","message":"serialization failed"}"#.to_string());
        Ok(Event::default().data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Attach feedback to a trace; idempotent per `(trace_id, user_id)`
async fn feedback(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    body: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(request) = body
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, format!("Malformed body: {}", e)))?;

    if request.trace_id.trim().is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "trace_id must not be empty",
        ));
    }

    state
        .feedback
        .submit(
            &request.trace_id,
            &auth.user_id,
            request.rating,
            request.comment,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Feedback submission failed");
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "feedback not recorded")
        })?;

    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness: the LLM endpoint must be reachable
async fn ready(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let llm_endpoint = state.settings.endpoints.llm_endpoint.clone();

    let reachable = matches!(
        tokio::time::timeout(
            std::time::Duration::from_secs(2),
            reqwest::get(&llm_endpoint)
        )
        .await,
        Ok(Ok(_))
    );

    let status = if reachable { "ready" } else { "not_ready" };
    let code = if reachable {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(serde_json::json!({
            "status": status,
            "checks": { "llm_endpoint": { "reachable": reachable } },
        })),
    )
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics not initialized").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_status_mapping() {
        let cases = [
            (
                PipelineError::RateLimited("429".into()),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                PipelineError::Upstream("down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (PipelineError::Deadline, StatusCode::SERVICE_UNAVAILABLE),
            (
                PipelineError::Internal("bug".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status, expected);
        }
    }

    #[test]
    fn test_user_mismatch_forbidden() {
        let auth = AuthenticatedUser {
            user_id: "alice".into(),
        };
        let body = Ok(Json(AskRequest {
            question: "q".into(),
            user_id: "bob".into(),
            session_id: None,
        }));
        let err = validate_ask(body, &auth).unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_empty_question_rejected() {
        let auth = AuthenticatedUser {
            user_id: "alice".into(),
        };
        let body = Ok(Json(AskRequest {
            question: "   ".into(),
            user_id: "alice".into(),
            session_id: None,
        }));
        let err = validate_ask(body, &auth).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_feedback_rating_wire_format() {
        let request: FeedbackRequest =
            serde_json::from_str(r#"{"trace_id": "t1", "rating": "down", "comment": "off"}"#)
                .unwrap();
        assert_eq!(request.rating, FeedbackRating::Down);
    }
}
