//! Authentication middleware
//!
//! Bearer-token validation is delegated to an external collaborator behind
//! the `TokenValidator` trait; this layer only extracts the header, asks
//! the validator for the authenticated user id, and attaches it to the
//! request. Handlers compare it against any user id in the body.

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::state::AppState;

/// Paths served without authentication
const PUBLIC_PATHS: &[&str] = &["/health", "/ready", "/metrics"];

/// The identity attached to an authenticated request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

/// External token validation contract
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Resolve a bearer token to an authenticated user id, or None when
    /// the token is invalid or expired
    async fn validate(&self, token: &str) -> Option<AuthenticatedUser>;
}

/// Development validator: the bearer token is taken as the user id.
///
/// Real deployments plug the identity provider's validator in here.
pub struct IdentityTokenValidator;

#[async_trait]
impl TokenValidator for IdentityTokenValidator {
    async fn validate(&self, token: &str) -> Option<AuthenticatedUser> {
        if token.is_empty() {
            return None;
        }
        Some(AuthenticatedUser {
            user_id: token.to_string(),
        })
    }
}

/// Require a valid `Authorization: Bearer <token>` on non-public paths
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if PUBLIC_PATHS.iter().any(|p| path.starts_with(p)) {
        return next.run(request).await;
    }

    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let Some(header_value) = header_value else {
        return (StatusCode::UNAUTHORIZED, "Missing Authorization header").into_response();
    };
    let Some(token) = header_value.strip_prefix("Bearer ") else {
        return (
            StatusCode::UNAUTHORIZED,
            "Invalid Authorization header format. Expected: Bearer <token>",
        )
            .into_response();
    };

    match state.validator.validate(token).await {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => (StatusCode::UNAUTHORIZED, "Invalid token").into_response(),
    }
}
