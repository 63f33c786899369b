//! HTTP server for the AskFuze retriever
//!
//! Three consumer-facing endpoints form the boundary: `POST /ask`,
//! `POST /ask/stream` (server-sent events) and `POST /feedback`, plus
//! health, readiness and Prometheus metrics probes.

pub mod auth;
pub mod http;
pub mod state;

pub use auth::{AuthenticatedUser, IdentityTokenValidator, TokenValidator};
pub use http::create_router;
pub use state::AppState;
