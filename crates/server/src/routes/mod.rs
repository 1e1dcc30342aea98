//! API route handlers
//!
//! - `health`: liveness and readiness
//! - `agent`: grounded question answering
//! - `compare`: side-by-side comparison of two entries
//! - `circuit`: LLM breaker inspection and manual reset

pub mod agent;
pub mod circuit;
pub mod compare;
pub mod health;

use crate::error::{ServerError, ServerResult};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// API version and base info (GET /).
pub async fn api_info() -> ServerResult<impl IntoResponse> {
    Ok(Json(json!({
        "name": "herorag",
        "version": env!("CARGO_PKG_VERSION"),
        "api_version": "v1",
        "endpoints": [
            "/api/v1/agent/ask",
            "/api/v1/compare",
            "/api/v1/circuit",
            "/api/v1/circuit/reset",
            "/health",
            "/ready"
        ]
    })))
}

/// 404 Not Found handler
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
