use crate::state::ServerState;
use herorag::resilience::CircuitState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use std::time::SystemTime;

static SERVER_START_TIME: once_cell::sync::Lazy<SystemTime> =
    once_cell::sync::Lazy::new(SystemTime::now);

fn uptime_seconds() -> u64 {
    SERVER_START_TIME
        .elapsed()
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Liveness: 200 while the process serves requests.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "herorag-server",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds(),
    }))
}

/// Readiness. Always 200; `degraded` while the LLM breaker is not closed.
pub async fn readiness_check(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let llm = state.pipeline.llm_breaker().state();
    let status = if llm == CircuitState::Closed {
        "ready"
    } else {
        "degraded"
    };

    Json(json!({
        "status": status,
        "service": "herorag-server",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds(),
        "components": {
            "knowledge_base": "ready",
            "llm_circuit": llm.as_str(),
        }
    }))
}
