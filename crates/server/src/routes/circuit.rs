use crate::state::ServerState;
use axum::extract::State;
use axum::Json;
use herorag::resilience::CircuitSnapshot;
use herorag::LLM_BREAKER;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct CircuitResponse {
    pub breaker: String,
    #[serde(flatten)]
    pub snapshot: CircuitSnapshot,
}

/// `GET /api/v1/circuit`: the LLM breaker as persisted.
pub async fn status(State(state): State<Arc<ServerState>>) -> Json<CircuitResponse> {
    Json(CircuitResponse {
        breaker: LLM_BREAKER.to_string(),
        snapshot: state.pipeline.llm_breaker().snapshot(),
    })
}

/// `POST /api/v1/circuit/reset`: forces the LLM breaker closed.
pub async fn reset(State(state): State<Arc<ServerState>>) -> Json<CircuitResponse> {
    let breaker = state.pipeline.llm_breaker();
    breaker.reset();
    tracing::info!(breaker = LLM_BREAKER, "breaker reset over the API");

    Json(CircuitResponse {
        breaker: LLM_BREAKER.to_string(),
        snapshot: breaker.snapshot(),
    })
}
