use crate::error::ServerResult;
use crate::state::ServerState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use herorag::AgentAnswer;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

/// `POST /api/v1/agent/ask`
///
/// ```json
/// {"question": "¿Qué es un circuit breaker?"}
/// ```
///
/// Answers with `{"answer", "contexts": [{"id", "title"}]}`.
pub async fn ask(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> ServerResult<Json<AgentAnswer>> {
    let Json(request) = payload?;
    let answer = state.pipeline.ask().ask(&request.question).await?;
    Ok(Json(answer))
}
