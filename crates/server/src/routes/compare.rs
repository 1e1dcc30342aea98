use crate::error::ServerResult;
use crate::state::ServerState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use herorag::ComparisonAnswer;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    pub ids: Vec<String>,
    #[serde(default)]
    pub question: Option<String>,
}

/// `POST /api/v1/compare` with exactly two ids.
pub async fn compare(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<CompareRequest>, JsonRejection>,
) -> ServerResult<Json<ComparisonAnswer>> {
    let Json(request) = payload?;
    let answer = state
        .pipeline
        .compare()
        .compare(&request.ids, request.question.as_deref())
        .await?;
    Ok(Json(answer))
}
