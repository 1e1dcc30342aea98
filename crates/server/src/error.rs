use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use herorag::RagError;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub type ServerResult<T> = Result<T, ServerError>;

/// Server error types
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("Upstream LLM failure: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found")]
    NotFound,
}

/// API error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::Internal(_) | ServerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ServerError::InvalidInput(_) => "INVALID_INPUT",
            ServerError::Unavailable(_) => "CIRCUIT_OPEN",
            ServerError::Upstream(_) => "LLM_ERROR",
            ServerError::Internal(_) => "INTERNAL_ERROR",
            ServerError::Config(_) => "CONFIG_ERROR",
            ServerError::NotFound => "NOT_FOUND",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        }

        let body = Json(json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<RagError> for ServerError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::InvalidInput(msg) => ServerError::InvalidInput(msg),
            RagError::CircuitOpen(open) => ServerError::Unavailable(open.to_string()),
            RagError::Llm(err) => ServerError::Upstream(err.to_string()),
            RagError::Config(err) => ServerError::Config(err.to_string()),
            RagError::Retrieval(err) => ServerError::Internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        ServerError::InvalidInput(rejection.body_text())
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        ServerError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herorag::resilience::{CircuitOpen, CircuitState};
    use herorag::LlmError;

    #[test]
    fn rag_errors_map_to_statuses() {
        let cases = [
            (
                RagError::InvalidInput("question must not be empty".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                RagError::CircuitOpen(CircuitOpen {
                    state: CircuitState::Open,
                }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                RagError::Llm(LlmError::Transport("refused".into())),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ServerError::from(err).status_code(), status);
        }
    }

    #[test]
    fn circuit_open_message_survives() {
        let err = ServerError::from(RagError::CircuitOpen(CircuitOpen {
            state: CircuitState::Open,
        }));
        assert!(err.to_string().contains("temporarily unavailable"));
        assert_eq!(err.error_code(), "CIRCUIT_OPEN");
    }
}
