use crate::config::ConfigLoadError;
use crate::llm::LlmError;
use resilience::CircuitOpen;
use retrieval::RetrievalError;
use thiserror::Error;

/// Errors surfaced by the ask and compare use cases.
#[derive(Debug, Error)]
pub enum RagError {
    /// Caller input rejected before any I/O.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The LLM breaker is open; retry later.
    #[error(transparent)]
    CircuitOpen(CircuitOpen),

    #[error("LLM request failed: {0}")]
    Llm(LlmError),

    /// Only raised while wiring the pipeline; retrieval itself degrades.
    #[error("retrieval setup failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Config(#[from] ConfigLoadError),
}

impl From<LlmError> for RagError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::CircuitOpen(open) => RagError::CircuitOpen(open),
            other => RagError::Llm(other),
        }
    }
}

impl From<CircuitOpen> for RagError {
    fn from(open: CircuitOpen) -> Self {
        RagError::CircuitOpen(open)
    }
}
