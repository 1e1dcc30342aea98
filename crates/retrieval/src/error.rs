use std::io;
use thiserror::Error;

/// Errors raised below the retrieval cascade.
///
/// Retrievers never return these: every one of them is a reason to fall
/// through to the next tier. They surface from the knowledge base loader,
/// the embedding store and embedding clients.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Low-level IO failures while touching the filesystem.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// A file exists but does not hold the expected JSON shape.
    #[error("malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },
    /// The embedding provider could not be reached or answered with an error.
    #[error("embedding request failed: {0}")]
    Embedding(String),
    /// The embedding provider answered with something other than vectors.
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
    /// A required setting is absent or unusable.
    #[error("invalid retrieval config: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_io_conversion() {
        let err: RetrievalError = io::Error::new(io::ErrorKind::NotFound, "kb.json").into();
        assert!(err.to_string().contains("io error"));
        assert!(err.to_string().contains("kb.json"));
    }

    #[test]
    fn error_malformed_names_the_file_kind() {
        let err = RetrievalError::Malformed {
            what: "knowledge base",
            reason: "expected array".into(),
        };
        assert_eq!(err.to_string(), "malformed knowledge base: expected array");
    }

    #[test]
    fn error_embedding() {
        let err = RetrievalError::Embedding("HTTP 503".into());
        assert!(err.to_string().contains("embedding request failed"));
        assert!(err.to_string().contains("503"));
    }
}
