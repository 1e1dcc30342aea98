use crate::state::CircuitState;
use thiserror::Error;

/// The breaker rejected a call without attempting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("service temporarily unavailable (circuit breaker: {})", .state.as_str())]
pub struct CircuitOpen {
    /// State that caused the rejection: `Open` or an exhausted `HalfOpen`.
    pub state: CircuitState,
}

#[derive(Debug, Error)]
pub enum ResilienceError {
    #[error("state store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state store encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("state store lock poisoned")]
    Poisoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_open_names_the_state() {
        let err = CircuitOpen {
            state: CircuitState::HalfOpen,
        };
        let msg = err.to_string();
        assert!(msg.contains("temporarily unavailable"));
        assert!(msg.contains("half_open"));
    }

    #[test]
    fn io_error_converts() {
        let err: ResilienceError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(err.to_string().contains("denied"));
    }
}
