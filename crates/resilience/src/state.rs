use serde::{Deserialize, Serialize};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through.
    #[default]
    Closed,
    /// Calls are rejected until the cooldown elapses.
    Open,
    /// A limited number of trial calls are allowed.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Persisted breaker state, stored as
/// `{"state", "failure_count", "opened_at", "half_open_calls"}`.
///
/// `opened_at` is unix seconds: when the current Open or HalfOpen window
/// started. Only meaningful while the state is not `Closed`;
/// `half_open_calls` only while `HalfOpen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub opened_at: i64,
    pub half_open_calls: u32,
}

impl CircuitSnapshot {
    pub fn closed() -> Self {
        Self::default()
    }

    pub fn opened(failure_count: u32, now: i64) -> Self {
        Self {
            state: CircuitState::Open,
            failure_count,
            opened_at: now,
            half_open_calls: 0,
        }
    }
}
