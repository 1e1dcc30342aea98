//! Resilience for herorag's outbound calls: a persisted circuit breaker and
//! retry with exponential backoff.
//!
//! The breaker's state lives behind a [`CircuitStateStore`], so the same
//! state machine runs against a JSON file shared by several processes
//! ([`FileStateStore`]) or against process-local memory
//! ([`MemoryStateStore`]). Every read-modify-write of the snapshot happens
//! under the store's exclusive lock.
//!
//! ```rust
//! use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState, MemoryStateStore};
//! use std::sync::Arc;
//!
//! let breaker = CircuitBreaker::new(
//!     "llm",
//!     CircuitBreakerConfig::default().with_failure_threshold(1),
//!     Arc::new(MemoryStateStore::new()),
//! );
//!
//! assert!(breaker.before_call().is_ok());
//! breaker.on_failure();
//! assert_eq!(breaker.state(), CircuitState::Open);
//! assert!(breaker.before_call().is_err());
//! ```

mod breaker;
mod clock;
mod error;
mod registry;
mod retry;
pub mod serde_millis;
mod state;
mod store;

pub use breaker::{CallError, CallPermit, CircuitBreaker, CircuitBreakerConfig};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CircuitOpen, ResilienceError};
pub use registry::{sanitize_breaker_name, CircuitBreakerRegistry};
pub use retry::{execute_with_retry_async, RetryConfig, RetryResult};
pub use state::{CircuitSnapshot, CircuitState};
pub use store::{CircuitStateStore, FileStateStore, MemoryStateStore};
