//! Circuit breaker guarding calls to a flaky backend.
//!
//! Closed → Open once `failure_threshold` consecutive failures are seen.
//! Open → HalfOpen once `open_ttl_secs` have passed since it opened, after
//! which at most `half_open_max_calls` trial calls are let through. A success
//! closes the breaker; a failure while Open or HalfOpen re-opens it with a
//! fresh cooldown. A HalfOpen window whose trials never reported back opens
//! a new window after another `open_ttl_secs`.
//!
//! [`CircuitBreaker::admit`] hands out a [`CallPermit`] that records a
//! failure if it is dropped before an outcome is reported, so a cancelled
//! or timed-out call still counts.
//!
//! State is read and written through a [`CircuitStateStore`] on every
//! operation, so several processes pointed at the same file share one
//! breaker. If the store fails, the breaker keeps going on its last known
//! snapshot and logs the failure.

use crate::clock::{Clock, SystemClock};
use crate::error::CircuitOpen;
use crate::state::{CircuitSnapshot, CircuitState};
use crate::store::CircuitStateStore;
use observability::{StructuredLogger, TracingLogger};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Seconds the circuit stays open before trial calls are allowed.
    pub open_ttl_secs: u64,
    /// Trial calls allowed while half-open.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            open_ttl_secs: 30,
            half_open_max_calls: 1,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_open_ttl_secs(mut self, secs: u64) -> Self {
        self.open_ttl_secs = secs;
        self
    }

    pub fn with_half_open_max_calls(mut self, calls: u32) -> Self {
        self.half_open_max_calls = calls;
        self
    }

    /// Raises every setting to at least 1.
    pub fn clamped(self) -> Self {
        Self {
            failure_threshold: self.failure_threshold.max(1),
            open_ttl_secs: self.open_ttl_secs.max(1),
            half_open_max_calls: self.half_open_max_calls.max(1),
        }
    }
}

/// Outcome of [`CircuitBreaker::call`].
#[derive(Debug, thiserror::Error)]
pub enum CallError<E> {
    #[error(transparent)]
    Open(#[from] CircuitOpen),
    #[error("{0}")]
    Inner(E),
}

enum Admission {
    Allowed { state: CircuitState, half_opened: bool },
    Rejected { state: CircuitState, half_opened: bool },
}

pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    store: Arc<dyn CircuitStateStore>,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn StructuredLogger>,
    last_known: Mutex<CircuitSnapshot>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        store: Arc<dyn CircuitStateStore>,
    ) -> Self {
        Self {
            name: name.into(),
            config: config.clamped(),
            store,
            clock: Arc::new(SystemClock),
            logger: Arc::new(TracingLogger),
            last_known: Mutex::new(CircuitSnapshot::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn StructuredLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Admits or rejects the next call.
    ///
    /// Returns the state the call runs under (`Closed` or `HalfOpen`).
    /// Rejection never touches the guarded backend.
    pub fn before_call(&self) -> Result<CircuitState, CircuitOpen> {
        let now = self.clock.now_unix();
        let ttl = i64::try_from(self.config.open_ttl_secs).unwrap_or(i64::MAX);
        let budget = self.config.half_open_max_calls;

        let admission = self.transition(|snap| {
            let mut half_opened = false;

            if snap.state == CircuitState::Open {
                if now.saturating_sub(snap.opened_at) < ttl {
                    return (
                        Admission::Rejected {
                            state: CircuitState::Open,
                            half_opened,
                        },
                        false,
                    );
                }
                snap.state = CircuitState::HalfOpen;
                snap.opened_at = now;
                snap.half_open_calls = 0;
                half_opened = true;
            }

            if snap.state == CircuitState::HalfOpen {
                // Trials whose outcome never came back stop blocking once a
                // whole cooldown has passed since the window opened.
                if snap.half_open_calls >= budget && now.saturating_sub(snap.opened_at) >= ttl {
                    snap.opened_at = now;
                    snap.half_open_calls = 0;
                    half_opened = true;
                }
                if snap.half_open_calls >= budget {
                    return (
                        Admission::Rejected {
                            state: CircuitState::HalfOpen,
                            half_opened,
                        },
                        half_opened,
                    );
                }
                snap.half_open_calls += 1;
                return (
                    Admission::Allowed {
                        state: CircuitState::HalfOpen,
                        half_opened,
                    },
                    true,
                );
            }

            (
                Admission::Allowed {
                    state: snap.state,
                    half_opened,
                },
                false,
            )
        });

        match admission {
            Admission::Allowed { state, half_opened } => {
                if half_opened {
                    self.emit("llm.circuit.half_open", CircuitState::HalfOpen);
                }
                Ok(state)
            }
            Admission::Rejected { state, half_opened } => {
                if half_opened {
                    self.emit("llm.circuit.half_open", CircuitState::HalfOpen);
                }
                self.emit("llm.circuit.short_circuit", state);
                Err(CircuitOpen { state })
            }
        }
    }

    /// Records a successful call. Always leaves the breaker closed with no
    /// recorded failures.
    pub fn on_success(&self) {
        let recovered = self.transition(|snap| {
            let before = *snap;
            let recovered = before.state != CircuitState::Closed;
            *snap = CircuitSnapshot {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: if recovered { 0 } else { before.opened_at },
                half_open_calls: 0,
            };
            (recovered, *snap != before)
        });

        if recovered {
            self.emit("llm.circuit.closed", CircuitState::Closed);
        }
    }

    /// Records a failed call, opening the breaker when the threshold is met
    /// or when a trial call fails.
    pub fn on_failure(&self) {
        let now = self.clock.now_unix();
        let threshold = self.config.failure_threshold;

        let opened = self.transition(|snap| {
            let failures = snap.failure_count.saturating_add(1);
            match snap.state {
                CircuitState::HalfOpen | CircuitState::Open => {
                    *snap = CircuitSnapshot::opened(failures, now);
                    (Some(failures), true)
                }
                CircuitState::Closed if failures >= threshold => {
                    *snap = CircuitSnapshot::opened(failures, now);
                    (Some(failures), true)
                }
                CircuitState::Closed => {
                    snap.failure_count = failures;
                    snap.half_open_calls = 0;
                    (None, true)
                }
            }
        });

        if let Some(failure_count) = opened {
            self.logger.log(
                "llm.circuit.opened",
                json!({
                    "breaker": self.name,
                    "state": CircuitState::Open.as_str(),
                    "failure_count": failure_count,
                }),
            );
        }
    }

    /// Forces the breaker closed with every counter zeroed.
    pub fn reset(&self) {
        self.transition(|snap| {
            *snap = CircuitSnapshot::closed();
            ((), true)
        });
        self.emit("llm.circuit.reset", CircuitState::Closed);
    }

    /// Current snapshot without changing it.
    pub fn snapshot(&self) -> CircuitSnapshot {
        match self.store.load() {
            Ok(snapshot) => {
                self.remember(snapshot);
                snapshot
            }
            Err(err) => {
                tracing::warn!(breaker = %self.name, error = %err, "breaker state load failed");
                self.last_known()
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.snapshot().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Runs `op` under the breaker: rejected calls never run, and the
    /// outcome of admitted calls is recorded.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.admit()?;
        match op().await {
            Ok(value) => {
                permit.succeeded();
                Ok(value)
            }
            Err(err) => {
                permit.failed();
                Err(CallError::Inner(err))
            }
        }
    }

    /// [`before_call`](Self::before_call) returning a permit that must be
    /// settled with [`CallPermit::succeeded`] or [`CallPermit::failed`].
    /// Dropping it unsettled counts as a failure.
    pub fn admit(&self) -> Result<CallPermit<'_>, CircuitOpen> {
        let state = self.before_call()?;
        Ok(CallPermit {
            breaker: self,
            state,
            settled: false,
        })
    }

    /// Applies `step` to the persisted snapshot under the store's lock.
    /// `step` returns its result and whether the snapshot changed. When the
    /// store is unusable the step runs against the last known snapshot.
    fn transition<R>(&self, mut step: impl FnMut(&mut CircuitSnapshot) -> (R, bool)) -> R {
        let mut outcome = None;
        let mut computed = None;

        let stored = self.store.update(&mut |snap| {
            let (result, changed) = step(snap);
            outcome = Some(result);
            computed = Some(*snap);
            changed
        });

        match stored {
            Ok(snapshot) => {
                self.remember(snapshot);
                match outcome {
                    Some(result) => result,
                    None => self.apply_locally(&mut step),
                }
            }
            Err(err) => {
                tracing::warn!(breaker = %self.name, error = %err, "breaker state persistence failed");
                match (outcome, computed) {
                    (Some(result), Some(snapshot)) => {
                        self.remember(snapshot);
                        result
                    }
                    _ => self.apply_locally(&mut step),
                }
            }
        }
    }

    fn apply_locally<R>(&self, step: &mut impl FnMut(&mut CircuitSnapshot) -> (R, bool)) -> R {
        let mut snapshot = self.last_known();
        let (result, _) = step(&mut snapshot);
        self.remember(snapshot);
        result
    }

    fn last_known(&self) -> CircuitSnapshot {
        self.last_known
            .lock()
            .map(|s| *s)
            .unwrap_or_default()
    }

    fn remember(&self, snapshot: CircuitSnapshot) {
        if let Ok(mut guard) = self.last_known.lock() {
            *guard = snapshot;
        }
    }

    fn emit(&self, event: &str, state: CircuitState) {
        self.logger.log(
            event,
            json!({ "breaker": self.name, "state": state.as_str() }),
        );
    }
}

/// An admitted call. See [`CircuitBreaker::admit`].
#[must_use = "an unsettled permit records a failure when dropped"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    state: CircuitState,
    settled: bool,
}

impl CallPermit<'_> {
    /// State the call was admitted under.
    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn succeeded(mut self) {
        self.settled = true;
        self.breaker.on_success();
    }

    pub fn failed(mut self) {
        self.settled = true;
        self.breaker.on_failure();
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!(
                breaker = %self.breaker.name,
                state = self.state.as_str(),
                "call abandoned before completing, counting as failure"
            );
            self.breaker.on_failure();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ResilienceError;
    use crate::store::{FileStateStore, MemoryStateStore};
    use observability::RecordingLogger;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Harness {
        breaker: CircuitBreaker,
        clock: Arc<ManualClock>,
        logger: Arc<RecordingLogger>,
    }

    fn harness(config: CircuitBreakerConfig) -> Harness {
        let clock = Arc::new(ManualClock::new(1_000));
        let logger = Arc::new(RecordingLogger::new());
        let breaker = CircuitBreaker::new("llm", config, Arc::new(MemoryStateStore::new()))
            .with_clock(clock.clone())
            .with_logger(logger.clone());
        Harness {
            breaker,
            clock,
            logger,
        }
    }

    #[test]
    fn test_circuit_starts_closed() {
        let h = harness(CircuitBreakerConfig::default());
        assert_eq!(h.breaker.snapshot(), CircuitSnapshot::closed());
        assert_eq!(h.breaker.before_call(), Ok(CircuitState::Closed));
    }

    #[test]
    fn test_circuit_opens_after_failures() {
        let h = harness(CircuitBreakerConfig::default().with_failure_threshold(2));

        h.breaker.on_failure();
        assert_eq!(h.breaker.state(), CircuitState::Closed);
        assert_eq!(h.breaker.snapshot().failure_count, 1);

        h.breaker.on_failure();
        let snap = h.breaker.snapshot();
        assert_eq!(snap.state, CircuitState::Open);
        assert_eq!(snap.failure_count, 2);
        assert_eq!(snap.opened_at, 1_000);
        assert!(h.logger.names().contains(&"llm.circuit.opened".to_string()));
    }

    #[test]
    fn test_open_circuit_short_circuits_until_ttl() {
        let h = harness(
            CircuitBreakerConfig::default()
                .with_failure_threshold(1)
                .with_open_ttl_secs(30),
        );
        h.breaker.on_failure();

        h.clock.advance(29);
        let err = h.breaker.before_call().unwrap_err();
        assert_eq!(err.state, CircuitState::Open);
        assert_eq!(h.breaker.state(), CircuitState::Open);
        assert_eq!(
            h.logger.names().last().map(String::as_str),
            Some("llm.circuit.short_circuit")
        );
    }

    #[test]
    fn test_half_open_after_ttl_then_success_closes() {
        let h = harness(CircuitBreakerConfig::default().with_failure_threshold(2));
        h.breaker.on_failure();
        h.breaker.on_failure();

        h.clock.advance(30);
        assert_eq!(h.breaker.before_call(), Ok(CircuitState::HalfOpen));
        let snap = h.breaker.snapshot();
        assert_eq!(snap.state, CircuitState::HalfOpen);
        assert_eq!(snap.failure_count, 2);
        assert_eq!(snap.half_open_calls, 1);

        h.breaker.on_success();
        assert_eq!(h.breaker.snapshot(), CircuitSnapshot::closed());
        assert_eq!(
            h.logger.names(),
            vec![
                "llm.circuit.opened",
                "llm.circuit.half_open",
                "llm.circuit.closed"
            ]
        );
    }

    #[test]
    fn test_half_open_budget_exhausted() {
        let h = harness(
            CircuitBreakerConfig::default()
                .with_failure_threshold(1)
                .with_half_open_max_calls(1),
        );
        h.breaker.on_failure();
        h.clock.advance(30);

        assert!(h.breaker.before_call().is_ok());
        let err = h.breaker.before_call().unwrap_err();
        assert_eq!(err.state, CircuitState::HalfOpen);
        assert_eq!(h.breaker.snapshot().half_open_calls, 1);
    }

    #[test]
    fn test_failure_in_half_open_reopens() {
        let h = harness(CircuitBreakerConfig::default().with_failure_threshold(1));
        h.breaker.on_failure();
        h.clock.advance(45);
        h.breaker.before_call().unwrap();

        h.breaker.on_failure();
        let snap = h.breaker.snapshot();
        assert_eq!(snap.state, CircuitState::Open);
        assert_eq!(snap.failure_count, 2);
        assert_eq!(snap.opened_at, 1_045);
        assert_eq!(snap.half_open_calls, 0);

        // Fresh cooldown from the re-open.
        h.clock.advance(10);
        assert!(h.breaker.before_call().is_err());
    }

    #[test]
    fn test_success_while_closed_resets_failures() {
        let h = harness(CircuitBreakerConfig::default());
        h.breaker.on_failure();
        h.breaker.on_failure();
        h.breaker.on_success();

        assert_eq!(h.breaker.snapshot().failure_count, 0);
        h.breaker.on_failure();
        assert_eq!(h.breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_reset_closes_open_circuit() {
        let h = harness(CircuitBreakerConfig::default().with_failure_threshold(1));
        h.breaker.on_failure();
        assert!(h.breaker.is_open());

        h.breaker.reset();
        assert_eq!(h.breaker.snapshot(), CircuitSnapshot::closed());
        assert!(h.breaker.before_call().is_ok());
    }

    #[test]
    fn test_config_clamped_to_one() {
        let h = harness(CircuitBreakerConfig {
            failure_threshold: 0,
            open_ttl_secs: 0,
            half_open_max_calls: 0,
        });
        assert_eq!(
            *h.breaker.config(),
            CircuitBreakerConfig {
                failure_threshold: 1,
                open_ttl_secs: 1,
                half_open_max_calls: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_call_skips_operation_when_open() {
        let h = harness(CircuitBreakerConfig::default().with_failure_threshold(2));
        let invoked = AtomicUsize::new(0);

        for _ in 0..2 {
            let result: Result<(), _> = h
                .breaker
                .call(|| async {
                    invoked.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>("boom")
                })
                .await;
            assert!(matches!(result, Err(CallError::Inner("boom"))));
        }

        let result = h
            .breaker
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            })
            .await;
        assert!(matches!(result, Err(CallError::Open(_))));
        assert_eq!(invoked.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dropped_permit_counts_as_failure() {
        let h = harness(CircuitBreakerConfig::default().with_failure_threshold(3));
        for _ in 0..3 {
            let permit = h.breaker.admit().unwrap();
            assert_eq!(permit.state(), CircuitState::Closed);
            drop(permit);
        }

        let snap = h.breaker.snapshot();
        assert_eq!(snap.state, CircuitState::Open);
        assert_eq!(snap.failure_count, 3);
    }

    #[test]
    fn test_settled_permit_records_once() {
        let h = harness(CircuitBreakerConfig::default().with_failure_threshold(2));
        h.breaker.admit().unwrap().failed();
        assert_eq!(h.breaker.snapshot().failure_count, 1);

        h.breaker.admit().unwrap().succeeded();
        assert_eq!(h.breaker.snapshot(), CircuitSnapshot::closed());
    }

    #[tokio::test]
    async fn test_timed_out_call_counts_as_failure() {
        let h = harness(CircuitBreakerConfig::default().with_failure_threshold(2));

        for _ in 0..2 {
            let hung = h
                .breaker
                .call(|| std::future::pending::<Result<(), &str>>());
            let outcome = tokio::time::timeout(std::time::Duration::from_millis(10), hung).await;
            assert!(outcome.is_err());
        }

        assert_eq!(h.breaker.state(), CircuitState::Open);
        assert_eq!(h.breaker.snapshot().failure_count, 2);
    }

    #[test]
    fn test_abandoned_half_open_trial_reopens_window_after_ttl() {
        let h = harness(
            CircuitBreakerConfig::default()
                .with_failure_threshold(1)
                .with_open_ttl_secs(30),
        );
        h.breaker.on_failure();
        h.clock.advance(30);

        // Trial admitted, then its outcome is lost without touching the breaker.
        h.breaker.before_call().unwrap();
        assert_eq!(h.breaker.snapshot().opened_at, 1_030);
        assert!(h.breaker.before_call().is_err());

        h.clock.advance(29);
        assert!(h.breaker.before_call().is_err());

        h.clock.advance(1);
        assert_eq!(h.breaker.before_call(), Ok(CircuitState::HalfOpen));
        let snap = h.breaker.snapshot();
        assert_eq!(snap.state, CircuitState::HalfOpen);
        assert_eq!(snap.opened_at, 1_060);
        assert_eq!(snap.half_open_calls, 1);

        h.breaker.on_success();
        assert_eq!(h.breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_state_shared_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("llm.json");
        let clock = Arc::new(ManualClock::new(50));
        let config = CircuitBreakerConfig::default().with_failure_threshold(1);

        let first = CircuitBreaker::new("llm", config, Arc::new(FileStateStore::new(&path)))
            .with_clock(clock.clone());
        let second = CircuitBreaker::new("llm", config, Arc::new(FileStateStore::new(&path)))
            .with_clock(clock.clone());

        first.on_failure();
        assert!(second.before_call().is_err());
    }

    struct BrokenStore;

    impl CircuitStateStore for BrokenStore {
        fn load(&self) -> Result<CircuitSnapshot, ResilienceError> {
            Err(std::io::Error::other("disk gone").into())
        }
        fn save(&self, _: &CircuitSnapshot) -> Result<(), ResilienceError> {
            Err(std::io::Error::other("disk gone").into())
        }
        fn update(
            &self,
            _: &mut dyn FnMut(&mut CircuitSnapshot) -> bool,
        ) -> Result<CircuitSnapshot, ResilienceError> {
            Err(std::io::Error::other("disk gone").into())
        }
    }

    #[test]
    fn test_broken_store_falls_back_to_memory() {
        let breaker = CircuitBreaker::new(
            "llm",
            CircuitBreakerConfig::default().with_failure_threshold(1),
            Arc::new(BrokenStore),
        )
        .with_logger(Arc::new(observability::NullLogger));

        assert_eq!(breaker.before_call(), Ok(CircuitState::Closed));
        breaker.on_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.before_call().is_err());
    }
}
