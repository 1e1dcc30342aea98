use crate::breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::clock::{Clock, SystemClock};
use crate::state::CircuitSnapshot;
use crate::store::{CircuitStateStore, FileStateStore, MemoryStateStore};
use dashmap::DashMap;
use observability::{StructuredLogger, TracingLogger};
use std::path::PathBuf;
use std::sync::Arc;

/// Replaces every character outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_breaker_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// One breaker per backend name.
///
/// With a state directory, each breaker persists to
/// `<dir>/<sanitized name>.json`; without one, state is process-local.
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: CircuitBreakerConfig,
    state_dir: Option<PathBuf>,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn StructuredLogger>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig, state_dir: Option<PathBuf>) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
            state_dir,
            clock: Arc::new(SystemClock),
            logger: Arc::new(TracingLogger),
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

    /// State file backing `name`, if persistence is enabled.
    pub fn state_path(&self, name: &str) -> Option<PathBuf> {
        self.state_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", sanitize_breaker_name(name))))
    }

    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                let store: Arc<dyn CircuitStateStore> = match self.state_path(name) {
                    Some(path) => Arc::new(FileStateStore::new(path)),
                    None => Arc::new(MemoryStateStore::new()),
                };
                Arc::new(
                    CircuitBreaker::new(name, self.config, store)
                        .with_clock(self.clock.clone())
                        .with_logger(self.logger.clone()),
                )
            })
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| entry.value().clone())
    }

    /// `(name, snapshot)` for every breaker created so far, sorted by name.
    pub fn snapshots(&self) -> Vec<(String, CircuitSnapshot)> {
        let mut all: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Forces every known breaker closed.
    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CircuitState;

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitize_breaker_name("openai-llm_v2"), "openai-llm_v2");
        assert_eq!(sanitize_breaker_name("openai/chat:4o mini"), "openai_chat_4o_mini");
        assert_eq!(sanitize_breaker_name("../etc"), "___etc");
    }

    #[test]
    fn one_breaker_per_name() {
        let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig::default(), None);
        let a = registry.get_or_create("llm");
        let b = registry.get_or_create("llm");
        let c = registry.get_or_create("embeddings");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn file_backed_breakers_use_sanitized_paths() {
        let dir = tempfile::tempdir().unwrap();
        let registry = CircuitBreakerRegistry::new(
            CircuitBreakerConfig::default().with_failure_threshold(1),
            Some(dir.path().to_path_buf()),
        );

        let breaker = registry.get_or_create("openai/chat");
        breaker.on_failure();

        let expected = dir.path().join("openai_chat.json");
        assert_eq!(registry.state_path("openai/chat"), Some(expected.clone()));
        assert!(expected.exists());
    }

    #[test]
    fn reset_all_closes_everything() {
        let registry = CircuitBreakerRegistry::new(
            CircuitBreakerConfig::default().with_failure_threshold(1),
            None,
        );
        registry.get_or_create("b").on_failure();
        registry.get_or_create("a").on_failure();

        let names: Vec<_> = registry.snapshots().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);

        registry.reset_all();
        assert!(registry
            .snapshots()
            .iter()
            .all(|(_, s)| s.state == CircuitState::Closed));
    }
}
