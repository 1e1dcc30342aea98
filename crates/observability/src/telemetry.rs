use crate::sink::append_json_line;
use crate::trace::current_trace_id;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;

/// One retrieval call: which tier answered and how long it took.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalEvent {
    pub timestamp: String,
    pub trace_id: String,
    pub event: String,
    pub retriever: String,
    pub latency_ms: u64,
    pub top_k: usize,
}

impl RetrievalEvent {
    pub fn now(event: &str, retriever: &str, latency_ms: u64, top_k: usize) -> Self {
        Self {
            timestamp: crate::timestamp(),
            trace_id: current_trace_id(),
            event: event.to_string(),
            retriever: retriever.to_string(),
            latency_ms,
            top_k,
        }
    }
}

/// Observer for retrieval tier usage. Recording never fails the caller.
pub trait RagTelemetry: Send + Sync {
    fn record(&self, event: &str, retriever: &str, latency_ms: u64, top_k: usize);
}

/// Appends [`RetrievalEvent`] lines to a JSON-lines file.
#[derive(Debug, Clone)]
pub struct JsonFileTelemetry {
    path: PathBuf,
}

impl JsonFileTelemetry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RagTelemetry for JsonFileTelemetry {
    fn record(&self, event: &str, retriever: &str, latency_ms: u64, top_k: usize) {
        let record = RetrievalEvent::now(event, retriever, latency_ms, top_k);
        let written = serde_json::to_value(&record)
            .map_err(std::io::Error::from)
            .and_then(|value| append_json_line(&self.path, &value));

        if let Err(err) = written {
            tracing::warn!(path = %self.path.display(), error = %err, "telemetry write failed");
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl RagTelemetry for TracingTelemetry {
    fn record(&self, event: &str, retriever: &str, latency_ms: u64, top_k: usize) {
        tracing::info!(
            event,
            retriever,
            latency_ms,
            top_k,
            trace_id = %current_trace_id(),
            "retrieval"
        );
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullTelemetry;

impl RagTelemetry for NullTelemetry {
    fn record(&self, _event: &str, _retriever: &str, _latency_ms: u64, _top_k: usize) {}
}

/// Keeps events in memory so tests can assert which tier answered.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<RetrievalEvent>>,
}

impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RetrievalEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// `(event, retriever)` pairs in emission order.
    pub fn tiers(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .map(|e| (e.event, e.retriever))
            .collect()
    }
}

impl RagTelemetry for RecordingTelemetry {
    fn record(&self, event: &str, retriever: &str, latency_ms: u64, top_k: usize) {
        if let Ok(mut events) = self.events.lock() {
            events.push(RetrievalEvent::now(event, retriever, latency_ms, top_k));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::with_trace_id;

    #[tokio::test]
    async fn file_telemetry_writes_one_line_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry/rag.jsonl");
        let telemetry = JsonFileTelemetry::new(&path);

        with_trace_id("abc".into(), async {
            telemetry.record("rag.retrieve", "vector", 12, 3);
            telemetry.record("rag.retrieve.fallback", "fallback", 4, 3);
        })
        .await;

        let content = std::fs::read_to_string(&path).unwrap();
        let events: Vec<RetrievalEvent> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].retriever, "vector");
        assert_eq!(events[0].latency_ms, 12);
        assert_eq!(events[0].top_k, 3);
        assert_eq!(events[1].event, "rag.retrieve.fallback");
        assert!(events.iter().all(|e| e.trace_id == "abc"));
    }

    #[test]
    fn recording_telemetry_lists_tiers() {
        let telemetry = RecordingTelemetry::new();
        telemetry.record("rag.retrieve.pinecone.fallback", "fallback", 1, 5);
        telemetry.record("rag.retrieve", "lexical", 0, 5);

        assert_eq!(
            telemetry.tiers(),
            vec![
                ("rag.retrieve.pinecone.fallback".to_string(), "fallback".to_string()),
                ("rag.retrieve".to_string(), "lexical".to_string()),
            ]
        );
    }
}
