use crate::level::{infer_level, Level};
use crate::sink::append_json_line;
use crate::trace::current_trace_id;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Mutex;

/// Sink for named structured events such as breaker transitions.
///
/// `fields` is expected to be a JSON object; any other value is stored under
/// a `"value"` key. Implementations must not fail the caller.
pub trait StructuredLogger: Send + Sync {
    fn log(&self, event: &str, fields: Value);
}

fn into_fields(fields: Value) -> Map<String, Value> {
    match fields {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// Writes `{timestamp, level, trace_id, event, ...fields}` lines to a file.
#[derive(Debug, Clone)]
pub struct JsonFileLogger {
    path: PathBuf,
    enabled: bool,
}

impl JsonFileLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            enabled: true,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl StructuredLogger for JsonFileLogger {
    fn log(&self, event: &str, fields: Value) {
        if !self.enabled {
            return;
        }

        let mut record = Map::new();
        record.insert("timestamp".into(), Value::String(crate::timestamp()));
        record.insert(
            "level".into(),
            Value::String(infer_level(event).as_str().to_string()),
        );
        record.insert("trace_id".into(), Value::String(current_trace_id()));
        record.insert("event".into(), Value::String(event.to_string()));
        for (key, value) in into_fields(fields) {
            record.entry(key).or_insert(value);
        }

        if let Err(err) = append_json_line(&self.path, &Value::Object(record)) {
            tracing::warn!(path = %self.path.display(), error = %err, "structured log write failed");
        }
    }
}

/// Forwards events to `tracing` at the inferred level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl StructuredLogger for TracingLogger {
    fn log(&self, event: &str, fields: Value) {
        let trace_id = current_trace_id();
        match infer_level(event) {
            Level::Error => tracing::error!(event, %trace_id, %fields),
            Level::Warn => tracing::warn!(event, %trace_id, %fields),
            Level::Info => tracing::info!(event, %trace_id, %fields),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl StructuredLogger for NullLogger {
    fn log(&self, _event: &str, _fields: Value) {}
}

/// One event captured by [`RecordingLogger`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedEvent {
    pub event: String,
    pub level: Level,
    pub fields: Map<String, Value>,
}

/// Keeps events in memory so tests can assert on them.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    events: Mutex<Vec<LoggedEvent>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LoggedEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn names(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.event).collect()
    }
}

impl StructuredLogger for RecordingLogger {
    fn log(&self, event: &str, fields: Value) {
        if let Ok(mut events) = self.events.lock() {
            events.push(LoggedEvent {
                event: event.to_string(),
                level: infer_level(event),
                fields: into_fields(fields),
            });
        }
    }
}
