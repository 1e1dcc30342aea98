//! Cross-cutting observers for the retrieval pipeline.
//!
//! Two streams leave the pipeline:
//!
//! - **Telemetry** ([`RagTelemetry`]): one record per retrieval call naming the
//!   tier that answered, how long it took and the requested `top_k`.
//! - **Structured events** ([`StructuredLogger`]): breaker transitions and LLM
//!   request outcomes, with a severity inferred from the event name.
//!
//! Both are traits so the pipeline can be wired to JSON-lines files, to
//! `tracing`, or to nothing at all. Recording sinks exist for tests that need
//! to assert what was emitted.
//!
//! Every record carries the current trace id (see [`trace`]).
//!
//! ```rust
//! use observability::{infer_level, Level};
//!
//! assert_eq!(infer_level("llm.circuit.opened"), Level::Warn);
//! assert_eq!(infer_level("llm.request.failed"), Level::Error);
//! ```

mod level;
mod logger;
mod sink;
mod telemetry;
pub mod trace;

pub use level::{infer_level, Level};
pub use logger::{
    JsonFileLogger, LoggedEvent, NullLogger, RecordingLogger, StructuredLogger, TracingLogger,
};
pub use telemetry::{
    JsonFileTelemetry, NullTelemetry, RagTelemetry, RecordingTelemetry, RetrievalEvent,
    TracingTelemetry,
};
pub use trace::{current_trace_id, generate_trace_id, sanitize_trace_id, with_trace_id};

/// RFC 3339 timestamp used on every emitted record.
pub(crate) fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
