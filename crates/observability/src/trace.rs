//! Trace id propagation.
//!
//! A trace id is scoped to the task handling one request via
//! [`with_trace_id`]. Code running outside any scope (startup, background
//! work, unit tests) shares one id generated for the whole process.

use std::future::Future;
use std::sync::OnceLock;

tokio::task_local! {
    static TRACE_ID: String;
}

static PROCESS_TRACE_ID: OnceLock<String> = OnceLock::new();

const MAX_TRACE_ID_LEN: usize = 128;

/// Runs `fut` with `trace_id` as the current trace id.
pub async fn with_trace_id<F>(trace_id: String, fut: F) -> F::Output
where
    F: Future,
{
    TRACE_ID.scope(trace_id, fut).await
}

/// The trace id of the current request, or the process-wide id.
pub fn current_trace_id() -> String {
    TRACE_ID
        .try_with(|id| id.clone())
        .unwrap_or_else(|_| PROCESS_TRACE_ID.get_or_init(generate_trace_id).clone())
}

/// 32 lowercase hex characters.
pub fn generate_trace_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Accepts a caller-supplied id only if it is 1..=128 characters of
/// `[A-Za-z0-9._-]`, after trimming.
pub fn sanitize_trace_id(candidate: &str) -> Option<String> {
    let candidate = candidate.trim();
    let valid = !candidate.is_empty()
        && candidate.len() <= MAX_TRACE_ID_LEN
        && candidate
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));

    valid.then(|| candidate.to_string())
}
