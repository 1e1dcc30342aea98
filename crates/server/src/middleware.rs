use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use observability::{current_trace_id, generate_trace_id, sanitize_trace_id, with_trace_id};

pub const TRACE_HEADER: &str = "x-trace-id";

/// Trace id of the request being handled, also available as an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceId(pub String);

/// Takes the caller's `X-Trace-Id` when it is well formed, otherwise a fresh
/// one, and runs the rest of the stack inside that trace scope. The id is
/// echoed back on the response.
pub async fn trace_id(mut request: Request, next: Next) -> Response {
    let trace_id = request
        .headers()
        .get(TRACE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(sanitize_trace_id)
        .unwrap_or_else(generate_trace_id);

    request.extensions_mut().insert(TraceId(trace_id.clone()));

    let mut response = with_trace_id(trace_id.clone(), next.run(request)).await;

    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(TRACE_HEADER, value);
    }
    response
}

/// Logging middleware
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();
    let trace_id = current_trace_id();

    tracing::info!(
        method = %method,
        uri = %uri,
        trace_id = %trace_id,
        "Request started"
    );

    let response = next.run(request).await;
    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = %duration.as_millis(),
        trace_id = %trace_id,
        "Request completed"
    );

    response
}
