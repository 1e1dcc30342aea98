//! LLM transport and the circuit-breaker decorator around it.

use crate::config::LlmConfig;
use async_trait::async_trait;
use observability::{StructuredLogger, TracingLogger};
use resilience::{execute_with_retry_async, CircuitBreaker, CircuitOpen};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpen),

    #[error("LLM transport failed: {0}")]
    Transport(String),

    #[error("LLM backend answered {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid LLM response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Worth another attempt: the backend may answer next time.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Transport(_) => true,
            LlmError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// The model's answer to `prompt`, trimmed and never empty.
    async fn ask(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Chat endpoint client posting `{messages: [system, user], model}`.
///
/// Transport errors and 5xx are retried with exponential backoff; anything
/// else is final.
#[derive(Debug, Clone)]
pub struct HttpLlmClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl HttpLlmClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Transport(format!("HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> &str {
        self.config.endpoint.trim().trim_end_matches('/')
    }

    async fn send(&self, payload: &Value) -> Result<String, LlmError> {
        let mut request = self.http.post(self.endpoint()).json(payload);
        let key = self.config.api_key.trim();
        if !key.is_empty() {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("error").map(error_message))
                .unwrap_or_else(|| snippet(&body));
            return Err(LlmError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let decoded: Value = serde_json::from_str(&body).map_err(|_| {
            LlmError::InvalidResponse(format!("not JSON: {}", snippet(&body)))
        })?;
        extract_answer(&decoded)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn ask(&self, prompt: &str) -> Result<String, LlmError> {
        let payload = json!({
            "messages": [
                { "role": "system", "content": self.config.system_prompt },
                { "role": "user", "content": prompt },
            ],
            "model": self.config.model,
        });

        let outcome = execute_with_retry_async(
            &self.config.retry,
            LlmError::is_transient,
            |_attempt| self.send(&payload),
        )
        .await;

        if outcome.result.is_err() {
            tracing::debug!(attempts = outcome.attempts, "LLM request gave up");
        }
        outcome.into_result()
    }
}

fn snippet(body: &str) -> String {
    body.trim().chars().take(200).collect()
}

fn error_message(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

fn non_blank(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Accepts the proxy envelope `{ok, content|answer|text}`, the envelope
/// wrapping a raw completion `{ok, raw: {choices}}`, or a bare chat
/// completion `{choices[0].message.content}`.
pub(crate) fn extract_answer(decoded: &Value) -> Result<String, LlmError> {
    if let Some(error) = decoded.get("error").filter(|e| !e.is_null()) {
        return Err(LlmError::InvalidResponse(error_message(error)));
    }

    let completion = |v: &Value| non_blank(v.pointer("/choices/0/message/content"));

    let answer = match decoded.get("ok") {
        Some(ok) if ok != &Value::Bool(true) => {
            return Err(LlmError::InvalidResponse("backend reported ok=false".into()));
        }
        Some(_) => ["content", "answer", "text"]
            .iter()
            .find_map(|key| non_blank(decoded.get(*key)))
            .or_else(|| decoded.get("raw").and_then(completion)),
        None => completion(decoded),
    };

    answer.ok_or_else(|| LlmError::InvalidResponse("response carried no content".into()))
}

/// Runs every call through a [`CircuitBreaker`] and logs `llm.request`.
///
/// An open breaker rejects the call without touching the inner client.
/// Every inner error counts as a breaker failure.
pub struct GuardedLlmClient {
    inner: Arc<dyn LlmClient>,
    breaker: Arc<CircuitBreaker>,
    logger: Arc<dyn StructuredLogger>,
}

impl GuardedLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            inner,
            breaker,
            logger: Arc::new(TracingLogger),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn StructuredLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

#[async_trait]
impl LlmClient for GuardedLlmClient {
    async fn ask(&self, prompt: &str) -> Result<String, LlmError> {
        // Dropping this future mid-call drops the permit, which records a failure.
        let permit = self.breaker.admit()?;
        let start = Instant::now();

        let result = self.inner.ask(prompt).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => {
                permit.succeeded();
                self.logger.log(
                    "llm.request",
                    json!({
                        "state": self.breaker.state().as_str(),
                        "ok": true,
                        "latency_ms": latency_ms,
                    }),
                );
            }
            Err(err) => {
                permit.failed();
                self.logger.log(
                    "llm.request",
                    json!({
                        "state": self.breaker.state().as_str(),
                        "ok": false,
                        "error": err.to_string(),
                        "latency_ms": latency_ms,
                    }),
                );
            }
        }
        result
    }
}
