use super::EmbeddingClient;
use crate::error::RetrievalError;
use async_trait::async_trait;
use resilience::{execute_with_retry_async, RetryConfig};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiEmbeddingConfig {
    pub api_key: String,
    /// Base URL; `/embeddings` is appended.
    pub base_url: String,
    pub model: String,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for OpenAiEmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            connect_timeout_secs: 10,
            timeout_secs: 30,
            retry: RetryConfig::default(),
        }
    }
}

/// OpenAI-compatible `/embeddings` client.
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddingClient {
    http: reqwest::Client,
    endpoint: String,
    config: OpenAiEmbeddingConfig,
}

enum Attempt {
    Transient(String),
    Permanent(String),
}

impl OpenAiEmbeddingClient {
    pub fn new(config: OpenAiEmbeddingConfig) -> Result<Self, RetrievalError> {
        if config.api_key.trim().is_empty() {
            return Err(RetrievalError::InvalidConfig(
                "an API key is required for the embeddings provider".into(),
            ));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RetrievalError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(Self {
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            http,
            config,
        })
    }

    async fn send(&self, payload: &Value) -> Result<Value, Attempt> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.config.api_key.trim())
            .json(payload)
            .send()
            .await
            .map_err(|e| Attempt::Transient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(Attempt::Transient(format!("HTTP error {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Attempt::Permanent(format!("HTTP error {status}: {body}")));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| Attempt::Permanent(format!("invalid JSON response: {e}")))
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let payload = json!({ "input": texts, "model": self.config.model });
        let outcome = execute_with_retry_async(
            &self.config.retry,
            |err: &Attempt| matches!(err, Attempt::Transient(_)),
            |_attempt| self.send(&payload),
        )
        .await;

        let response = match outcome.result {
            Ok(value) => value,
            Err(Attempt::Transient(msg)) | Err(Attempt::Permanent(msg)) => {
                tracing::warn!(attempts = outcome.attempts, error = %msg, "embedding request failed");
                return Err(RetrievalError::Embedding(msg));
            }
        };

        parse_embeddings(response, texts.len())
    }
}

/// Reads `data[].embedding`, placing each vector at its `index` when the
/// provider sends one. Slots the provider left out stay empty.
pub(crate) fn parse_embeddings(value: Value, expected: usize) -> Result<Vec<Vec<f32>>, RetrievalError> {
    let Some(Value::Array(items)) = value.get("data").cloned() else {
        return Err(RetrievalError::InvalidResponse(
            "response did not contain a data array".into(),
        ));
    };

    let mut vectors = vec![Vec::new(); expected];
    for (position, item) in items.iter().enumerate() {
        let slot = item
            .get("index")
            .and_then(Value::as_u64)
            .map(|i| i as usize)
            .unwrap_or(position);
        let Some(Value::Array(values)) = item.get("embedding") else {
            continue;
        };
        if let Some(target) = vectors.get_mut(slot) {
            *target = values
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect();
        }
    }

    if vectors.iter().all(Vec::is_empty) {
        return Err(RetrievalError::InvalidResponse(
            "no embeddings could be read".into(),
        ));
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn config(base_url: String) -> OpenAiEmbeddingConfig {
        OpenAiEmbeddingConfig {
            api_key: "sk-test".into(),
            base_url,
            retry: RetryConfig::default().with_base_delay(Duration::from_millis(1)),
            ..Default::default()
        }
    }

    #[test]
    fn requires_api_key() {
        let err = OpenAiEmbeddingClient::new(OpenAiEmbeddingConfig::default()).unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidConfig(_)));
    }

    #[test]
    fn parse_respects_index_and_gaps() {
        let value = json!({"data": [
            {"index": 1, "embedding": [0.5, 0.5]},
            {"index": 0, "embedding": [1.0]},
            {"index": 2, "embedding": "broken"}
        ]});
        let vectors = parse_embeddings(value, 3).unwrap();
        assert_eq!(vectors, vec![vec![1.0], vec![0.5, 0.5], vec![]]);
    }

    #[test]
    fn parse_rejects_missing_data() {
        assert!(parse_embeddings(json!({"error": "nope"}), 1).is_err());
        assert!(parse_embeddings(json!({"data": []}), 1).is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn embeds_batch_and_sends_model() {
        let app = Router::new().route(
            "/v1/embeddings",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["model"], "text-embedding-3-small");
                let data: Vec<Value> = body["input"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .enumerate()
                    .map(|(i, _)| json!({"index": i, "embedding": [i as f32, 1.0]}))
                    .collect();
                Json(json!({ "data": data }))
            }),
        );
        let base = serve(app).await;
        let client = OpenAiEmbeddingClient::new(config(format!("{base}/v1"))).unwrap();

        let vectors = client
            .embed_documents(&["a".into(), "b".into()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![0.0, 1.0], vec![1.0, 1.0]]);

        let single = client.embed_text("a").await.unwrap();
        assert_eq!(single, vec![0.0, 1.0]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retries_server_errors() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/embeddings",
            post(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(StatusCode::SERVICE_UNAVAILABLE)
                    } else {
                        Ok(Json(json!({"data": [{"embedding": [1.0]}]})))
                    }
                }
            }),
        );
        let base = serve(app).await;
        let client = OpenAiEmbeddingClient::new(config(base)).unwrap();

        assert_eq!(client.embed_text("x").await.unwrap(), vec![1.0]);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn client_errors_are_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/embeddings",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    StatusCode::UNAUTHORIZED
                }
            }),
        );
        let base = serve(app).await;
        let client = OpenAiEmbeddingClient::new(config(base)).unwrap();

        let err = client.embed_text("x").await.unwrap_err();
        assert!(matches!(err, RetrievalError::Embedding(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
