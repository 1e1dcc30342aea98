//! Managed vector index (Pinecone-compatible `/query` endpoint), the first
//! tier of the cascade.

use crate::embeddings::EmbeddingClient;
use crate::retriever::{elapsed_ms, RetrievalResult, Retriever};
use async_trait::async_trait;
use observability::{NullTelemetry, RagTelemetry};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Title given to a match whose metadata carries none.
pub const UNTITLED: &str = "Untitled";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteIndexConfig {
    /// Base URL of the index, e.g. `https://my-index.svc.pinecone.io`.
    pub index_host: String,
    pub api_key: String,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
    /// `topK` sent when the caller asks for every match (`limit == 0`).
    pub max_top_k: usize,
}

impl Default for RemoteIndexConfig {
    fn default() -> Self {
        Self {
            index_host: String::new(),
            api_key: String::new(),
            connect_timeout_secs: 5,
            timeout_secs: 10,
            max_top_k: 100,
        }
    }
}

impl RemoteIndexConfig {
    /// Both host and key are needed to query.
    pub fn is_configured(&self) -> bool {
        !self.index_host.trim().is_empty() && !self.api_key.trim().is_empty()
    }

    /// The index rejects `topK: 0`, so "no limit" is capped at `max_top_k`.
    fn top_k(&self, limit: usize) -> usize {
        match limit {
            0 => self.max_top_k.max(1),
            n => n,
        }
    }

    fn query_url(&self) -> String {
        format!("{}/query", self.index_host.trim().trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<Match>,
}

#[derive(Debug, Deserialize)]
struct Match {
    id: String,
    #[serde(default)]
    score: Option<f32>,
    #[serde(default)]
    metadata: Option<Value>,
}

impl Match {
    fn into_result(self) -> RetrievalResult {
        let meta = |key: &str| {
            self.metadata
                .as_ref()
                .and_then(|m| m.get(key))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        RetrievalResult {
            title: meta("title").unwrap_or_else(|| UNTITLED.to_string()),
            body: meta("text").unwrap_or_default(),
            score: self.score.unwrap_or(0.0),
            id: self.id,
        }
    }
}

pub struct RemoteVectorRetriever {
    config: RemoteIndexConfig,
    http: reqwest::Client,
    embedder: Arc<dyn EmbeddingClient>,
    fallback: Arc<dyn Retriever>,
    telemetry: Arc<dyn RagTelemetry>,
}

impl RemoteVectorRetriever {
    pub fn new(
        config: RemoteIndexConfig,
        embedder: Arc<dyn EmbeddingClient>,
        fallback: Arc<dyn Retriever>,
    ) -> Self {
        // A builder failure only happens when the TLS backend cannot load;
        // the default client then still carries the total timeout per request.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            config,
            http,
            embedder,
            fallback,
            telemetry: Arc::new(NullTelemetry),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn RagTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    async fn via_fallback(&self, question: &str, limit: usize, start: Instant) -> Vec<RetrievalResult> {
        let results = self.fallback.retrieve(question, limit).await;
        self.telemetry.record(
            "rag.retrieve.pinecone.fallback",
            "fallback",
            elapsed_ms(start),
            limit,
        );
        results
    }

    /// Matches for `vector`, or `None` on any transport or protocol failure.
    async fn query(&self, vector: &[f32], limit: usize) -> Option<Vec<RetrievalResult>> {
        let payload = json!({
            "vector": vector,
            "topK": self.config.top_k(limit),
            "includeMetadata": true,
        });

        let response = self
            .http
            .post(self.config.query_url())
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .header("Api-Key", self.config.api_key.trim())
            .json(&payload)
            .send()
            .await
            .map_err(|err| tracing::warn!(error = %err, "vector index request failed"))
            .ok()?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            tracing::warn!(%status, "vector index answered with an error status");
            return None;
        }

        let decoded: QueryResponse = response
            .json()
            .await
            .map_err(|err| tracing::warn!(error = %err, "vector index response undecodable"))
            .ok()?;

        Some(decoded.matches.into_iter().map(Match::into_result).collect())
    }
}

#[async_trait]
impl Retriever for RemoteVectorRetriever {
    async fn retrieve(&self, question: &str, limit: usize) -> Vec<RetrievalResult> {
        let start = Instant::now();

        if !self.config.is_configured() {
            return self.via_fallback(question, limit, start).await;
        }

        let vector = match self.embedder.embed_text(question).await {
            Ok(v) if !v.is_empty() => v,
            Ok(_) => return self.via_fallback(question, limit, start).await,
            Err(err) => {
                tracing::warn!(error = %err, "question embedding failed");
                return self.via_fallback(question, limit, start).await;
            }
        };

        match self.query(&vector, limit).await {
            Some(results) if !results.is_empty() => {
                self.telemetry
                    .record("rag.retrieve.pinecone", "pinecone", elapsed_ms(start), limit);
                results
            }
            _ => self.via_fallback(question, limit, start).await,
        }
    }
}
