//! Local embedding similarity over the knowledge base.
//!
//! Every call walks the same ladder and hands the question to the fallback
//! tier at the first rung that cannot be satisfied: embeddings disabled,
//! empty knowledge base, unreadable store, no vectors, question not
//! embeddable, nothing scored.

use crate::embedding_store::{EmbeddingIndex, EmbeddingStore};
use crate::embeddings::EmbeddingClient;
use crate::knowledge::{KnowledgeBase, KnowledgeChunk};
use crate::retriever::{elapsed_ms, rank, RetrievalResult, Retriever};
use crate::similarity::cosine_dense;
use async_trait::async_trait;
use observability::{NullTelemetry, RagTelemetry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorRetrieverConfig {
    /// Off means every call goes straight to the fallback.
    pub use_embeddings: bool,
    /// Embed and persist chunks that have no stored vector yet.
    pub auto_refresh: bool,
}

pub struct VectorRetriever {
    knowledge: Arc<KnowledgeBase>,
    store: Arc<EmbeddingStore>,
    embedder: Arc<dyn EmbeddingClient>,
    fallback: Arc<dyn Retriever>,
    config: VectorRetrieverConfig,
    telemetry: Arc<dyn RagTelemetry>,
}

impl VectorRetriever {
    pub fn new(
        knowledge: Arc<KnowledgeBase>,
        store: Arc<EmbeddingStore>,
        embedder: Arc<dyn EmbeddingClient>,
        fallback: Arc<dyn Retriever>,
        config: VectorRetrieverConfig,
    ) -> Self {
        Self {
            knowledge,
            store,
            embedder,
            fallback,
            config,
            telemetry: Arc::new(NullTelemetry),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn RagTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    async fn via_fallback(&self, question: &str, limit: usize, start: Instant) -> Vec<RetrievalResult> {
        let results = self.fallback.retrieve(question, limit).await;
        self.telemetry
            .record("rag.retrieve.fallback", "fallback", elapsed_ms(start), limit);
        results
    }

    async fn vectors(&self) -> Option<EmbeddingIndex> {
        let mut stored = match self.store.load_all() {
            Ok(stored) => stored,
            Err(err) => {
                tracing::warn!(path = %self.store.path().display(), error = %err, "embedding store unreadable");
                return None;
            }
        };

        if self.config.auto_refresh {
            let chunks: Vec<&KnowledgeChunk> = self.knowledge.all().iter().collect();
            backfill(&chunks, &mut stored, self.embedder.as_ref(), &self.store).await;
        }
        Some(stored)
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn retrieve(&self, question: &str, limit: usize) -> Vec<RetrievalResult> {
        let start = Instant::now();

        if !self.config.use_embeddings {
            tracing::debug!("embeddings disabled");
            return self.via_fallback(question, limit, start).await;
        }
        if self.knowledge.is_empty() {
            return self.via_fallback(question, limit, start).await;
        }

        let Some(vectors) = self.vectors().await else {
            return self.via_fallback(question, limit, start).await;
        };
        if vectors.is_empty() {
            tracing::debug!("no stored embeddings");
            return self.via_fallback(question, limit, start).await;
        }

        let query = match self.embedder.embed_text(question).await {
            Ok(v) if !v.is_empty() => v,
            Ok(_) => return self.via_fallback(question, limit, start).await,
            Err(err) => {
                tracing::warn!(error = %err, "question embedding failed");
                return self.via_fallback(question, limit, start).await;
            }
        };

        let mut results = score_chunks(self.knowledge.all().iter(), &vectors, &query);
        if results.is_empty() {
            return self.via_fallback(question, limit, start).await;
        }

        rank(&mut results, limit);
        self.telemetry
            .record("rag.retrieve", "vector", elapsed_ms(start), limit);
        results
    }
}

/// Cosine of `query` against each chunk that has a vector; the rest are skipped.
pub(crate) fn score_chunks<'a>(
    chunks: impl Iterator<Item = &'a KnowledgeChunk>,
    vectors: &EmbeddingIndex,
    query: &[f32],
) -> Vec<RetrievalResult> {
    chunks
        .filter_map(|chunk| {
            let vector = vectors.get(&chunk.id)?;
            Some(RetrievalResult::from_chunk(chunk, cosine_dense(query, vector)))
        })
        .collect()
}

/// Embeds every chunk missing from `stored` in one batch, persisting each new
/// vector. Embedding failures mean nothing new; persistence failures are
/// logged and the vector is still used.
pub(crate) async fn backfill(
    chunks: &[&KnowledgeChunk],
    stored: &mut EmbeddingIndex,
    embedder: &dyn EmbeddingClient,
    store: &EmbeddingStore,
) {
    let missing: Vec<&KnowledgeChunk> = chunks
        .iter()
        .copied()
        .filter(|c| !stored.contains_key(&c.id))
        .collect();
    if missing.is_empty() {
        return;
    }

    let texts: Vec<String> = missing.iter().map(|c| c.embedding_text()).collect();
    let vectors = match embedder.embed_documents(&texts).await {
        Ok(vectors) => vectors,
        Err(err) => {
            tracing::warn!(missing = missing.len(), error = %err, "embedding backfill failed");
            return;
        }
    };

    for (chunk, vector) in missing.into_iter().zip(vectors) {
        if vector.is_empty() {
            continue;
        }
        if let Err(err) = store.save_one(&chunk.id, &vector) {
            tracing::warn!(id = %chunk.id, error = %err, "failed to persist embedding");
        }
        stored.insert(chunk.id.clone(), vector);
    }
}
