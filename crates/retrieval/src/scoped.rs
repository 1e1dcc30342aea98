//! Retrieval restricted to a caller-chosen set of entries, used when
//! comparing two known knowledge entries rather than searching them all.

use crate::embedding_store::EmbeddingStore;
use crate::embeddings::EmbeddingClient;
use crate::knowledge::{KnowledgeBase, KnowledgeChunk};
use crate::lexical::term_frequencies;
use crate::retriever::{elapsed_ms, rank, RetrievalResult};
use crate::similarity::cosine_sparse;
use crate::vector::{backfill, score_chunks, VectorRetrieverConfig};
use async_trait::async_trait;
use observability::{NullTelemetry, RagTelemetry};
use std::sync::Arc;
use std::time::Instant;

/// Question used for the vector tier when the caller sends a blank one.
pub const DEFAULT_COMPARE_QUESTION: &str = "Compare their attributes and summarize the result";

/// Words shorter than this carry no weight in the sparse tier.
const MIN_TERM_LEN: usize = 3;

#[async_trait]
pub trait ScopedRetriever: Send + Sync {
    /// Scores only the entries named in `ids`; unknown ids are ignored.
    async fn retrieve_among(&self, ids: &[String], question: &str, limit: usize) -> Vec<RetrievalResult>;
}

fn unique(ids: &[String]) -> Vec<&str> {
    let mut seen = Vec::with_capacity(ids.len());
    for id in ids {
        let id = id.trim();
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}

/// Term-frequency cosine between the question and each entry.
pub struct SparseScopedRetriever {
    knowledge: Arc<KnowledgeBase>,
    telemetry: Arc<dyn RagTelemetry>,
}

impl SparseScopedRetriever {
    pub fn new(knowledge: Arc<KnowledgeBase>) -> Self {
        Self {
            knowledge,
            telemetry: Arc::new(NullTelemetry),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn RagTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }
}

#[async_trait]
impl ScopedRetriever for SparseScopedRetriever {
    async fn retrieve_among(&self, ids: &[String], question: &str, limit: usize) -> Vec<RetrievalResult> {
        let start = Instant::now();
        let query = term_frequencies(question, MIN_TERM_LEN);

        let mut results: Vec<RetrievalResult> = self
            .knowledge
            .find_by_ids(&unique(ids))
            .into_iter()
            .map(|chunk| {
                let text = format!("{} {}", chunk.title, chunk.body);
                let score = cosine_sparse(&query, &term_frequencies(&text, MIN_TERM_LEN));
                RetrievalResult::from_chunk(chunk, score)
            })
            .collect();

        rank(&mut results, limit);
        self.telemetry
            .record("rag.retrieve", "lexical", elapsed_ms(start), limit);
        results
    }
}

/// Dense cosine over stored (or backfilled) embeddings of the requested
/// entries. Needs at least two vectors and two scored entries, otherwise
/// the sparse tier answers.
pub struct VectorScopedRetriever {
    knowledge: Arc<KnowledgeBase>,
    store: Arc<EmbeddingStore>,
    embedder: Arc<dyn EmbeddingClient>,
    fallback: Arc<dyn ScopedRetriever>,
    config: VectorRetrieverConfig,
    telemetry: Arc<dyn RagTelemetry>,
}

impl VectorScopedRetriever {
    pub fn new(
        knowledge: Arc<KnowledgeBase>,
        store: Arc<EmbeddingStore>,
        embedder: Arc<dyn EmbeddingClient>,
        fallback: Arc<dyn ScopedRetriever>,
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

    async fn via_fallback(
        &self,
        ids: &[String],
        question: &str,
        limit: usize,
        start: Instant,
    ) -> Vec<RetrievalResult> {
        let results = self.fallback.retrieve_among(ids, question, limit).await;
        self.telemetry
            .record("rag.retrieve.fallback", "fallback", elapsed_ms(start), limit);
        results
    }
}

#[async_trait]
impl ScopedRetriever for VectorScopedRetriever {
    async fn retrieve_among(&self, ids: &[String], question: &str, limit: usize) -> Vec<RetrievalResult> {
        let start = Instant::now();
        if !self.config.use_embeddings {
            return self.via_fallback(ids, question, limit, start).await;
        }

        let query_text = match question.trim() {
            "" => DEFAULT_COMPARE_QUESTION,
            q => q,
        };

        let chunks: Vec<&KnowledgeChunk> = self.knowledge.find_by_ids(&unique(ids));
        if chunks.is_empty() {
            return self.via_fallback(ids, question, limit, start).await;
        }

        let chunk_ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        let mut vectors = match self.store.load_by_ids(&chunk_ids) {
            Ok(vectors) => vectors,
            Err(err) => {
                tracing::warn!(error = %err, "embedding store unreadable");
                return self.via_fallback(ids, question, limit, start).await;
            }
        };
        if self.config.auto_refresh {
            backfill(&chunks, &mut vectors, self.embedder.as_ref(), &self.store).await;
        }
        if vectors.len() < 2 {
            return self.via_fallback(ids, question, limit, start).await;
        }

        let query = match self.embedder.embed_text(query_text).await {
            Ok(v) if !v.is_empty() => v,
            Ok(_) => return self.via_fallback(ids, question, limit, start).await,
            Err(err) => {
                tracing::warn!(error = %err, "question embedding failed");
                return self.via_fallback(ids, question, limit, start).await;
            }
        };

        let mut results = score_chunks(chunks.into_iter(), &vectors, &query);
        if results.len() < 2 {
            return self.via_fallback(ids, question, limit, start).await;
        }

        rank(&mut results, limit);
        self.telemetry
            .record("rag.retrieve", "vector", elapsed_ms(start), limit);
        results
    }
}
