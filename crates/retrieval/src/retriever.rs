use crate::knowledge::KnowledgeChunk;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// A scored chunk produced by one retrieval call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub id: String,
    pub title: String,
    pub body: String,
    pub score: f32,
}

impl RetrievalResult {
    pub fn from_chunk(chunk: &KnowledgeChunk, score: f32) -> Self {
        Self {
            id: chunk.id.clone(),
            title: chunk.title.clone(),
            body: chunk.body.clone(),
            score,
        }
    }

    pub fn context_ref(&self) -> ContextRef {
        ContextRef {
            id: self.id.clone(),
            title: self.title.clone(),
        }
    }
}

/// What callers get back about a chunk used to answer: never the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRef {
    pub id: String,
    pub title: String,
}

/// One tier of the retrieval cascade.
///
/// Retrieval is infallible by contract: a tier that cannot answer hands the
/// question to its fallback, and the last tier answers with what it has,
/// possibly nothing.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Up to `limit` results, best first; `limit == 0` means no limit.
    async fn retrieve(&self, question: &str, limit: usize) -> Vec<RetrievalResult>;
}

/// Stable sort by descending score, then truncate.
pub(crate) fn rank(results: &mut Vec<RetrievalResult>, limit: usize) {
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    if limit > 0 {
        results.truncate(limit);
    }
}

pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
