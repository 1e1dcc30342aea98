//! Embedding providers.
//!
//! An empty vector means "could not embed this text"; errors are reserved
//! for the provider being unreachable or answering garbage. The vector tiers
//! treat both the same way and fall back.

mod hashing;
mod openai;

pub use hashing::HashingEmbeddingClient;
pub use openai::{OpenAiEmbeddingClient, OpenAiEmbeddingConfig};

use crate::error::RetrievalError;
use async_trait::async_trait;

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// One vector for `text`; empty when nothing could be produced.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        Ok(if vectors.is_empty() {
            Vec::new()
        } else {
            vectors.swap_remove(0)
        })
    }

    /// One vector per input, positionally aligned. An input the provider
    /// could not embed yields an empty vector in its slot.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError>;
}
