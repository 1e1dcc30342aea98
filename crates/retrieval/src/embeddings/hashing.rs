use super::EmbeddingClient;
use crate::error::RetrievalError;
use crate::lexical::tokenize;
use crate::similarity::l2_normalize_in_place;
use async_trait::async_trait;
use fxhash::hash64;

/// Offline embedder: feature-hashes each token into a fixed number of
/// buckets with a hash-derived sign, then L2-normalizes.
///
/// Deterministic and dependency-free, so texts sharing words land close
/// together. Used when no provider key is configured and throughout tests.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbeddingClient {
    dim: usize,
}

impl Default for HashingEmbeddingClient {
    fn default() -> Self {
        Self { dim: 256 }
    }
}

impl HashingEmbeddingClient {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Zero tokens embed to an empty vector.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut v = vec![0f32; self.dim];
        for token in &tokens {
            let h = hash64(token.as_bytes());
            let bucket = (h % self.dim as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        l2_normalize_in_place(&mut v);
        v
    }
}

#[async_trait]
impl EmbeddingClient for HashingEmbeddingClient {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }
}
