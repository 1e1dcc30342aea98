//! herorag retrieval
//!
//! Everything needed to turn a question into a ranked list of knowledge
//! chunks. The tiers are decorators over one [`Retriever`] trait, each owning
//! its fallback:
//!
//! - [`RemoteVectorRetriever`] asks a managed vector index,
//! - [`VectorRetriever`] scores stored embeddings locally,
//! - [`LexicalRetriever`] counts keyword overlap and always answers.
//!
//! No tier returns an error. When something is missing or down (API key,
//! index host, embeddings file, provider) the call quietly moves one tier
//! down and telemetry records which tier answered.
//!
//! ## Quick example
//!
//! ```
//! use retrieval::{KnowledgeBase, KnowledgeChunk, LexicalRetriever, Retriever};
//! use std::sync::Arc;
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # rt.block_on(async {
//! let kb = Arc::new(KnowledgeBase::from_chunks([
//!     KnowledgeChunk::new("cb", "Circuit Breaker", "Stops calling a failing backend"),
//!     KnowledgeChunk::new("rag", "RAG", "Retrieval augmented generation"),
//! ]));
//!
//! let lexical = LexicalRetriever::new(kb);
//! let hits = lexical.retrieve("What is a circuit breaker?", 1).await;
//! assert_eq!(hits[0].id, "cb");
//! # });
//! ```
//!
//! Comparing two known entries goes through [`ScopedRetriever`] instead,
//! which only scores the ids it is handed.

pub mod embedding_store;
pub mod embeddings;
pub mod error;
pub mod knowledge;
pub mod lexical;
pub mod remote;
pub mod retriever;
pub mod scoped;
pub mod similarity;
pub mod vector;

pub use embedding_store::{EmbeddingIndex, EmbeddingStore};
pub use embeddings::{
    EmbeddingClient, HashingEmbeddingClient, OpenAiEmbeddingClient, OpenAiEmbeddingConfig,
};
pub use error::RetrievalError;
pub use knowledge::{KnowledgeBase, KnowledgeChunk, KnowledgeSchema};
pub use lexical::{normalize, term_frequencies, tokenize, LexicalRetriever};
pub use remote::{RemoteIndexConfig, RemoteVectorRetriever, UNTITLED};
pub use retriever::{ContextRef, RetrievalResult, Retriever};
pub use scoped::{
    ScopedRetriever, SparseScopedRetriever, VectorScopedRetriever, DEFAULT_COMPARE_QUESTION,
};
pub use similarity::{cosine_dense, cosine_sparse, l2_normalize_in_place, SparseVector};
pub use vector::{VectorRetriever, VectorRetrieverConfig};
