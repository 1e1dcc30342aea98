//! herorag: grounded answers over a small knowledge base.
//!
//! This crate ties the workspace together. Questions go through a retrieval
//! cascade (remote vector index, then local embeddings, then keyword
//! overlap), the prompt is built strictly from what came back, and the LLM
//! call runs behind a persisted circuit breaker so an outage fails fast
//! instead of piling up timeouts.
//!
//! ```no_run
//! use herorag::{RagConfig, RagPipeline};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RagConfig::load(None)?;
//! let pipeline = RagPipeline::from_config(config)?;
//!
//! let answer = pipeline.ask().ask("What is a circuit breaker?").await?;
//! for ctx in &answer.contexts {
//!     println!("{} ({})", ctx.title, ctx.id);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The pieces live in their own crates and are re-exported here:
//! [`observability`] for trace ids and event sinks, [`resilience`] for the
//! breaker and retry, [`retrieval`] for every retrieval tier.

pub mod agent;
pub mod compare;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;

pub use agent::{AgentAnswer, AskAgentUseCase, REFUSAL_MESSAGE};
pub use compare::{CompareUseCase, ComparisonAnswer};
pub use config::{
    AgentConfig, CircuitBreakerSettings, ConfigLoadError, EmbeddingsConfig, KnowledgeConfig,
    LlmConfig, RagConfig, TelemetryConfig,
};
pub use error::RagError;
pub use llm::{GuardedLlmClient, HttpLlmClient, LlmClient, LlmError};
pub use pipeline::{RagPipeline, LLM_BREAKER};

pub use observability;
pub use resilience;
pub use retrieval;
