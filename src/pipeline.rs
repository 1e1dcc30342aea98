//! Wires configuration into the ask and compare use cases.

use crate::agent::AskAgentUseCase;
use crate::compare::CompareUseCase;
use crate::config::RagConfig;
use crate::error::RagError;
use crate::llm::{GuardedLlmClient, HttpLlmClient, LlmClient};
use observability::{
    JsonFileLogger, JsonFileTelemetry, RagTelemetry, StructuredLogger, TracingLogger,
    TracingTelemetry,
};
use resilience::{CircuitBreaker, CircuitBreakerRegistry};
use retrieval::{
    EmbeddingClient, EmbeddingStore, HashingEmbeddingClient, KnowledgeBase, LexicalRetriever,
    OpenAiEmbeddingClient, RemoteVectorRetriever, Retriever, SparseScopedRetriever,
    VectorRetriever, VectorScopedRetriever,
};
use std::sync::Arc;

/// Registry name of the breaker guarding the LLM backend.
pub const LLM_BREAKER: &str = "llm";

/// Everything a caller needs to serve questions and comparisons.
pub struct RagPipeline {
    config: RagConfig,
    ask: AskAgentUseCase,
    compare: CompareUseCase,
    breakers: Arc<CircuitBreakerRegistry>,
}

impl RagPipeline {
    /// Builds the pipeline with the HTTP LLM client from `config.llm`.
    pub fn from_config(config: RagConfig) -> Result<Self, RagError> {
        let llm = Arc::new(HttpLlmClient::new(config.llm.clone())?);
        Self::with_llm(config, llm)
    }

    /// Same wiring around a caller-provided LLM client, which still gets
    /// wrapped in the breaker.
    pub fn with_llm(config: RagConfig, llm: Arc<dyn LlmClient>) -> Result<Self, RagError> {
        config.validate()?;

        let telemetry: Arc<dyn RagTelemetry> = match &config.telemetry.retrieval_log {
            Some(path) => Arc::new(JsonFileTelemetry::new(path)),
            None => Arc::new(TracingTelemetry),
        };
        let logger: Arc<dyn StructuredLogger> = match &config.telemetry.event_log {
            Some(path) => Arc::new(JsonFileLogger::new(path)),
            None => Arc::new(TracingLogger),
        };

        let embedder = embedder(&config)?;
        let knowledge = Arc::new(KnowledgeBase::load(&config.knowledge.path, config.knowledge.schema)?);
        let compare_knowledge = match &config.knowledge.compare_path {
            Some(path) if path != &config.knowledge.path => {
                Arc::new(KnowledgeBase::load(path, config.knowledge.schema)?)
            }
            _ => knowledge.clone(),
        };
        tracing::info!(
            chunks = knowledge.len(),
            compare_entries = compare_knowledge.len(),
            "knowledge loaded"
        );

        let vector_config = config.embeddings.vector();

        let lexical: Arc<dyn Retriever> =
            Arc::new(LexicalRetriever::new(knowledge.clone()).with_telemetry(telemetry.clone()));
        let vector: Arc<dyn Retriever> = Arc::new(
            VectorRetriever::new(
                knowledge,
                Arc::new(EmbeddingStore::new(&config.embeddings.store_path)),
                embedder.clone(),
                lexical,
                vector_config,
            )
            .with_telemetry(telemetry.clone()),
        );
        let remote: Arc<dyn Retriever> = Arc::new(
            RemoteVectorRetriever::new(config.remote_index.clone(), embedder.clone(), vector)
                .with_telemetry(telemetry.clone()),
        );

        let sparse = Arc::new(
            SparseScopedRetriever::new(compare_knowledge.clone()).with_telemetry(telemetry.clone()),
        );
        let scoped = Arc::new(
            VectorScopedRetriever::new(
                compare_knowledge,
                Arc::new(EmbeddingStore::new(&config.embeddings.compare_store_path)),
                embedder,
                sparse,
                vector_config,
            )
            .with_telemetry(telemetry),
        );

        let breakers = Arc::new(
            CircuitBreakerRegistry::new(
                config.circuit_breaker.breaker(),
                config.circuit_breaker.state_dir(),
            )
            .with_logger(logger.clone()),
        );
        let guarded: Arc<dyn LlmClient> = Arc::new(
            GuardedLlmClient::new(llm, breakers.get_or_create(LLM_BREAKER)).with_logger(logger),
        );

        Ok(Self {
            ask: AskAgentUseCase::new(remote, guarded.clone()).with_top_k(config.agent.top_k),
            compare: CompareUseCase::new(scoped, guarded).with_limit(config.agent.compare_limit),
            breakers,
            config,
        })
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn ask(&self) -> &AskAgentUseCase {
        &self.ask
    }

    pub fn compare(&self) -> &CompareUseCase {
        &self.compare
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn llm_breaker(&self) -> Arc<CircuitBreaker> {
        self.breakers.get_or_create(LLM_BREAKER)
    }
}

fn embedder(config: &RagConfig) -> Result<Arc<dyn EmbeddingClient>, RagError> {
    let provider = &config.embeddings.openai;
    if provider.api_key.trim().is_empty() {
        tracing::info!(dim = config.embeddings.hashing_dim, "no embedding key, using hashing embedder");
        return Ok(Arc::new(HashingEmbeddingClient::new(config.embeddings.hashing_dim)));
    }
    Ok(Arc::new(OpenAiEmbeddingClient::new(provider.clone())?))
}
