//! Configuration for the whole RAG pipeline.
//!
//! One document covers every stage: where the knowledge base lives, which
//! embedding provider and vector index to use, how the LLM breaker behaves
//! and where telemetry goes. Every section has defaults, so an empty file is
//! a valid (fully lexical, offline-embedding) setup.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//!
//! knowledge:
//!   path: "storage/knowledge/agent.json"
//!   schema: agent
//!   compare_path: "storage/knowledge/heroes.json"
//!
//! embeddings:
//!   use_embeddings: true
//!   auto_refresh: true
//!   store_path: "storage/embeddings/agent.json"
//!   openai:
//!     api_key: "sk-..."
//!     model: "text-embedding-3-small"
//!
//! remote_index:
//!   index_host: "https://my-index.svc.pinecone.io"
//!   api_key: "pc-..."
//!
//! circuit_breaker:
//!   failure_threshold: 3
//!   open_ttl_secs: 30
//!   half_open_max_calls: 1
//!   state_dir: "storage/breakers"
//!
//! llm:
//!   endpoint: "http://localhost:8081/v1/chat"
//!   model: "gpt-4o-mini"
//!
//! telemetry:
//!   retrieval_log: "storage/logs/rag.jsonl"
//!   event_log: "storage/logs/events.jsonl"
//!
//! agent:
//!   top_k: 3
//! ```
//!
//! [`RagConfig::load`] layers `HERORAG__<SECTION>__<KEY>` environment
//! variables over the file, e.g. `HERORAG__LLM__ENDPOINT`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use resilience::{CircuitBreakerConfig, RetryConfig};
use retrieval::{KnowledgeSchema, OpenAiEmbeddingConfig, RemoteIndexConfig, VectorRetrieverConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("failed to assemble layered config: {0}")]
    Layered(#[from] config::ConfigError),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Configuration format version.
    pub version: String,
    pub knowledge: KnowledgeConfig,
    pub embeddings: EmbeddingsConfig,
    pub remote_index: RemoteIndexConfig,
    pub circuit_breaker: CircuitBreakerSettings,
    pub llm: LlmConfig,
    pub telemetry: TelemetryConfig,
    pub agent: AgentConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            knowledge: KnowledgeConfig::default(),
            embeddings: EmbeddingsConfig::default(),
            remote_index: RemoteIndexConfig::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            llm: LlmConfig::default(),
            telemetry: TelemetryConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

impl RagConfig {
    /// Load a YAML configuration file from the given path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: RagConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Layered load: the given file (or `herorag.{yaml,toml,json}` in the
    /// working directory when present), then `HERORAG__*` environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigLoadError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("herorag").required(false),
        };

        let config: RagConfig = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("HERORAG")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.circuit_breaker.validate()?;
        self.llm.validate()?;
        self.agent.validate()?;

        if self.embeddings.hashing_dim == 0 {
            return Err(ConfigLoadError::Validation(
                "embeddings.hashing_dim must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// Knowledge base answered by the ask use case.
    pub path: PathBuf,
    pub schema: KnowledgeSchema,
    /// Knowledge base for comparisons; `path` is reused when absent.
    pub compare_path: Option<PathBuf>,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("storage/knowledge/agent.json"),
            schema: KnowledgeSchema::Auto,
            compare_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingsConfig {
    pub use_embeddings: bool,
    pub auto_refresh: bool,
    pub store_path: PathBuf,
    pub compare_store_path: PathBuf,
    /// Provider settings; with no API key the offline hashing embedder is used.
    pub openai: OpenAiEmbeddingConfig,
    pub hashing_dim: usize,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            use_embeddings: false,
            auto_refresh: false,
            store_path: PathBuf::from("storage/embeddings/agent.json"),
            compare_store_path: PathBuf::from("storage/embeddings/heroes.json"),
            openai: OpenAiEmbeddingConfig::default(),
            hashing_dim: 256,
        }
    }
}

impl EmbeddingsConfig {
    pub fn vector(&self) -> VectorRetrieverConfig {
        VectorRetrieverConfig {
            use_embeddings: self.use_embeddings,
            auto_refresh: self.auto_refresh,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub open_ttl_secs: u64,
    pub half_open_max_calls: u32,
    /// Directory of per-breaker state files; process-local state when absent.
    pub state_dir: Option<PathBuf>,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            failure_threshold: defaults.failure_threshold,
            open_ttl_secs: defaults.open_ttl_secs,
            half_open_max_calls: defaults.half_open_max_calls,
            state_dir: None,
        }
    }
}

impl CircuitBreakerSettings {
    pub fn breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            open_ttl_secs: self.open_ttl_secs,
            half_open_max_calls: self.half_open_max_calls,
        }
    }

    /// Blank paths count as absent.
    pub fn state_dir(&self) -> Option<PathBuf> {
        self.state_dir
            .clone()
            .filter(|dir| !dir.as_os_str().is_empty())
    }

    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.failure_threshold < 1 {
            return Err(ConfigLoadError::Validation(
                "circuit_breaker.failure_threshold must be >= 1".into(),
            ));
        }
        if self.open_ttl_secs < 1 {
            return Err(ConfigLoadError::Validation(
                "circuit_breaker.open_ttl_secs must be >= 1".into(),
            ));
        }
        if self.half_open_max_calls < 1 {
            return Err(ConfigLoadError::Validation(
                "circuit_breaker.half_open_max_calls must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Chat endpoint receiving `{messages, model}`.
    pub endpoint: String,
    pub model: String,
    /// Sent as a bearer token when non-empty.
    pub api_key: String,
    pub system_prompt: String,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8081/v1/chat".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: String::new(),
            system_prompt: "You are a precise technical assistant. Answer plainly, without emojis or decoration."
                .to_string(),
            connect_timeout_secs: 10,
            timeout_secs: 30,
            retry: RetryConfig::default(),
        }
    }
}

impl LlmConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigLoadError::Validation("llm.endpoint must be set".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigLoadError::Validation("llm.timeout_secs must be >= 1".into()));
        }
        Ok(())
    }

    /// Longest one `ask` can take: every attempt running into the request
    /// timeout plus every backoff delay at its jittered maximum.
    pub fn worst_case_latency(&self) -> Duration {
        let attempts = self.retry.max_attempts();
        let requests = Duration::from_secs(self.timeout_secs).saturating_mul(attempts);
        (0..self.retry.max_retries).fold(requests, |total, attempt| {
            let delay = self.retry.with_jitter(false).delay_for(attempt);
            let delay = if self.retry.jitter { delay + delay / 2 } else { delay };
            total.saturating_add(delay)
        })
    }
}

/// JSON-lines sinks; `None` sends events to `tracing` instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub retrieval_log: Option<PathBuf>,
    pub event_log: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Chunks retrieved per question.
    pub top_k: usize,
    /// Entries scored per comparison.
    pub compare_limit: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            compare_limit: 5,
        }
    }
}

impl AgentConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.top_k == 0 {
            return Err(ConfigLoadError::Validation("agent.top_k must be >= 1".into()));
        }
        // A comparison needs both entries back.
        if self.compare_limit == 1 {
            return Err(ConfigLoadError::Validation(
                "agent.compare_limit must be 0 (no limit) or >= 2".into(),
            ));
        }
        Ok(())
    }
}
