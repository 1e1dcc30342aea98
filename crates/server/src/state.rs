use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use herorag::{RagConfig, RagPipeline};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<ServerConfig>,

    /// Ask and compare use cases plus the breaker registry, shared by every
    /// request.
    pub pipeline: Arc<RagPipeline>,
}

impl ServerState {
    /// Loads the pipeline configuration named by `config.rag_config` and
    /// wires the pipeline.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let rag = RagConfig::load(config.rag_config.as_deref())
            .map_err(|err| ServerError::Config(err.to_string()))?;
        config
            .ensure_covers_llm(&rag.llm)
            .map_err(|err| ServerError::Config(err.to_string()))?;
        let pipeline = RagPipeline::from_config(rag)?;
        Ok(Self::with_pipeline(config, pipeline))
    }

    pub fn with_pipeline(config: ServerConfig, pipeline: RagPipeline) -> Self {
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
        }
    }
}
