//! herorag HTTP API.
//!
//! Serves the ask and compare use cases of [`herorag::RagPipeline`] over
//! JSON, plus inspection and manual reset of the LLM circuit breaker.
//!
//! ```rust,no_run
//! use server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     server::start_server(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Endpoints
//!
//! - `GET /health` - liveness
//! - `GET /ready` - readiness, `degraded` while the LLM breaker is not closed
//! - `POST /api/v1/agent/ask` - `{question}` to `{answer, contexts}`
//! - `POST /api/v1/compare` - `{ids, question?}` to `{answer, contexts, ids}`
//! - `GET /api/v1/circuit` - LLM breaker snapshot
//! - `POST /api/v1/circuit/reset` - force the LLM breaker closed
//!
//! Errors come back as `{"error": {"code", "message"}}`: 422 for invalid
//! input, 503 while the breaker is open, 502 when the LLM call fails.
//! Every response carries `X-Trace-Id`.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{build_router, start_server};
pub use state::ServerState;
