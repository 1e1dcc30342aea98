//! Grounded question answering over the knowledge base.

use crate::error::RagError;
use crate::llm::LlmClient;
use retrieval::{ContextRef, RetrievalResult, Retriever};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What the model must answer when the context does not cover the question.
pub const REFUSAL_MESSAGE: &str =
    "I don't have that information in the knowledge base.";

const EMPTY_CONTEXT: &str = "Context: (empty, the knowledge base returned nothing)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAnswer {
    pub answer: String,
    /// Chunks the prompt was built from, best first.
    pub contexts: Vec<ContextRef>,
}

pub struct AskAgentUseCase {
    retriever: Arc<dyn Retriever>,
    llm: Arc<dyn LlmClient>,
    top_k: usize,
}

impl AskAgentUseCase {
    pub fn new(retriever: Arc<dyn Retriever>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            retriever,
            llm,
            top_k: 3,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub async fn ask(&self, question: &str) -> Result<AgentAnswer, RagError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidInput("the question must not be empty".into()));
        }

        let contexts = self.retriever.retrieve(question, self.top_k).await;
        tracing::debug!(retrieved = contexts.len(), "context assembled");

        let prompt = build_prompt(question, &contexts);
        let answer = self.llm.ask(&prompt).await?;

        Ok(AgentAnswer {
            answer,
            contexts: contexts.iter().map(RetrievalResult::context_ref).collect(),
        })
    }
}

fn context_block(contexts: &[RetrievalResult]) -> String {
    if contexts.is_empty() {
        return EMPTY_CONTEXT.to_string();
    }

    let chunks: Vec<String> = contexts
        .iter()
        .map(|c| format!("{}\n{}", c.title, c.body))
        .collect();
    format!("Context (knowledge base excerpts):\n---\n{}", chunks.join("\n---\n"))
}

/// Instructions, then the retrieved context, then the question.
pub fn build_prompt(question: &str, contexts: &[RetrievalResult]) -> String {
    format!(
        "You are the knowledge base assistant. Answer using only the context below. \
         If the context does not contain the answer, reply exactly: \"{REFUSAL_MESSAGE}\" \
         Never invent data.\n\n{}\n\nQuestion: {question}\n\n\
         Answer technically and concisely, without going beyond the context.",
        context_block(contexts)
    )
}
