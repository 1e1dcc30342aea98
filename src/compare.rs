//! Side-by-side comparison of exactly two knowledge entries.

use crate::error::RagError;
use crate::llm::LlmClient;
use retrieval::{RetrievalResult, ScopedRetriever, DEFAULT_COMPARE_QUESTION};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonAnswer {
    pub answer: String,
    pub contexts: Vec<RetrievalResult>,
    /// Ids of `contexts`, in ranking order.
    pub ids: Vec<String>,
}

pub struct CompareUseCase {
    retriever: Arc<dyn ScopedRetriever>,
    llm: Arc<dyn LlmClient>,
    limit: usize,
}

impl CompareUseCase {
    pub fn new(retriever: Arc<dyn ScopedRetriever>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            retriever,
            llm,
            limit: 5,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub async fn compare(
        &self,
        ids: &[String],
        question: Option<&str>,
    ) -> Result<ComparisonAnswer, RagError> {
        let question = question
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .unwrap_or(DEFAULT_COMPARE_QUESTION);

        if ids.len() != 2 {
            return Err(RagError::InvalidInput(format!(
                "exactly two ids are required, got {}",
                ids.len()
            )));
        }

        let contexts = self.retriever.retrieve_among(ids, question, self.limit).await;
        if contexts.len() < 2 {
            return Err(RagError::InvalidInput(
                "both entries must exist in the knowledge base".into(),
            ));
        }

        let prompt = build_prompt(question, &contexts);
        let answer = self.llm.ask(&prompt).await?;

        Ok(ComparisonAnswer {
            answer,
            ids: contexts.iter().map(|c| c.id.clone()).collect(),
            contexts,
        })
    }
}

pub fn build_prompt(question: &str, contexts: &[RetrievalResult]) -> String {
    let entries: Vec<String> = contexts
        .iter()
        .map(|c| {
            let title = if c.title.is_empty() { "Unnamed entry" } else { c.title.as_str() };
            let body = if c.body.is_empty() {
                "No description available"
            } else {
                c.body.as_str()
            };
            format!("- {title} (ID: {}): {body}", c.id)
        })
        .collect();

    format!(
        "You have the following detailed entries. Use them to answer the question: \"{question}\".\n\
         {}\n\n\
         Instructions:\n\
         - Keep a clear, direct narrative tone suitable for audio. No tables, icons, stars or emojis.\n\
         - First explain the differences between both entries, citing relevant attributes from the context.\n\
         - In a second paragraph describe how they complement each other, using at least two criteria per entry.\n\
         - Rely only on the provided context; do not invent attributes or change ratings.",
        entries.join("\n")
    )
}
