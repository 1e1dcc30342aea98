//! Keyword-overlap retrieval, the last tier of the cascade.
//!
//! Score is the share of question tokens (repeats included) that appear
//! anywhere in the chunk's title or body. A chunk holding every question
//! word scores 1.0 however long it is.

use crate::knowledge::KnowledgeBase;
use crate::retriever::{elapsed_ms, rank, RetrievalResult, Retriever};
use crate::similarity::SparseVector;
use async_trait::async_trait;
use observability::{NullTelemetry, RagTelemetry};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

fn keep(c: char) -> bool {
    c == ' '
        || c.is_ascii_lowercase()
        || c.is_ascii_digit()
        || (('\u{00C0}'..='\u{024F}').contains(&c) && c.is_alphabetic())
}

/// Lower-cases `text` and blanks out everything except ASCII letters and
/// digits, accented Latin letters and spaces.
pub fn normalize(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| if keep(c) { c } else { ' ' })
        .collect()
}

/// Whitespace-separated tokens of [`normalize`]d text.
pub fn tokenize(text: &str) -> Vec<String> {
    normalize(text)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Term-frequency vector of the tokens at least `min_len` characters long.
pub fn term_frequencies(text: &str, min_len: usize) -> SparseVector {
    let mut vector = SparseVector::new();
    for token in tokenize(text) {
        if token.chars().count() >= min_len {
            *vector.entry(token).or_insert(0.0) += 1.0;
        }
    }
    vector
}

pub struct LexicalRetriever {
    knowledge: Arc<KnowledgeBase>,
    /// Token set per chunk, aligned with `knowledge.all()`.
    chunk_tokens: Vec<HashSet<String>>,
    telemetry: Arc<dyn RagTelemetry>,
}

impl LexicalRetriever {
    pub fn new(knowledge: Arc<KnowledgeBase>) -> Self {
        let chunk_tokens = knowledge
            .all()
            .iter()
            .map(|c| tokenize(&format!("{} {}", c.title, c.body)).into_iter().collect())
            .collect();

        Self {
            knowledge,
            chunk_tokens,
            telemetry: Arc::new(NullTelemetry),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn RagTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Scores every chunk without recording telemetry.
    pub fn score(&self, question: &str, limit: usize) -> Vec<RetrievalResult> {
        let question_tokens = tokenize(question);
        if question_tokens.is_empty() {
            return Vec::new();
        }

        let total = question_tokens.len() as f32;
        let mut results: Vec<RetrievalResult> = self
            .knowledge
            .all()
            .iter()
            .zip(&self.chunk_tokens)
            .filter(|(_, tokens)| !tokens.is_empty())
            .map(|(chunk, tokens)| {
                let matches = question_tokens.iter().filter(|t| tokens.contains(*t)).count();
                RetrievalResult::from_chunk(chunk, matches as f32 / total)
            })
            .collect();

        rank(&mut results, limit);
        results
    }
}

#[async_trait]
impl Retriever for LexicalRetriever {
    async fn retrieve(&self, question: &str, limit: usize) -> Vec<RetrievalResult> {
        let start = Instant::now();
        let results = self.score(question, limit);
        self.telemetry
            .record("rag.retrieve", "lexical", elapsed_ms(start), limit);
        results
    }
}
