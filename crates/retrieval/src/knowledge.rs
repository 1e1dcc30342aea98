//! Static knowledge base of retrievable chunks.
//!
//! Two on-disk schemas are accepted, both a JSON array of objects:
//!
//! - agent entries `{"id", "title", "text"}`, skipped unless all three are
//!   non-empty;
//! - hero entries `{"heroId", "nombre", "contenido"}`, skipped only when the
//!   id is empty.
//!
//! Either way the result is the same [`KnowledgeChunk`]. The base is loaded
//! once and never mutated.

use crate::error::RetrievalError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

/// A retrievable unit of text with a stable id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub id: String,
    pub title: String,
    pub body: String,
}

impl KnowledgeChunk {
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
        }
    }

    /// Text sent to the embedding provider for this chunk.
    pub fn embedding_text(&self) -> String {
        format!("{}\n\n{}", self.title, self.body).trim().to_string()
    }
}

/// Which field names to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeSchema {
    /// `id` / `title` / `text`.
    Agent,
    /// `heroId` / `nombre` / `contenido`.
    Hero,
    /// Decide per entry by which id field is present.
    #[default]
    Auto,
}

#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    chunks: Vec<KnowledgeChunk>,
    by_id: HashMap<String, usize>,
}

impl KnowledgeBase {
    /// Builds a base from chunks, keeping the first occurrence of each id.
    pub fn from_chunks(chunks: impl IntoIterator<Item = KnowledgeChunk>) -> Self {
        let mut base = Self::default();
        for chunk in chunks {
            if base.by_id.contains_key(&chunk.id) {
                continue;
            }
            base.by_id.insert(chunk.id.clone(), base.chunks.len());
            base.chunks.push(chunk);
        }
        base
    }

    pub fn load(path: impl AsRef<Path>, schema: KnowledgeSchema) -> Result<Self, RetrievalError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw, schema)
    }

    pub fn from_json(raw: &str, schema: KnowledgeSchema) -> Result<Self, RetrievalError> {
        let decoded: Value = serde_json::from_str(raw).map_err(|e| RetrievalError::Malformed {
            what: "knowledge base",
            reason: e.to_string(),
        })?;

        let Value::Array(entries) = decoded else {
            return Err(RetrievalError::Malformed {
                what: "knowledge base",
                reason: "expected a JSON array of entries".into(),
            });
        };

        let chunks = entries.iter().filter_map(|entry| match entry {
            Value::Object(fields) => parse_entry(fields, schema),
            _ => None,
        });

        Ok(Self::from_chunks(chunks))
    }

    /// Every chunk in file order.
    pub fn all(&self) -> &[KnowledgeChunk] {
        &self.chunks
    }

    pub fn get(&self, id: &str) -> Option<&KnowledgeChunk> {
        self.by_id.get(id).map(|&idx| &self.chunks[idx])
    }

    /// Chunks for `ids` in request order. Ids are trimmed; blank and unknown
    /// ids are skipped.
    pub fn find_by_ids<S: AsRef<str>>(&self, ids: &[S]) -> Vec<&KnowledgeChunk> {
        ids.iter()
            .map(|id| id.as_ref().trim())
            .filter(|id| !id.is_empty())
            .filter_map(|id| self.get(id))
            .collect()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.chunks.iter().map(|c| c.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

fn field(fields: &Map<String, Value>, key: &str) -> String {
    match fields.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn parse_entry(fields: &Map<String, Value>, schema: KnowledgeSchema) -> Option<KnowledgeChunk> {
    let schema = match schema {
        KnowledgeSchema::Auto if fields.contains_key("heroId") => KnowledgeSchema::Hero,
        KnowledgeSchema::Auto => KnowledgeSchema::Agent,
        explicit => explicit,
    };

    match schema {
        KnowledgeSchema::Hero => {
            let id = field(fields, "heroId");
            (!id.is_empty()).then(|| {
                KnowledgeChunk::new(id, field(fields, "nombre"), field(fields, "contenido"))
            })
        }
        _ => {
            let chunk = KnowledgeChunk::new(
                field(fields, "id"),
                field(fields, "title"),
                field(fields, "text"),
            );
            let complete =
                !chunk.id.is_empty() && !chunk.title.is_empty() && !chunk.body.is_empty();
            complete.then_some(chunk)
        }
    }
}
