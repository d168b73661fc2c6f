//! Core data model: collections, documents, chunks, the knowledge-graph
//! entities, and retrieval results. Described semantically, matching the
//! entities in the data model rather than any particular storage layout.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Lifecycle state of a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Deleted,
}

/// A named group of documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: HashMap::new(),
        }
    }
}

/// A text source owning zero or more [`Chunk`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub collection: String,
    pub status: DocumentStatus,
    /// SHA-256 of the raw content, used for ingestion dedup.
    pub content_hash: Option<String>,
    pub source_path: Option<String>,
    pub title: Option<String>,
    pub chunk_count: usize,
    pub error_message: Option<String>,
    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            collection: collection.into(),
            status: DocumentStatus::Pending,
            content_hash: None,
            source_path: None,
            title: None,
            chunk_count: 0,
            error_message: None,
            created_at: now(),
        }
    }
}

/// An ordered span of text within a [`Document`].
///
/// `chunk_index` values are unique and dense from 0 within a document.
/// A chunk can exist without an `embedding` (pending state).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub chunk_index: usize,
    pub start_char: Option<usize>,
    pub end_char: Option<usize>,
    pub token_count: usize,
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Chunk {
    pub fn new(document_id: impl Into<String>, content: impl Into<String>, chunk_index: usize) -> Self {
        let content = content.into();
        let token_count = estimate_tokens(&content);
        Self {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.into(),
            content,
            chunk_index,
            start_char: None,
            end_char: None,
            token_count,
            embedding: None,
            metadata: HashMap::new(),
        }
    }
}

/// Heuristic token estimator: `~4 chars/token`, matching the data model's
/// `estimate(s) ≈ len(s)/4` rule. `estimate("") == 0`, `estimate(s) >= 1`
/// for any non-empty `s`.
pub fn estimate_tokens(s: &str) -> usize {
    if s.is_empty() {
        0
    } else {
        (s.chars().count() / 4).max(1)
    }
}

/// An entity extracted from ingested text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub description: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

impl Entity {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            entity_type: entity_type.into(),
            description: None,
            embedding: None,
        }
    }
}

/// A directed relationship between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
    pub description: Option<String>,
}

/// A densely-connected subset of entities assigned by label propagation.
/// Communities form a hierarchy; level 0 is the base partition and members
/// at a higher level are the union of their children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    pub id: String,
    pub level: usize,
    pub member_entity_ids: Vec<String>,
    pub summary: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

/// Where a [`RetrievalResult`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Vector,
    Fulltext,
    Hybrid,
    GraphLocal,
    GraphGlobal,
}

/// A single candidate produced by a retriever. Scores are normalized to
/// `[0, 1]`, higher is more relevant, before reranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub id: String,
    pub content: Option<String>,
    pub score: f32,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub source: ResultSource,
}

/// A search-time filter over document/chunk metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchFilter {
    pub field: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_tokens_empty_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn estimate_tokens_nonempty_is_at_least_one() {
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("ab"), 1);
    }

    #[test]
    fn estimate_tokens_scales_by_four_chars() {
        let s = "a".repeat(400);
        assert_eq!(estimate_tokens(&s), 100);
    }

    #[test]
    fn chunk_new_computes_token_count() {
        let chunk = Chunk::new("doc-1", "a".repeat(40), 0);
        assert_eq!(chunk.token_count, 10);
        assert_eq!(chunk.chunk_index, 0);
        assert!(chunk.embedding.is_none());
    }
}
