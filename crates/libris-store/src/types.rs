//! Data types for documents, chunks, and store statistics.

use serde::{Deserialize, Serialize};

/// A document row from the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub path: String,
    pub title: String,
    pub hash: String,
    pub timestamp: String,
    pub source_type: String,
    pub embedding_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

/// A chunk row from the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: i64,
    pub document_id: i64,
    pub chunk_index: i64,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_num: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub char_start: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub char_end: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

/// A chunk to be written; `chunk_index` comes from its position in the batch.
#[derive(Debug, Clone, Default)]
pub struct NewChunk {
    pub content: String,
    pub page_num: Option<i64>,
    pub char_start: Option<i64>,
    pub char_end: Option<i64>,
    pub section: Option<String>,
}

impl NewChunk {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// A stored chunk joined with the document it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    pub doc_id: i64,
    pub path: String,
    pub title: String,
    pub chunk_index: i64,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub char_start: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub char_end: Option<i64>,
}

/// Title, timestamp and path of the document owning a matched chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub timestamp: String,
    pub path: String,
}

/// Store-level statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_documents: i64,
    pub total_chunks: i64,
    pub db_path: String,
    pub db_size_mb: f64,
}
