//! Per-topic stats summary written after each indexing pass.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use libris_core::Result;
use libris_store::MetadataStore;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub topic: String,
    pub documents_indexed: i64,
    pub chunks_total: i64,
    /// Local time, ISO-8601 to the second.
    pub last_updated: String,
    pub embedding_model: String,
}

impl IndexStats {
    /// Snapshot the store totals now.
    pub fn collect(store: &MetadataStore, topic: &str, embedding_model: &str) -> Result<Self> {
        Ok(Self {
            topic: topic.to_string(),
            documents_indexed: store.count_documents()?,
            chunks_total: store.count_chunks()?,
            last_updated: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            embedding_model: embedding_model.to_string(),
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(
            "Stats written to {}: {} documents, {} chunks",
            path.display(),
            self.documents_indexed,
            self.chunks_total
        );
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libris_store::NewChunk;

    #[test]
    fn test_collect_and_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::open(dir.path().join("metadata.db")).unwrap();
        let id = store
            .insert_document("/a.txt", "a", "h1", "txt", "model-x")
            .unwrap();
        store
            .insert_chunks(id, &[NewChunk::new("one"), NewChunk::new("two")])
            .unwrap();

        let stats = IndexStats::collect(&store, "history", "model-x").unwrap();
        assert_eq!(stats.documents_indexed, 1);
        assert_eq!(stats.chunks_total, 2);
        assert!(chrono::NaiveDateTime::parse_from_str(&stats.last_updated, TIMESTAMP_FORMAT).is_ok());

        let path = dir.path().join("db").join("history").join("stats.json");
        stats.write(&path).unwrap();
        assert_eq!(IndexStats::read(&path).unwrap(), stats);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        for key in ["topic", "documents_indexed", "chunks_total", "last_updated", "embedding_model"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }
}
