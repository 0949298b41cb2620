//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Topic used when `LIBRIS_TOPIC` is unset.
pub const DEFAULT_TOPIC: &str = "default";
/// Default embedding model recorded on every indexed document.
pub const DEFAULT_EMBED_MODEL: &str = "intfloat/multilingual-e5-small";
/// Default chunk target size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between adjacent chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
/// Fraction of garbage chunks above which a document is rejected.
pub const DEFAULT_GARBAGE_THRESHOLD: f64 = 0.5;

/// Paths to all Libris data locations for one topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Per-topic database directory (`data/db/<topic>/`).
    pub topic_dir: PathBuf,
    /// Metadata database (`data/db/<topic>/metadata.db`).
    pub metadata_db: PathBuf,
    /// Stats summary (`data/db/<topic>/stats.json`).
    pub stats_file: PathBuf,
    /// Normalization rule table (`data/db/normalization_map.json`).
    pub normalization_map: PathBuf,
    /// Audit logs and raw-text exports (`data/logs/`).
    pub logs: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>, topic: &str) -> std::io::Result<Self> {
        let paths = Self::resolve(root, topic);
        paths.ensure_dirs()?;
        Ok(paths)
    }

    /// The layout under `root` for `topic`, without touching the filesystem.
    pub fn resolve(root: impl AsRef<Path>, topic: &str) -> Self {
        let root = root.as_ref().to_path_buf();
        let topic_dir = root.join("db").join(topic);
        Self {
            metadata_db: topic_dir.join("metadata.db"),
            stats_file: topic_dir.join("stats.json"),
            normalization_map: root.join("db").join("normalization_map.json"),
            logs: root.join("logs"),
            topic_dir,
            root,
        }
    }

    /// Paths for the topic and rule table named in the environment.
    /// Nothing is created; read-only commands use this.
    pub fn from_env(root: impl AsRef<Path>) -> Self {
        let topic = env_string("LIBRIS_TOPIC").unwrap_or_else(|| DEFAULT_TOPIC.to_string());
        let mut paths = Self::resolve(root, &topic);
        if let Some(map) = env_string("LIBRIS_NORMALIZATION_MAP") {
            paths.normalization_map = PathBuf::from(map);
        }
        paths
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.topic_dir)?;
        std::fs::create_dir_all(&self.logs)?;
        Ok(())
    }
}

/// Chunking parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Top-level Libris configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibrisConfig {
    /// Knowledge-base topic; each topic has its own metadata database.
    pub topic: String,
    /// Data directory paths.
    pub data_paths: DataPaths,
    /// Name of the embedding model stored with each document.
    pub embedding_model: String,
    pub chunking: ChunkingConfig,
    pub garbage_threshold: f64,
    /// Scan noisy text for OCR artifacts and write audit suggestions.
    pub ocr_scan: bool,
    /// Word list for the spelling heuristic; the bundled English list when unset.
    pub dictionary: Option<PathBuf>,
    /// Dump extracted raw text to the logs directory.
    pub export_raw: bool,
    /// Blogger export tag filter; empty keeps every post.
    pub blog_tags: Vec<String>,
}

impl LibrisConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> Result<Self> {
        let topic = env_string("LIBRIS_TOPIC").unwrap_or_else(|| DEFAULT_TOPIC.to_string());
        let data_paths = DataPaths::from_env(data_dir);
        data_paths.ensure_dirs()?;

        let chunking = ChunkingConfig {
            chunk_size: env_parse("LIBRIS_CHUNK_SIZE")?.unwrap_or(DEFAULT_CHUNK_SIZE),
            chunk_overlap: env_parse("LIBRIS_CHUNK_OVERLAP")?.unwrap_or(DEFAULT_CHUNK_OVERLAP),
        };
        if chunking.chunk_overlap >= chunking.chunk_size {
            return Err(Error::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                chunking.chunk_overlap, chunking.chunk_size
            )));
        }

        let garbage_threshold =
            env_parse("LIBRIS_GARBAGE_THRESHOLD")?.unwrap_or(DEFAULT_GARBAGE_THRESHOLD);
        if !(0.0..=1.0).contains(&garbage_threshold) {
            return Err(Error::Config(format!(
                "garbage threshold must be within 0..=1, got {}",
                garbage_threshold
            )));
        }

        let blog_tags = env_string("LIBRIS_BLOG_TAGS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            topic,
            data_paths,
            embedding_model: env_string("LIBRIS_EMBED_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBED_MODEL.to_string()),
            chunking,
            garbage_threshold,
            ocr_scan: env_bool("LIBRIS_OCR_SCAN").unwrap_or(true),
            dictionary: env_string("LIBRIS_DICTIONARY").map(PathBuf::from),
            export_raw: env_bool("LIBRIS_EXPORT_RAW").unwrap_or(false),
            blog_tags,
        })
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
    env_string(name).map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env_string(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has an invalid value: {}", name, raw))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_data_paths_layout() {
        let dir = TempDir::new().unwrap();
        let paths = DataPaths::new(dir.path(), "history").unwrap();

        assert_eq!(paths.metadata_db, dir.path().join("db/history/metadata.db"));
        assert_eq!(paths.stats_file, dir.path().join("db/history/stats.json"));
        assert_eq!(
            paths.normalization_map,
            dir.path().join("db/normalization_map.json")
        );
        assert!(paths.topic_dir.is_dir());
        assert!(paths.logs.is_dir());
    }

    #[test]
    fn test_resolve_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("absent");
        let paths = DataPaths::resolve(&root, "history");

        assert_eq!(paths.metadata_db, root.join("db/history/metadata.db"));
        assert_eq!(paths.logs, root.join("logs"));
        assert!(!root.exists());
    }

    #[test]
    fn test_default_chunking() {
        let chunking = ChunkingConfig::default();
        assert_eq!(chunking.chunk_size, 1000);
        assert_eq!(chunking.chunk_overlap, 200);
    }
}
