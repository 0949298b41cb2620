//! SQLite metadata store for indexed documents and their chunks.
//!
//! The store is the source of truth for "already indexed": document rows are
//! unique by content hash and by path, and chunk sets are written at most once
//! per document. Every mutating call runs in its own transaction.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::{debug, info, warn};

use crate::schema::SCHEMA_SQL;
use crate::types::*;
use libris_core::{Error, Result};

/// Number of leading characters used by [`MetadataStore::find_by_content`].
const CONTENT_SAMPLE_CHARS: usize = 50;

/// SQLite store holding document and chunk metadata for one topic.
pub struct MetadataStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl MetadataStore {
    /// Open or create the metadata database at `db_path`.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let existed = db_path.exists();

        let conn = Self::create_connection(&db_path)?;
        Self::init_schema(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };

        if existed {
            info!(
                "Loaded existing metadata: {} documents, {} chunks, path={}",
                store.count_documents()?,
                store.count_chunks()?,
                store.db_path.display()
            );
        } else {
            info!("Created new metadata database at {}", store.db_path.display());
        }
        Ok(store)
    }

    /// Back up any existing database to `metadata_<timestamp>.db` and open a fresh one.
    pub fn open_with_rebuild(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if db_path.exists() {
            let backup = backup_database(db_path)?;
            info!("Old database moved to {}", backup.display());
        } else {
            info!("No existing database at {}, nothing to back up", db_path.display());
        }
        Self::open(db_path)
    }

    fn create_connection(db_path: &Path) -> Result<Connection> {
        let conn = Connection::open(db_path).map_err(db_err)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(db_err)?;
        Ok(conn)
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // ---------------------------------------------------------------
    // Documents
    // ---------------------------------------------------------------

    /// Insert a document and return its id.
    ///
    /// Idempotent on `hash`: when a row with the same content hash exists its id
    /// is returned untouched, even if `path` differs. When the hash is new but
    /// `path` is already indexed, that row is updated in place and its stale
    /// chunks are removed so the new content can be chunked under the same id.
    pub fn insert_document(
        &self,
        path: &str,
        title: &str,
        hash: &str,
        source_type: &str,
        embedding_model: &str,
    ) -> Result<i64> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;

        if let Some(id) = id_by(&tx, "SELECT id FROM documents WHERE hash = ?1", hash)? {
            debug!("Document with hash {} already stored as {}", hash, id);
            return Ok(id);
        }

        let id = match id_by(&tx, "SELECT id FROM documents WHERE path = ?1", path)? {
            Some(id) => {
                let stale = tx
                    .execute("DELETE FROM chunks WHERE document_id = ?1", params![id])
                    .map_err(db_err)?;
                tx.execute(
                    "UPDATE documents SET title = ?1, hash = ?2, timestamp = datetime('now'), \
                     source_type = ?3, embedding_model = ?4 WHERE id = ?5",
                    params![title, hash, source_type, embedding_model, id],
                )
                .map_err(db_err)?;
                info!(
                    "Content changed for {}: document {} updated, {} stale chunks dropped",
                    path, id, stale
                );
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO documents (path, title, hash, timestamp, source_type, embedding_model) \
                     VALUES (?1, ?2, ?3, datetime('now'), ?4, ?5)",
                    params![path, title, hash, source_type, embedding_model],
                )
                .map_err(db_err)?;
                tx.last_insert_rowid()
            }
        };

        tx.commit().map_err(db_err)?;
        Ok(id)
    }

    /// Content hashes of every indexed document.
    pub fn existing_hashes(&self) -> Result<HashSet<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT hash FROM documents WHERE hash IS NOT NULL")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<HashSet<_>>>().map_err(db_err)
    }

    /// Get a document by id.
    pub fn get_document(&self, doc_id: i64) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        let doc = conn
            .prepare_cached("SELECT * FROM documents WHERE id = ?1")
            .map_err(db_err)?
            .query_row(params![doc_id], row_to_document)
            .optional()
            .map_err(db_err)?;
        Ok(doc)
    }

    /// Find a document by content hash.
    pub fn find_document_by_hash(&self, hash: &str) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        let doc = conn
            .prepare_cached("SELECT * FROM documents WHERE hash = ?1")
            .map_err(db_err)?
            .query_row(params![hash], row_to_document)
            .optional()
            .map_err(db_err)?;
        Ok(doc)
    }

    /// Record a new embedding model on a document after re-embedding.
    pub fn update_embedding_model(&self, doc_id: i64, embedding_model: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute(
                "UPDATE documents SET embedding_model = ?1 WHERE id = ?2",
                params![embedding_model, doc_id],
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    /// Delete a document; its chunks go with it through the foreign-key cascade.
    pub fn delete_document(&self, doc_id: i64) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        let count = tx
            .execute("DELETE FROM documents WHERE id = ?1", params![doc_id])
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(count > 0)
    }

    /// Count total documents.
    pub fn count_documents(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(count)
    }

    // ---------------------------------------------------------------
    // Chunks
    // ---------------------------------------------------------------

    /// Insert the chunk set of a document.
    ///
    /// No-op when the document already has chunks; otherwise every chunk is
    /// written in one transaction with `chunk_index` equal to its position.
    /// Returns the number of rows written.
    pub fn insert_chunks(&self, doc_id: i64, chunks: &[NewChunk]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;

        let existing: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM chunks WHERE document_id = ?1",
                params![doc_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        if existing > 0 {
            debug!("Chunks already exist for doc_id {}, skipping", doc_id);
            return Ok(0);
        }

        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO chunks (document_id, chunk_index, content, page_num, \
                     char_start, char_end, section) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(db_err)?;
            for (index, chunk) in chunks.iter().enumerate() {
                stmt.execute(params![
                    doc_id,
                    index as i64,
                    chunk.content,
                    chunk.page_num,
                    chunk.char_start,
                    chunk.char_end,
                    chunk.section,
                ])
                .map_err(db_err)?;
            }
        }

        tx.commit().map_err(db_err)?;
        Ok(chunks.len())
    }

    /// Get all chunks for a document in index order.
    pub fn get_chunks_for_document(&self, doc_id: i64) -> Result<Vec<Chunk>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT * FROM chunks WHERE document_id = ?1 ORDER BY chunk_index")
            .map_err(db_err)?;
        let rows = stmt.query_map(params![doc_id], row_to_chunk).map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Count total chunks.
    pub fn count_chunks(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(count)
    }

    /// True when the database holds no chunks at all.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.count_chunks()? == 0)
    }

    /// Every stored chunk with its document, ordered by document then chunk index.
    pub fn all_chunks(&self) -> Result<Vec<StoredChunk>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT c.content, c.chunk_index, c.char_start, c.char_end, d.id, d.path, d.title \
                 FROM chunks c JOIN documents d ON c.document_id = d.id \
                 ORDER BY d.id, c.chunk_index",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(StoredChunk {
                    content: row.get(0)?,
                    chunk_index: row.get(1)?,
                    char_start: row.get(2)?,
                    char_end: row.get(3)?,
                    doc_id: row.get(4)?,
                    path: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                    title: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                })
            })
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Locate the document whose chunk contains the start of `content`.
    pub fn find_by_content(&self, content: &str) -> Result<Option<SourceRef>> {
        let sample: String = content.chars().take(CONTENT_SAMPLE_CHARS).collect();
        let conn = self.conn.lock();
        let found = conn
            .prepare_cached(
                "SELECT d.title, d.timestamp, d.path FROM documents d \
                 JOIN chunks c ON c.document_id = d.id \
                 WHERE c.content LIKE ?1 LIMIT 1",
            )
            .map_err(db_err)?
            .query_row(params![format!("%{}%", sample)], |row| {
                Ok(SourceRef {
                    title: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    timestamp: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    path: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                })
            })
            .optional()
            .map_err(db_err)?;
        Ok(found)
    }

    // ---------------------------------------------------------------
    // Stats
    // ---------------------------------------------------------------

    pub fn stats(&self) -> Result<StoreStats> {
        let total_documents = self.count_documents()?;
        let total_chunks = self.count_chunks()?;
        let db_size = std::fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0);

        Ok(StoreStats {
            total_documents,
            total_chunks,
            db_path: self.db_path.to_string_lossy().to_string(),
            db_size_mb: db_size as f64 / (1024.0 * 1024.0),
        })
    }
}

/// Move `db_path` (and any WAL side files) aside with a timestamp suffix.
fn backup_database(db_path: &Path) -> Result<PathBuf> {
    let stamp = chrono::Local::now().format("%Y-%m-%d_%H%M%S");
    let stem = db_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("metadata");
    let backup = db_path.with_file_name(format!("{}_{}.db", stem, stamp));
    std::fs::rename(db_path, &backup)?;

    for suffix in ["-wal", "-shm"] {
        let side = PathBuf::from(format!("{}{}", db_path.display(), suffix));
        if side.exists() {
            let target = PathBuf::from(format!("{}{}", backup.display(), suffix));
            if let Err(e) = std::fs::rename(&side, &target) {
                warn!("Could not move {}: {}", side.display(), e);
            }
        }
    }
    Ok(backup)
}

fn id_by(tx: &Transaction<'_>, sql: &str, key: &str) -> Result<Option<i64>> {
    tx.query_row(sql, params![key], |row| row.get(0))
        .optional()
        .map_err(db_err)
}

fn db_err(e: rusqlite::Error) -> Error {
    Error::Database(e.to_string())
}

// ---------------------------------------------------------------
// Row Mapping Helpers
// ---------------------------------------------------------------

fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get("id")?,
        path: row.get::<_, Option<String>>("path")?.unwrap_or_default(),
        title: row.get::<_, Option<String>>("title")?.unwrap_or_default(),
        hash: row.get::<_, Option<String>>("hash")?.unwrap_or_default(),
        timestamp: row.get::<_, Option<String>>("timestamp")?.unwrap_or_default(),
        source_type: row.get::<_, Option<String>>("source_type")?.unwrap_or_default(),
        embedding_model: row
            .get::<_, Option<String>>("embedding_model")?
            .unwrap_or_default(),
        author: row.get("author")?,
        date: row.get("date")?,
        language: row.get("language")?,
        tags: row.get("tags")?,
        source_url: row.get("source_url")?,
    })
}

fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chunk> {
    Ok(Chunk {
        id: row.get("id")?,
        document_id: row.get("document_id")?,
        chunk_index: row.get("chunk_index")?,
        content: row.get::<_, Option<String>>("content")?.unwrap_or_default(),
        page_num: row.get("page_num")?,
        char_start: row.get("char_start")?,
        char_end: row.get("char_end")?,
        section: row.get("section")?,
    })
}
