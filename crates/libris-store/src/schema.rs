//! Database schema SQL for the per-topic metadata database.

/// Core tables: documents and their chunks.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY,
    path TEXT UNIQUE,
    title TEXT,
    hash TEXT UNIQUE,
    timestamp TEXT,
    source_type TEXT,
    embedding_model TEXT,
    author TEXT,
    date TEXT,
    language TEXT,
    tags TEXT,
    source_url TEXT
);

CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY,
    document_id INTEGER,
    chunk_index INTEGER,
    content TEXT,
    page_num INTEGER,
    char_start INTEGER,
    char_end INTEGER,
    section TEXT,
    FOREIGN KEY(document_id) REFERENCES documents(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id, chunk_index);
"#;

/// Tables that must exist for a database to be usable.
pub const REQUIRED_TABLES: &[&str] = &["documents", "chunks"];

/// Columns checked by `validate`.
pub const REQUIRED_DOCUMENT_COLUMNS: &[&str] = &[
    "id",
    "path",
    "title",
    "hash",
    "timestamp",
    "source_type",
    "embedding_model",
];

pub const REQUIRED_CHUNK_COLUMNS: &[&str] = &[
    "id",
    "document_id",
    "chunk_index",
    "content",
    "char_start",
    "char_end",
];
