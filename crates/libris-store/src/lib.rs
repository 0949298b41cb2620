//! Libris Store — SQLite metadata for indexed documents and chunks.

pub mod schema;
pub mod sqlite;
pub mod types;

pub use sqlite::MetadataStore;
pub use types::*;
