//! Libris Ingest — extraction, cleaning, OCR review, chunking, filtering and indexing.

pub mod chunking;
pub mod cleaner;
pub mod dictionary;
pub mod encoding;
pub mod extract;
pub mod hashing;
pub mod ingest;
pub mod normalization;
pub mod ocr;
pub mod quality;
pub mod review;
pub mod stats;

pub use chunking::{RecursiveChunker, TextChunk};
pub use cleaner::TextCleaner;
pub use dictionary::Dictionary;
pub use extract::{Extraction, ExtractorRegistry, TextExtractor};
pub use hashing::hash_file;
pub use ingest::{reload_chunks, AcceptedChunk, IndexReport, Indexer, IndexerOptions, VectorIndexBuilder};
pub use normalization::{NormalizationTable, RuleCategory, RuleSet};
pub use ocr::{AuditLog, AuditRecord, OcrHeuristic};
pub use quality::{is_garbage, is_good_chunk, QualityFilter, Verdict};
pub use review::{accept_suggestions, collect_suggestions};
pub use stats::IndexStats;
