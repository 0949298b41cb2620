//! Incremental indexing pipeline: file → text → clean → chunk → filter → store.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use libris_core::{ChunkingConfig, Error, LibrisConfig, Result};
use libris_store::{MetadataStore, NewChunk, StoredChunk};

use crate::chunking::RecursiveChunker;
use crate::cleaner::TextCleaner;
use crate::extract::{extension_of, ExtractorRegistry};
use crate::hashing::hash_file;
use crate::normalization::NormalizationTable;
use crate::ocr::{AuditLog, OcrHeuristic};
use crate::quality::{is_good_chunk, FilteredChunk, QualityFilter, Verdict};

const RAW_EXPORT_STAMP: &str = "%Y%m%d_%H%M%S";

/// A chunk that passed every filter and was persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedChunk {
    pub doc_id: i64,
    pub path: String,
    pub title: String,
    /// Position among the document's persisted chunks, from 0.
    pub chunk_index: usize,
    pub content: String,
    pub skip_ocr_fix: bool,
    pub char_start: usize,
    pub char_end: usize,
}

impl AcceptedChunk {
    fn from_stored(chunk: StoredChunk) -> Self {
        let to_usize = |v: Option<i64>| v.and_then(|n| usize::try_from(n).ok());
        let char_start = to_usize(chunk.char_start).unwrap_or(0);
        let char_end =
            to_usize(chunk.char_end).unwrap_or(char_start + chunk.content.chars().count());
        Self {
            skip_ocr_fix: is_good_chunk(&chunk.content),
            doc_id: chunk.doc_id,
            path: chunk.path,
            title: chunk.title,
            chunk_index: usize::try_from(chunk.chunk_index).unwrap_or(0),
            content: chunk.content,
            char_start,
            char_end,
        }
    }
}

/// Every stored chunk, for building a similarity index from scratch.
pub fn reload_chunks(store: &MetadataStore) -> Result<Vec<AcceptedChunk>> {
    Ok(store
        .all_chunks()?
        .into_iter()
        .map(AcceptedChunk::from_stored)
        .collect())
}

/// Receives accepted chunks to build or grow a similarity index.
pub trait VectorIndexBuilder {
    /// Start a fresh index from `chunks`.
    fn build(&mut self, chunks: &[AcceptedChunk]) -> Result<()>;

    /// Add `chunks` to the existing index.
    fn extend(&mut self, chunks: &[AcceptedChunk]) -> Result<()>;
}

/// Counters for one indexing pass plus the chunks it accepted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub seen: usize,
    pub indexed: usize,
    pub skipped_known: usize,
    pub skipped_unsupported: usize,
    pub failed: usize,
    pub rejected_garbage: usize,
    pub empty: usize,
    #[serde(skip)]
    pub chunks: Vec<AcceptedChunk>,
}

impl IndexReport {
    fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Indexed(chunks) => {
                self.indexed += 1;
                self.chunks.extend(chunks);
            }
            FileOutcome::Skipped(SkipReason::AlreadyIndexed) => self.skipped_known += 1,
            FileOutcome::Skipped(SkipReason::Unsupported) => self.skipped_unsupported += 1,
            FileOutcome::Skipped(SkipReason::Empty) => self.empty += 1,
            FileOutcome::Skipped(SkipReason::Garbage) => self.rejected_garbage += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipReason {
    AlreadyIndexed,
    Unsupported,
    Empty,
    Garbage,
}

#[derive(Debug)]
enum FileOutcome {
    Indexed(Vec<AcceptedChunk>),
    Skipped(SkipReason),
}

#[derive(Debug, Clone)]
pub struct IndexerOptions {
    pub embedding_model: String,
    pub chunking: ChunkingConfig,
    pub garbage_threshold: f64,
    pub ocr_scan: bool,
    /// Where to dump extracted raw text; `None` disables the dump.
    pub raw_export_dir: Option<PathBuf>,
}

impl IndexerOptions {
    pub fn from_config(config: &LibrisConfig) -> Self {
        Self {
            embedding_model: config.embedding_model.clone(),
            chunking: config.chunking,
            garbage_threshold: config.garbage_threshold,
            ocr_scan: config.ocr_scan,
            raw_export_dir: config
                .export_raw
                .then(|| config.data_paths.logs.clone()),
        }
    }
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self {
            embedding_model: libris_core::config::DEFAULT_EMBED_MODEL.to_string(),
            chunking: ChunkingConfig::default(),
            garbage_threshold: libris_core::config::DEFAULT_GARBAGE_THRESHOLD,
            ocr_scan: true,
            raw_export_dir: None,
        }
    }
}

/// Walks a corpus and indexes files whose content is not yet stored.
pub struct Indexer<'a> {
    store: &'a MetadataStore,
    registry: &'a ExtractorRegistry,
    cleaner: Option<TextCleaner>,
    ocr: Option<(OcrHeuristic, AuditLog)>,
    chunker: RecursiveChunker,
    filter: QualityFilter,
    options: IndexerOptions,
}

impl<'a> Indexer<'a> {
    pub fn new(store: &'a MetadataStore, registry: &'a ExtractorRegistry, options: IndexerOptions) -> Self {
        Self {
            store,
            registry,
            cleaner: None,
            ocr: None,
            chunker: RecursiveChunker::from_config(&options.chunking),
            filter: QualityFilter::new(options.garbage_threshold),
            options,
        }
    }

    /// Normalization rules. Without them only plain-text files can be indexed.
    pub fn with_rules(mut self, table: Arc<NormalizationTable>) -> Self {
        self.cleaner = Some(TextCleaner::new(table));
        self
    }

    /// Enable the OCR noise scan, logging suggestions to `audit`.
    pub fn with_ocr(mut self, heuristic: OcrHeuristic, audit: AuditLog) -> Self {
        self.ocr = Some((heuristic, audit));
        self
    }

    /// Index every regular file under `dir`, in file-name order.
    ///
    /// Per-file failures are logged and counted; storage failures and a
    /// missing rule table abort the run.
    pub fn run(&self, dir: &Path) -> Result<IndexReport> {
        if !dir.is_dir() {
            return Err(Error::NotFound(format!("source directory {}", dir.display())));
        }
        if self.options.ocr_scan && self.ocr.is_none() {
            warn!("OCR scan enabled but no dictionary configured; skipping it");
        }

        let mut known = self.store.existing_hashes()?;
        let mut report = IndexReport::default();
        info!("Indexing {} ({} documents already known)", dir.display(), known.len());

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Cannot read directory entry: {e}");
                    report.failed += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            report.seen += 1;

            match self.index_file(entry.path(), &mut known) {
                Ok(outcome) => report.record(outcome),
                Err(e) if e.is_fatal() => {
                    error!("Aborting run at {}: {e}", entry.path().display());
                    return Err(e);
                }
                Err(e) => {
                    error!("Failed to index {}: {e}", entry.path().display());
                    report.failed += 1;
                }
            }
        }

        info!(
            seen = report.seen,
            indexed = report.indexed,
            skipped_known = report.skipped_known,
            skipped_unsupported = report.skipped_unsupported,
            failed = report.failed,
            rejected_garbage = report.rejected_garbage,
            empty = report.empty,
            chunks = report.chunks.len(),
            "Indexing pass complete"
        );
        Ok(report)
    }

    /// Run, then hand the accepted chunks to `builder`: a fresh build when
    /// the store was empty beforehand, an extension otherwise.
    pub fn run_into(&self, dir: &Path, builder: &mut dyn VectorIndexBuilder) -> Result<IndexReport> {
        let fresh = self.store.is_empty()?;
        let report = self.run(dir)?;
        if report.chunks.is_empty() {
            debug!("No new chunks for the vector index");
        } else if fresh {
            builder.build(&report.chunks)?;
        } else {
            builder.extend(&report.chunks)?;
        }
        Ok(report)
    }

    fn index_file(&self, path: &Path, known: &mut HashSet<String>) -> Result<FileOutcome> {
        let hash = hash_file(path)?;
        if known.contains(&hash) {
            debug!("[skip] already indexed: {}", path.display());
            return Ok(FileOutcome::Skipped(SkipReason::AlreadyIndexed));
        }

        let Some(extraction) = self.registry.extract(path)? else {
            return Ok(FileOutcome::Skipped(SkipReason::Unsupported));
        };
        let raw = extraction.text();
        if raw.is_empty() {
            warn!("[skip] no text extracted from {}", path.display());
            return Ok(FileOutcome::Skipped(SkipReason::Empty));
        }
        self.export_raw(path, &raw);

        let text = if extraction.plain_text {
            match &self.cleaner {
                Some(cleaner) => cleaner.clean_plain(&raw),
                None => raw.trim().to_string(),
            }
        } else {
            let cleaner = self.cleaner.as_ref().ok_or_else(|| {
                Error::MissingRuleSet(format!("cannot clean {}", path.display()))
            })?;
            let cleaned = cleaner.clean(&raw);
            self.scan_for_artifacts(path, &cleaned);
            cleaned
        };

        let chunks = self.chunker.chunk(&text);
        if chunks.is_empty() {
            warn!("[skip] nothing left to chunk in {}", path.display());
            return Ok(FileOutcome::Skipped(SkipReason::Empty));
        }

        let kept = match self.filter.evaluate(chunks) {
            Verdict::Rejected { garbage, total } => {
                warn!(
                    "[skip] {}: {garbage}/{total} chunks are garbage, document rejected",
                    path.display()
                );
                return Ok(FileOutcome::Skipped(SkipReason::Garbage));
            }
            Verdict::Accepted { kept, garbage, total } => {
                if garbage > 0 {
                    debug!("{}: dropped {garbage}/{total} garbage chunks", path.display());
                }
                kept
            }
        };
        if kept.is_empty() {
            return Ok(FileOutcome::Skipped(SkipReason::Garbage));
        }

        let path_str = path.to_string_lossy().into_owned();
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path_str.clone());
        let source_type = extension_of(path).unwrap_or_default();

        let doc_id = self.store.insert_document(
            &path_str,
            &title,
            &hash,
            &source_type,
            &self.options.embedding_model,
        )?;
        let rows: Vec<NewChunk> = kept.iter().map(to_new_chunk).collect();
        let written = self.store.insert_chunks(doc_id, &rows)?;
        known.insert(hash);

        if written == 0 {
            info!("[skip] chunks for document {doc_id} already stored: {}", path.display());
            return Ok(FileOutcome::Skipped(SkipReason::AlreadyIndexed));
        }

        info!("[indexed] {} → document {doc_id}, {written} chunks", path.display());
        let accepted = kept
            .into_iter()
            .enumerate()
            .map(|(i, f)| AcceptedChunk {
                doc_id,
                path: path_str.clone(),
                title: title.clone(),
                chunk_index: i,
                content: f.chunk.text,
                skip_ocr_fix: f.skip_ocr_fix,
                char_start: f.chunk.char_start,
                char_end: f.chunk.char_end,
            })
            .collect();
        Ok(FileOutcome::Indexed(accepted))
    }

    /// Noisy text gets a correction scan; suggestions go to the audit log.
    fn scan_for_artifacts(&self, path: &Path, text: &str) {
        if !self.options.ocr_scan {
            return;
        }
        let Some((heuristic, audit)) = &self.ocr else {
            return;
        };
        if heuristic.is_clean(text) {
            debug!("Text looks clean, OCR scan skipped: {}", path.display());
            return;
        }
        let suggestions = heuristic.detect_artifacts(text);
        if let Err(e) = audit.record(&suggestions) {
            warn!("Could not write OCR audit log {}: {e}", audit.path().display());
        }
    }

    fn export_raw(&self, path: &Path, raw: &str) {
        let Some(dir) = &self.options.raw_export_dir else {
            return;
        };
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let stamp = chrono::Local::now().format(RAW_EXPORT_STAMP);
        let target = dir.join(format!("{stem}_{stamp}.txt"));
        let written = std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&target, raw));
        match written {
            Ok(()) => debug!("Raw text exported to {}", target.display()),
            Err(e) => warn!("Raw text export to {} failed: {e}", target.display()),
        }
    }
}

fn to_new_chunk(f: &FilteredChunk) -> NewChunk {
    NewChunk {
        char_start: i64::try_from(f.chunk.char_start).ok(),
        char_end: i64::try_from(f.chunk.char_end).ok(),
        ..NewChunk::new(f.chunk.text.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::Dictionary;
    use crate::normalization::RuleSet;
    use tempfile::TempDir;

    const PROSE: &str = "The old library kept careful ledgers of every loan it ever made.";

    struct Fixture {
        _dir: TempDir,
        corpus: PathBuf,
        logs: PathBuf,
        store: MetadataStore,
        registry: ExtractorRegistry,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let corpus = dir.path().join("corpus");
        let logs = dir.path().join("logs");
        std::fs::create_dir_all(&corpus).unwrap();
        let store = MetadataStore::open(dir.path().join("metadata.db")).unwrap();
        Fixture {
            corpus,
            logs,
            store,
            registry: ExtractorRegistry::with_defaults(&[]),
            _dir: dir,
        }
    }

    fn small_chunks() -> IndexerOptions {
        IndexerOptions {
            chunking: ChunkingConfig {
                chunk_size: 80,
                chunk_overlap: 0,
            },
            ..Default::default()
        }
    }

    fn rules() -> Arc<NormalizationTable> {
        Arc::new(NormalizationTable::with_defaults())
    }

    #[derive(Default)]
    struct Recorder {
        built: Vec<AcceptedChunk>,
        extended: Vec<AcceptedChunk>,
    }

    impl VectorIndexBuilder for Recorder {
        fn build(&mut self, chunks: &[AcceptedChunk]) -> Result<()> {
            self.built.extend_from_slice(chunks);
            Ok(())
        }

        fn extend(&mut self, chunks: &[AcceptedChunk]) -> Result<()> {
            self.extended.extend_from_slice(chunks);
            Ok(())
        }
    }

    #[test]
    fn test_reindexing_is_idempotent() {
        let fx = fixture();
        std::fs::write(fx.corpus.join("a.txt"), PROSE).unwrap();
        std::fs::write(fx.corpus.join("b.md"), format!("# Notes\n\n{PROSE} Again.")).unwrap();
        let indexer = Indexer::new(&fx.store, &fx.registry, IndexerOptions::default()).with_rules(rules());

        let first = indexer.run(&fx.corpus).unwrap();
        assert_eq!((first.seen, first.indexed), (2, 2));
        let chunks_before = fx.store.count_chunks().unwrap();
        assert!(chunks_before >= 2);

        let second = indexer.run(&fx.corpus).unwrap();
        assert_eq!(second.indexed, 0);
        assert_eq!(second.skipped_known, 2);
        assert!(second.chunks.is_empty());
        assert_eq!(fx.store.count_documents().unwrap(), 2);
        assert_eq!(fx.store.count_chunks().unwrap(), chunks_before);
    }

    #[test]
    fn test_identical_content_under_two_paths_is_one_document() {
        let fx = fixture();
        std::fs::write(fx.corpus.join("one.txt"), PROSE).unwrap();
        std::fs::create_dir_all(fx.corpus.join("copy")).unwrap();
        std::fs::write(fx.corpus.join("copy").join("two.txt"), PROSE).unwrap();

        let report = Indexer::new(&fx.store, &fx.registry, IndexerOptions::default())
            .run(&fx.corpus)
            .unwrap();
        assert_eq!(report.indexed, 1);
        assert_eq!(report.skipped_known, 1);
        assert_eq!(fx.store.count_documents().unwrap(), 1);
    }

    #[test]
    fn test_chunk_indices_are_contiguous_after_filtering() {
        let fx = fixture();
        let junk = "@".repeat(70);
        let body = format!(
            "{PROSE}\n\n{junk}\n\nA second paragraph that reads like ordinary prose.\n\nAnd a third one, also ordinary and readable."
        );
        std::fs::write(fx.corpus.join("doc.txt"), &body).unwrap();

        let report = Indexer::new(&fx.store, &fx.registry, small_chunks())
            .run(&fx.corpus)
            .unwrap();
        assert_eq!(report.indexed, 1);
        let indices: Vec<usize> = report.chunks.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(report.chunks.iter().all(|c| !c.content.contains('@')));

        let stored = fx.store.get_chunks_for_document(report.chunks[0].doc_id).unwrap();
        let stored_indices: Vec<i64> = stored.iter().map(|c| c.chunk_index).collect();
        assert_eq!(stored_indices, vec![0, 1, 2]);
        assert_eq!(stored[1].char_start, Some(report.chunks[1].char_start as i64));
    }

    #[test]
    fn test_garbage_document_is_rejected_and_not_stored() {
        let fx = fixture();
        let junk = "#".repeat(70);
        let body = format!("{PROSE}\n\n{junk}\n\n{junk}\n\n{junk}");
        std::fs::write(fx.corpus.join("noise.txt"), body).unwrap();

        let report = Indexer::new(&fx.store, &fx.registry, small_chunks())
            .run(&fx.corpus)
            .unwrap();
        assert_eq!(report.rejected_garbage, 1);
        assert_eq!(report.indexed, 0);
        assert!(fx.store.is_empty().unwrap());
    }

    #[test]
    fn test_minority_garbage_stores_only_good_chunks() {
        let fx = fixture();
        let junk = "#".repeat(70);
        // 51 prose paragraphs and 49 junk ones, one chunk each.
        let paragraphs: Vec<&str> = (0..100)
            .map(|i| if i % 2 == 1 && i < 98 { junk.as_str() } else { PROSE })
            .collect();
        assert_eq!(paragraphs.iter().filter(|p| p.starts_with('#')).count(), 49);
        std::fs::write(fx.corpus.join("mixed.txt"), paragraphs.join("\n\n")).unwrap();

        let report = Indexer::new(&fx.store, &fx.registry, small_chunks())
            .run(&fx.corpus)
            .unwrap();
        assert_eq!(report.indexed, 1);
        assert_eq!(report.rejected_garbage, 0);
        assert_eq!(report.chunks.len(), 51);
        assert_eq!(fx.store.count_chunks().unwrap(), 51);

        let stored = fx.store.get_chunks_for_document(report.chunks[0].doc_id).unwrap();
        assert!(stored.iter().all(|c| !c.content.contains('#')));
        let indices: Vec<i64> = stored.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, (0..51).collect::<Vec<i64>>());
    }

    struct Exploding;

    impl crate::extract::TextExtractor for Exploding {
        fn name(&self) -> &'static str {
            "exploding"
        }

        fn extract(&self, _path: &Path) -> Result<Vec<String>> {
            panic!("corrupt cross-reference table");
        }
    }

    struct Refusing;

    impl crate::extract::TextExtractor for Refusing {
        fn name(&self) -> &'static str {
            "refusing"
        }

        fn extract(&self, path: &Path) -> Result<Vec<String>> {
            Err(Error::extraction(path.display(), "encrypted"))
        }
    }

    #[test]
    fn test_extractor_failures_do_not_stop_the_walk() {
        let mut fx = fixture();
        fx.registry.register("bin", Arc::new(Exploding));
        fx.registry.register("lock", Arc::new(Refusing));
        std::fs::write(fx.corpus.join("a_crash.bin"), b"\x00\x01").unwrap();
        std::fs::write(fx.corpus.join("b_sealed.lock"), b"sealed").unwrap();
        std::fs::write(fx.corpus.join("c_good.txt"), PROSE).unwrap();

        let report = Indexer::new(&fx.store, &fx.registry, IndexerOptions::default())
            .run(&fx.corpus)
            .unwrap();
        assert_eq!(report.seen, 3);
        assert_eq!(report.failed, 2);
        assert_eq!(report.indexed, 1);
        assert_eq!(fx.store.count_documents().unwrap(), 1);
        assert_eq!(fx.store.count_chunks().unwrap(), 1);
    }

    #[test]
    fn test_missing_rules_abort_on_formatted_input_only() {
        let fx = fixture();
        std::fs::write(fx.corpus.join("a.txt"), PROSE).unwrap();
        let indexer = Indexer::new(&fx.store, &fx.registry, IndexerOptions::default());
        assert_eq!(indexer.run(&fx.corpus).unwrap().indexed, 1);

        std::fs::write(fx.corpus.join("b.md"), "Some *markdown* text to index here.").unwrap();
        let err = indexer.run(&fx.corpus).unwrap_err();
        assert!(matches!(err, Error::MissingRuleSet(_)));
    }

    #[test]
    fn test_bad_files_are_counted_and_walk_continues() {
        let fx = fixture();
        std::fs::write(fx.corpus.join("a_binary.txt"), [0u8, 1, 2, 0, 3]).unwrap();
        std::fs::write(fx.corpus.join("b_image.png"), [137u8, 80, 78, 71]).unwrap();
        std::fs::write(fx.corpus.join("c_blank.txt"), "   \n").unwrap();
        std::fs::write(fx.corpus.join("d_good.txt"), PROSE).unwrap();

        let report = Indexer::new(&fx.store, &fx.registry, IndexerOptions::default())
            .run(&fx.corpus)
            .unwrap();
        assert_eq!(report.seen, 4);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped_unsupported, 1);
        assert_eq!(report.empty, 1);
        assert_eq!(report.indexed, 1);
    }

    #[test]
    fn test_clean_text_writes_no_audit_file() {
        let fx = fixture();
        std::fs::write(
            fx.corpus.join("clean.md"),
            "The library keeps every ledger in order.",
        )
        .unwrap();
        let dict = Dictionary::from_words(["library", "keeps", "every", "ledger", "order"]);
        let audit = AuditLog::with_stamp(&fx.logs, "clean");
        let audit_path = audit.path().to_path_buf();

        let report = Indexer::new(&fx.store, &fx.registry, IndexerOptions::default())
            .with_rules(rules())
            .with_ocr(OcrHeuristic::new(Arc::new(dict)), audit)
            .run(&fx.corpus)
            .unwrap();
        assert_eq!(report.indexed, 1);
        assert!(!audit_path.exists());
    }

    #[test]
    fn test_noisy_text_logs_suggestions_without_changing_rules() {
        let fx = fixture();
        std::fs::write(
            fx.corpus.join("scan.md"),
            "Tbe librarv keeps every ledgcr and anothcr record.",
        )
        .unwrap();
        // Plain text is never scanned.
        std::fs::write(fx.corpus.join("plain.txt"), "A librarv of plain text.").unwrap();

        let dict = Dictionary::from_words(["library", "keeps", "every", "ledger", "another", "record", "plain", "text"]);
        let audit = AuditLog::with_stamp(&fx.logs, "noisy");
        let audit_path = audit.path().to_path_buf();
        let table = rules();

        Indexer::new(&fx.store, &fx.registry, IndexerOptions::default())
            .with_rules(table.clone())
            .with_ocr(OcrHeuristic::new(Arc::new(dict)), audit)
            .run(&fx.corpus)
            .unwrap();

        let log = std::fs::read_to_string(&audit_path).unwrap();
        assert_eq!(
            log.lines().collect::<Vec<_>>(),
            vec![
                "[OCR] Suggest fix: 'anothcr' → 'another'",
                "[OCR] Suggest fix: 'ledgcr' → 'ledger'",
                "[OCR] Suggest fix: 'librarv' → 'library'",
            ]
        );
        assert_eq!(table.rules(), &RuleSet::default_rules());
    }

    #[test]
    fn test_changed_content_keeps_document_id() {
        let fx = fixture();
        let path = fx.corpus.join("essay.txt");
        std::fs::write(&path, PROSE).unwrap();
        let indexer = Indexer::new(&fx.store, &fx.registry, IndexerOptions::default());
        let first = indexer.run(&fx.corpus).unwrap();

        std::fs::write(&path, format!("{PROSE} Revised with a new closing sentence.")).unwrap();
        let second = indexer.run(&fx.corpus).unwrap();

        assert_eq!(second.indexed, 1);
        assert_eq!(second.chunks[0].doc_id, first.chunks[0].doc_id);
        assert_eq!(fx.store.count_documents().unwrap(), 1);
        let stored = fx.store.get_chunks_for_document(first.chunks[0].doc_id).unwrap();
        assert!(stored[0].content.contains("Revised"));
    }

    #[test]
    fn test_run_into_builds_then_extends() {
        let fx = fixture();
        std::fs::write(fx.corpus.join("a.txt"), PROSE).unwrap();
        let indexer = Indexer::new(&fx.store, &fx.registry, IndexerOptions::default());
        let mut recorder = Recorder::default();

        indexer.run_into(&fx.corpus, &mut recorder).unwrap();
        assert_eq!(recorder.built.len(), 1);
        assert!(recorder.extended.is_empty());

        std::fs::write(fx.corpus.join("b.txt"), "Another short but perfectly readable note.").unwrap();
        indexer.run_into(&fx.corpus, &mut recorder).unwrap();
        assert_eq!(recorder.built.len(), 1);
        assert_eq!(recorder.extended.len(), 1);
        assert_eq!(recorder.extended[0].title, "b");

        let reloaded = reload_chunks(&fx.store).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded[0], recorder.built[0]);
    }

    #[test]
    fn test_raw_export_writes_extracted_text() {
        let fx = fixture();
        std::fs::write(fx.corpus.join("memo.txt"), PROSE).unwrap();
        let options = IndexerOptions {
            raw_export_dir: Some(fx.logs.clone()),
            ..Default::default()
        };
        Indexer::new(&fx.store, &fx.registry, options)
            .run(&fx.corpus)
            .unwrap();

        let exported: Vec<PathBuf> = std::fs::read_dir(&fx.logs)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(exported.len(), 1);
        let name = exported[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("memo_") && name.ends_with(".txt"));
        assert_eq!(std::fs::read_to_string(&exported[0]).unwrap(), PROSE);
    }

    #[test]
    fn test_missing_directory_is_not_found() {
        let fx = fixture();
        let indexer = Indexer::new(&fx.store, &fx.registry, IndexerOptions::default());
        assert!(matches!(
            indexer.run(&fx.corpus.join("absent")),
            Err(Error::NotFound(_))
        ));
    }
}
