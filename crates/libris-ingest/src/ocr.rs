//! OCR noise heuristic and the per-run suggestion audit log.
//!
//! The heuristic samples word tokens and measures how many are unknown
//! to the dictionary. Noisy text gets a correction scan whose suggestions
//! go to an audit file for human review; they never touch the live
//! normalization table.

use std::collections::{BTreeMap, HashSet};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use libris_core::Result;

use crate::dictionary::Dictionary;

pub const DEFAULT_SAMPLE_SIZE: usize = 200;
pub const DEFAULT_MAX_MISSPELLED_RATIO: f64 = 0.01;
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;
/// Upper bound on distinct unknown tokens examined per document.
const MAX_UNKNOWN_SCANNED: usize = 500;

const AUDIT_PREFIX: &str = "ocr_artifacts_";
const AUDIT_STAMP_FORMAT: &str = "%Y-%m-%d_%H%M%S";
const LINE_PREFIX: &str = "[OCR] Suggest fix: '";
const LINE_ARROW: &str = "' → '";

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[a-zA-Z]{4,}\b").unwrap());

pub struct OcrHeuristic {
    dictionary: Arc<Dictionary>,
    sample_size: usize,
    max_misspelled_ratio: f64,
    similarity_threshold: f64,
}

impl OcrHeuristic {
    pub fn new(dictionary: Arc<Dictionary>) -> Self {
        Self {
            dictionary,
            sample_size: DEFAULT_SAMPLE_SIZE,
            max_misspelled_ratio: DEFAULT_MAX_MISSPELLED_RATIO,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    pub fn with_max_misspelled_ratio(mut self, ratio: f64) -> Self {
        self.max_misspelled_ratio = ratio;
        self
    }

    /// Fraction of the first `sample_size` tokens unknown to the
    /// dictionary. Zero for text without tokens.
    pub fn misspelled_ratio(&self, text: &str) -> f64 {
        let sample: Vec<&str> = WORD
            .find_iter(text)
            .take(self.sample_size)
            .map(|m| m.as_str())
            .collect();
        if sample.is_empty() {
            return 0.0;
        }
        let unknown = sample
            .iter()
            .filter(|w| !self.dictionary.contains(w))
            .count();
        unknown as f64 / sample.len() as f64
    }

    pub fn is_clean(&self, text: &str) -> bool {
        let ratio = self.misspelled_ratio(text);
        debug!("Misspelled ratio: {ratio:.3}");
        ratio < self.max_misspelled_ratio
    }

    /// Map each distinct unknown token to its closest dictionary word,
    /// when that word is similar enough.
    pub fn detect_artifacts(&self, text: &str) -> BTreeMap<String, String> {
        let mut seen = HashSet::new();
        let unknown: Vec<String> = WORD
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .filter(|w| !self.dictionary.contains(w) && seen.insert(w.clone()))
            .take(MAX_UNKNOWN_SCANNED)
            .collect();
        info!("Checking {} potential OCR artifacts", unknown.len());

        let mut suggestions = BTreeMap::new();
        for word in unknown {
            if let Some(best) = self.best_candidate(&word) {
                suggestions.insert(word, best);
            }
        }
        suggestions
    }

    fn best_candidate(&self, word: &str) -> Option<String> {
        let mut best: Option<(f64, u64, String)> = None;
        for cand in self.dictionary.candidates(word) {
            let score = strsim::normalized_levenshtein(word, &cand);
            let freq = self.dictionary.frequency(&cand);
            let better = match &best {
                None => true,
                Some((s, f, w)) => {
                    score > *s || (score == *s && (freq > *f || (freq == *f && cand < *w)))
                }
            };
            if better {
                best = Some((score, freq, cand));
            }
        }
        best.filter(|(score, _, cand)| *score >= self.similarity_threshold && cand != word)
            .map(|(_, _, cand)| cand)
    }
}

/// One suggestion parsed back from an audit file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub bad: String,
    pub good: String,
    pub suggested_at: String,
}

impl AuditRecord {
    pub fn parse_line(line: &str, suggested_at: &str) -> Option<Self> {
        let rest = line.trim().strip_prefix(LINE_PREFIX)?;
        let rest = rest.strip_suffix('\'')?;
        let (bad, good) = rest.split_once(LINE_ARROW)?;
        Some(Self {
            bad: bad.to_string(),
            good: good.to_string(),
            suggested_at: suggested_at.to_string(),
        })
    }
}

pub fn format_line(bad: &str, good: &str) -> String {
    format!("{LINE_PREFIX}{bad}{LINE_ARROW}{good}'")
}

/// Append-only suggestion log, one file per run. The file is created on
/// the first write.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(dir: &Path) -> Self {
        let stamp = chrono::Local::now().format(AUDIT_STAMP_FORMAT).to_string();
        Self::with_stamp(dir, &stamp)
    }

    pub fn with_stamp(dir: &Path, stamp: &str) -> Self {
        Self {
            path: dir.join(format!("{AUDIT_PREFIX}{stamp}.txt")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append suggestions in key order. Returns the number of lines written.
    pub fn record(&self, suggestions: &BTreeMap<String, String>) -> Result<usize> {
        if suggestions.is_empty() {
            return Ok(0);
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        for (bad, good) in suggestions {
            writeln!(file, "{}", format_line(bad, good))?;
        }
        info!(
            "Logged {} OCR suggestions to {}",
            suggestions.len(),
            self.path.display()
        );
        Ok(suggestions.len())
    }
}

/// Run stamp encoded in an audit file name, if `name` is one.
pub fn audit_stamp(name: &str) -> Option<&str> {
    name.strip_prefix(AUDIT_PREFIX)?.strip_suffix(".txt")
}
