//! Word-frequency dictionary backing the OCR heuristic.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::info;

use libris_core::{Error, Result};

const ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz";

static BUILTIN_WORDS: &str = include_str!("../data/en_frequency.txt");

/// Lower-cased known words with their frequencies.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    words: HashMap<String, u64>,
    by_len: HashMap<usize, Vec<String>>,
}

impl Dictionary {
    /// Load a word list: one `word` or `word count` per line. Blank lines
    /// and `#` comments are ignored.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let dict = Self::parse(&raw, &path.display().to_string())?;
        info!("Dictionary loaded: {} ({} words)", path.display(), dict.len());
        Ok(dict)
    }

    /// The bundled English frequency list, used when no word list is configured.
    pub fn builtin() -> Result<Self> {
        let dict = Self::parse(BUILTIN_WORDS, "built-in word list")?;
        info!("Built-in dictionary loaded ({} words)", dict.len());
        Ok(dict)
    }

    /// The word list at `path` when one is configured, the built-in list otherwise.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::builtin(),
        }
    }

    fn parse(raw: &str, origin: &str) -> Result<Self> {
        let mut dict = Self::default();
        for (lineno, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            let Some(word) = parts.next() else { continue };
            let count = match parts.next() {
                Some(n) => n.parse::<u64>().map_err(|_| {
                    Error::Config(format!("{}:{}: bad frequency {n:?}", origin, lineno + 1))
                })?,
                None => 1,
            };
            dict.insert(word, count);
        }
        Ok(dict)
    }

    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut dict = Self::default();
        for w in words {
            dict.insert(w.as_ref(), 1);
        }
        dict
    }

    pub fn insert(&mut self, word: &str, count: u64) {
        let word = word.to_lowercase();
        if word.is_empty() {
            return;
        }
        match self.words.get_mut(&word) {
            Some(existing) => *existing += count,
            None => {
                self.by_len
                    .entry(word.chars().count())
                    .or_default()
                    .push(word.clone());
                self.words.insert(word, count);
            }
        }
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains_key(&word.to_lowercase())
    }

    pub fn frequency(&self, word: &str) -> u64 {
        self.words.get(&word.to_lowercase()).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Known words one edit away from `word`; if there are none, known
    /// words within two edits (found by scanning nearby lengths).
    pub fn candidates(&self, word: &str) -> Vec<String> {
        let word = word.to_lowercase();
        let mut near: Vec<String> = edits1(&word)
            .into_iter()
            .filter(|e| self.words.contains_key(e))
            .collect();
        if near.is_empty() {
            let len = word.chars().count();
            for l in len.saturating_sub(2)..=len + 2 {
                if let Some(bucket) = self.by_len.get(&l) {
                    near.extend(
                        bucket
                            .iter()
                            .filter(|w| strsim::levenshtein(&word, w) <= 2)
                            .cloned(),
                    );
                }
            }
        }
        near.sort();
        near.dedup();
        near
    }
}

/// Every string one deletion, transposition, replacement or insertion
/// away from `word`.
fn edits1(word: &str) -> HashSet<String> {
    let chars: Vec<char> = word.chars().collect();
    let n = chars.len();
    let mut out = HashSet::new();
    let build = |parts: &[&[char]]| parts.iter().flat_map(|p| p.iter()).collect::<String>();

    for i in 0..=n {
        let (left, right) = chars.split_at(i);
        if !right.is_empty() {
            out.insert(build(&[left, &right[1..]]));
        }
        if right.len() > 1 {
            out.insert(build(&[left, &[right[1], right[0]][..], &right[2..]]));
        }
        for c in ALPHABET.chars() {
            if !right.is_empty() {
                out.insert(build(&[left, &[c][..], &right[1..]]));
            }
            out.insert(build(&[left, &[c][..], right]));
        }
    }
    out.remove(word);
    out
}
