//! Recursive character text splitting with overlap.
//!
//! Separator hierarchy: paragraph, line, sentence, word, character. Each
//! split keeps its separator at the front of the following piece. Pieces
//! below the target size are merged greedily; larger pieces descend to
//! the next separator. Sizes are counted in characters.

use std::collections::VecDeque;

use libris_core::ChunkingConfig;

const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// A chunk of the input with its character span.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub text: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    /// Character offset of the first character in the chunker input.
    pub char_start: usize,
    /// One past the last character.
    pub char_end: usize,
}

pub struct RecursiveChunker {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl RecursiveChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        let pieces = self.split_text(text, &SEPARATORS);
        let total = pieces.len();

        let mut result = Vec::with_capacity(total);
        // Byte/char cursor at the start of the previous chunk.
        let mut cursor_byte = 0usize;
        let mut cursor_char = 0usize;
        let mut search_from = 0usize;

        for piece in pieces {
            let len = char_len(&piece);
            let (char_start, next_search) = match text[search_from..].find(piece.as_str()) {
                Some(rel) => {
                    let start = search_from + rel;
                    cursor_char += char_len(&text[cursor_byte..start]);
                    cursor_byte = start;
                    let first = text[start..].chars().next().map_or(1, char::len_utf8);
                    (cursor_char, start + first)
                }
                // Overlap bookkeeping went astray; fall back to a full scan.
                None => match text.find(piece.as_str()) {
                    Some(start) => (char_len(&text[..start]), search_from),
                    None => (cursor_char, search_from),
                },
            };
            search_from = next_search;

            result.push(TextChunk {
                chunk_index: result.len(),
                total_chunks: total,
                char_start,
                char_end: char_start + len,
                text: piece,
            });
        }
        result
    }

    fn split_text(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (idx, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, s)| s.is_empty() || text.contains(**s))
            .map(|(i, s)| (i, *s))
            .unwrap_or((separators.len().saturating_sub(1), ""));
        let remaining = separators.get(idx + 1..).unwrap_or(&[]);

        let mut chunks = Vec::new();
        let mut small: Vec<&str> = Vec::new();

        for split in split_keep_separator(text, separator) {
            if char_len(split) < self.chunk_size {
                small.push(split);
                continue;
            }
            if !small.is_empty() {
                chunks.extend(self.merge_splits(&small));
                small.clear();
            }
            if remaining.is_empty() {
                let trimmed = split.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_text(split, remaining));
            }
        }
        if !small.is_empty() {
            chunks.extend(self.merge_splits(&small));
        }
        chunks
    }

    /// Greedy merge. After a window is emitted, drop pieces from its front
    /// until it holds at most `chunk_overlap` characters and the next piece fits.
    fn merge_splits(&self, splits: &[&str]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &split in splits {
            let len = char_len(split);
            if total + len > self.chunk_size && !window.is_empty() {
                push_joined(&window, &mut docs);
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some((_, l)) => total -= l,
                        None => break,
                    }
                }
            }
            window.push_back((split, len));
            total += len;
        }
        push_joined(&window, &mut docs);
        docs
    }
}

impl Default for RecursiveChunker {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}

fn push_joined(window: &VecDeque<(&str, usize)>, docs: &mut Vec<String>) {
    let joined: String = window.iter().map(|(s, _)| *s).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

/// Split before each occurrence of `separator`, so every piece after the
/// first starts with it. An empty separator splits into characters.
fn split_keep_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
