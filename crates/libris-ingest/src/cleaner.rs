//! Deterministic text normalization ahead of chunking.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;

use crate::encoding;
use crate::normalization::NormalizationTable;

/// Guard against rule tables that never settle.
const MAX_PASSES: usize = 64;
const MIN_HEADER_CHARS: usize = 10;

static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[^\S\n]*\n\s*").unwrap());
static EDITORIAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:edited\s+by|translated\s+by|penes\s+nos)\b").unwrap());
static COPYRIGHT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)(?:©.*$|^[^\S\n]*copyright\b.*$)").unwrap());
static IMPRINT_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?im)\bMDC[CLXVI]*\b.*$").unwrap());
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").unwrap());
static TRAILING_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)[^\S\n]+$").unwrap());

/// Applies encoding repair, the rule table and layout cleanup.
#[derive(Debug, Clone)]
pub struct TextCleaner {
    table: Arc<NormalizationTable>,
}

impl TextCleaner {
    pub fn new(table: Arc<NormalizationTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &NormalizationTable {
        &self.table
    }

    /// Full cleaning for formatted sources (PDF, EPUB, DOCX, ...).
    ///
    /// Passes repeat until the output stops changing, so
    /// `clean(clean(x)) == clean(x)`.
    pub fn clean(&self, raw: &str) -> String {
        let mut current = self.clean_pass(raw);
        for pass in 1..MAX_PASSES {
            let next = self.clean_pass(&current);
            if next == current {
                debug!(passes = pass, "Cleaner reached fixpoint");
                return current;
            }
            current = next;
        }
        warn!("Cleaner still changing text after {MAX_PASSES} passes; check the rule table");
        current
    }

    /// Plain-text sources skip layout cleanup: trim and rules only.
    pub fn clean_plain(&self, raw: &str) -> String {
        self.table.apply(raw.trim())
    }

    fn clean_pass(&self, raw: &str) -> String {
        let text = raw.replace("\r\n", "\n").replace('\r', "\n");
        let text: String = repair_mojibake(&text).nfkc().collect();
        let text = self.table.apply(text.trim());
        let text = BLANK_LINES.replace_all(&text, "\n\n");
        let text = join_soft_wraps(&text);
        let text = strip_header_lines(&text);
        let text = remove_until_gone(&EDITORIAL, &text);
        let text = remove_until_gone(&COPYRIGHT_LINE, &text);
        let text = remove_until_gone(&IMPRINT_LINE, &text);
        let text = MULTI_SPACE.replace_all(&text, " ");
        let text = TRAILING_SPACE.replace_all(&text, "");
        text.trim().to_string()
    }
}

/// Re-decode runs of CP-1252/Latin-1 characters that are really UTF-8
/// bytes read with the wrong codec ("cafÃ©" becomes "café").
pub fn repair_mojibake(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run: Vec<char> = Vec::new();
    for c in text.chars() {
        if !c.is_ascii() && encoding::encode_char(c).is_some() {
            run.push(c);
        } else {
            flush_run(&mut run, &mut out);
            out.push(c);
        }
    }
    flush_run(&mut run, &mut out);
    out
}

fn flush_run(run: &mut Vec<char>, out: &mut String) {
    if run.is_empty() {
        return;
    }
    let bytes: Vec<u8> = run.iter().filter_map(|&c| encoding::encode_char(c)).collect();
    let mut i = 0;
    while i < bytes.len() {
        let width = utf8_width(bytes[i]);
        if width > 1 && i + width <= bytes.len() {
            if let Ok(decoded) = std::str::from_utf8(&bytes[i..i + width]) {
                out.push_str(decoded);
                i += width;
                continue;
            }
        }
        out.push(run[i]);
        i += 1;
    }
    run.clear();
}

fn utf8_width(lead: u8) -> usize {
    match lead {
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => 1,
    }
}

/// Turn single line breaks inside sentences into spaces. Paragraph
/// breaks, breaks after `.?!` and breaks before a capital survive.
fn join_soft_wraps(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    for (i, &c) in chars.iter().enumerate() {
        if c != '\n' {
            out.push(c);
            continue;
        }
        let prev = if i > 0 { Some(chars[i - 1]) } else { None };
        let next = chars.get(i + 1).copied();
        let keep = prev == Some('\n')
            || next == Some('\n')
            || matches!(prev, Some('.' | '?' | '!'))
            || next.is_some_and(|n| n.is_ascii_uppercase());
        out.push(if keep { '\n' } else { ' ' });
    }
    out
}

/// Delete matches until none remain; a deletion can join the halves of a
/// new match ("Edited Edited by by").
fn remove_until_gone(re: &Regex, text: &str) -> String {
    let mut text = text.to_string();
    while re.is_match(&text) {
        text = re.replace_all(&text, "").into_owned();
    }
    text
}

fn is_header_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.chars().count() >= MIN_HEADER_CHARS
        && trimmed.chars().any(|c| c.is_ascii_uppercase())
        && trimmed
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_whitespace() || c.is_ascii_punctuation())
}

fn strip_header_lines(text: &str) -> String {
    text.split('\n')
        .filter(|line| !is_header_line(line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaner() -> TextCleaner {
        TextCleaner::new(Arc::new(NormalizationTable::with_defaults()))
    }

    #[test]
    fn test_repair_mojibake() {
        assert_eq!(repair_mojibake("cafÃ© au lait"), "café au lait");
        assert_eq!(repair_mojibake("itâ€™s"), "it\u{2019}s");
        // Genuine Latin-1 text is left alone.
        assert_eq!(repair_mojibake("déjà vu, naïve"), "déjà vu, naïve");
    }

    #[test]
    fn test_clean_applies_rules_after_repair() {
        let c = cleaner();
        assert_eq!(c.clean("itâ€™s a \u{FB01}ne medireval day."), "it's a fine mediaeval day.");
    }

    #[test]
    fn test_soft_wraps_join_and_paragraphs_survive() {
        let c = cleaner();
        let raw = "The quick brown\nfox jumps.\nOver the dog\n\n\n\nsecond paragraph\nhere.";
        assert_eq!(
            c.clean(raw),
            "The quick brown fox jumps.\nOver the dog\n\nsecond paragraph here."
        );
    }

    #[test]
    fn test_header_lines_removed() {
        let c = cleaner();
        let raw = "Intro text.\nCHAPTER THE FIRST.\nBody text goes on.";
        assert_eq!(c.clean(raw), "Intro text.\nBody text goes on.");
        // Short capitals are kept.
        assert_eq!(c.clean("Text.\nI SAW IT"), "Text.\nI SAW IT");
    }

    #[test]
    fn test_boilerplate_removed() {
        let c = cleaner();
        let raw = "Edited by John Smith.\n© 1901 Some Press\nCopyright 1999 by nobody\nMDCCCXC printed here\nThe real text.";
        assert_eq!(c.clean(raw), "John Smith.\n\nThe real text.");
    }

    #[test]
    fn test_nested_editorial_credit_removed_in_one_call() {
        let c = cleaner();
        let raw = format!("Preface {}{}text", "Edited ".repeat(9), "by ".repeat(9));
        let once = c.clean(&raw);
        assert_eq!(once, "Preface text");
        assert_eq!(c.clean(&once), once);
    }

    #[test]
    fn test_whitespace_collapsed() {
        let c = cleaner();
        assert_eq!(c.clean("  a   b  \t\nC   d  "), "a b\nC d");
    }

    #[test]
    fn test_clean_is_idempotent() {
        let c = cleaner();
        let samples = [
            "PROLOGUE AND PREFACE\n\nSome   text\nthat wraps.\n\n\nNext\u{2014}part \u{2026}",
            "© x\n\n\n\nEdited by\n\nA.\n\nTHE END OF ALL\n\nB",
            "a\r\nb\rc\n\n\n",
            "EditEdited byed by someone",
            "",
        ];
        for raw in samples {
            let once = c.clean(raw);
            assert_eq!(c.clean(&once), once, "input: {raw:?}");
        }
    }

    #[test]
    fn test_clean_plain_keeps_layout() {
        let c = cleaner();
        assert_eq!(
            c.clean_plain("  line one\nline two \u{2014} end  \n"),
            "line one\nline two - end"
        );
    }
}
