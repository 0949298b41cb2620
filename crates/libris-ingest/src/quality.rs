//! Chunk-level garbage detection and the document-level verdict.

use tracing::debug;

use libris_core::config::DEFAULT_GARBAGE_THRESHOLD;

use crate::chunking::TextChunk;

const MIN_CHUNK_CHARS: usize = 10;
/// Code points above this count as "high" (outside Latin/Greek/Cyrillic and kin).
const HIGH_UNICODE: u32 = 2000;

const GARBAGE_MAX_HIGH_UNICODE: f64 = 0.30;
const GARBAGE_MIN_PRINTABLE: f64 = 0.60;
const GARBAGE_MIN_ALNUM: f64 = 0.20;

const GOOD_MIN_PRINTABLE: f64 = 0.90;
const GOOD_MIN_ALNUM: f64 = 0.50;
const GOOD_MAX_HIGH_UNICODE: f64 = 0.05;

/// Character-class ratios of a stripped chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkProfile {
    pub chars: usize,
    pub high_unicode: f64,
    pub printable: f64,
    pub alnum: f64,
}

impl ChunkProfile {
    pub fn measure(text: &str) -> Self {
        let stripped = text.trim();
        let mut chars = 0usize;
        let (mut high, mut printable, mut alnum) = (0usize, 0usize, 0usize);
        for c in stripped.chars() {
            chars += 1;
            if c as u32 > HIGH_UNICODE {
                high += 1;
            }
            if is_printable(c) {
                printable += 1;
            }
            if c.is_alphanumeric() {
                alnum += 1;
            }
        }
        let ratio = |n: usize| if chars == 0 { 0.0 } else { n as f64 / chars as f64 };
        Self {
            chars,
            high_unicode: ratio(high),
            printable: ratio(printable),
            alnum: ratio(alnum),
        }
    }
}

/// ASCII printable, whitespace included.
fn is_printable(c: char) -> bool {
    c.is_ascii_graphic() || matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0b' | '\x0c')
}

pub fn is_garbage(text: &str) -> bool {
    let p = ChunkProfile::measure(text);
    p.chars < MIN_CHUNK_CHARS
        || p.high_unicode > GARBAGE_MAX_HIGH_UNICODE
        || p.printable < GARBAGE_MIN_PRINTABLE
        || p.alnum < GARBAGE_MIN_ALNUM
}

/// Clean enough that OCR correction can be skipped for it.
pub fn is_good_chunk(text: &str) -> bool {
    let p = ChunkProfile::measure(text);
    p.chars >= MIN_CHUNK_CHARS
        && p.printable >= GOOD_MIN_PRINTABLE
        && p.alnum >= GOOD_MIN_ALNUM
        && p.high_unicode <= GOOD_MAX_HIGH_UNICODE
}

/// A chunk that passed the filter.
#[derive(Debug, Clone)]
pub struct FilteredChunk {
    pub chunk: TextChunk,
    pub skip_ocr_fix: bool,
}

#[derive(Debug)]
pub enum Verdict {
    Accepted {
        kept: Vec<FilteredChunk>,
        garbage: usize,
        total: usize,
    },
    Rejected {
        garbage: usize,
        total: usize,
    },
}

impl Verdict {
    pub fn garbage_ratio(&self) -> f64 {
        let (garbage, total) = match self {
            Self::Accepted { garbage, total, .. } | Self::Rejected { garbage, total } => {
                (*garbage, *total)
            }
        };
        if total == 0 {
            0.0
        } else {
            garbage as f64 / total as f64
        }
    }
}

pub struct QualityFilter {
    garbage_threshold: f64,
}

impl QualityFilter {
    pub fn new(garbage_threshold: f64) -> Self {
        Self { garbage_threshold }
    }

    /// Reject the document when the garbage share exceeds the threshold;
    /// otherwise keep its non-garbage chunks in order.
    pub fn evaluate(&self, chunks: Vec<TextChunk>) -> Verdict {
        let total = chunks.len();
        let flags: Vec<bool> = chunks.iter().map(|c| is_garbage(&c.text)).collect();
        let garbage = flags.iter().filter(|g| **g).count();

        if total > 0 && garbage as f64 / total as f64 > self.garbage_threshold {
            return Verdict::Rejected { garbage, total };
        }

        let kept: Vec<FilteredChunk> = chunks
            .into_iter()
            .zip(flags)
            .filter(|(_, is_garbage)| !is_garbage)
            .map(|(chunk, _)| FilteredChunk {
                skip_ocr_fix: is_good_chunk(&chunk.text),
                chunk,
            })
            .collect();
        debug!(total, garbage, kept = kept.len(), "Chunk filter applied");
        Verdict::Accepted {
            kept,
            garbage,
            total,
        }
    }
}

impl Default for QualityFilter {
    fn default() -> Self {
        Self::new(DEFAULT_GARBAGE_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::RecursiveChunker;

    const GOOD: &str = "A perfectly ordinary sentence about old books and their readers.";

    fn chunk(text: &str) -> TextChunk {
        TextChunk {
            text: text.to_string(),
            chunk_index: 0,
            total_chunks: 1,
            char_start: 0,
            char_end: text.chars().count(),
        }
    }

    #[test]
    fn test_garbage_rules() {
        assert!(is_garbage("short"));
        assert!(is_garbage("   tiny   "));
        assert!(is_garbage("$$$$ #### @@@@ !!!!"));
        assert!(is_garbage("日本語の文章です、日本語の文章です"));
        assert!(!is_garbage(GOOD));
        // Accented Latin is neither high-Unicode nor non-alphanumeric.
        assert!(!is_garbage("Ça déjà été là, naïve façade près du château."));
    }

    #[test]
    fn test_good_chunk_rules() {
        assert!(is_good_chunk(GOOD));
        // Below 90% ASCII printable: usable but not clean enough to skip OCR fixes.
        let accented = "éàüöçéàüöç mixed with text";
        assert!(!is_garbage(accented));
        assert!(!is_good_chunk(accented));
        assert!(!is_good_chunk("short"));
    }

    #[test]
    fn test_profile_ratios() {
        let p = ChunkProfile::measure("  ab12!!    ");
        assert_eq!(p.chars, 6);
        assert!((p.alnum - 4.0 / 6.0).abs() < 1e-9);
        assert_eq!(p.printable, 1.0);
        assert_eq!(p.high_unicode, 0.0);
    }

    #[test]
    fn test_majority_garbage_rejects_document() {
        let filter = QualityFilter::new(0.5);
        // 51 of 100 garbage.
        let mut chunks: Vec<TextChunk> = (0..49).map(|_| chunk(GOOD)).collect();
        chunks.extend((0..51).map(|_| chunk("@@")));
        let verdict = filter.evaluate(chunks);
        assert!(matches!(verdict, Verdict::Rejected { garbage: 51, total: 100 }));
        assert!((verdict.garbage_ratio() - 0.51).abs() < 1e-9);
    }

    #[test]
    fn test_minority_garbage_keeps_good_chunks() {
        let filter = QualityFilter::new(0.5);
        let mut chunks: Vec<TextChunk> = (0..51).map(|_| chunk(GOOD)).collect();
        chunks.extend((0..49).map(|_| chunk("@@")));
        match filter.evaluate(chunks) {
            Verdict::Accepted { kept, garbage, total } => {
                assert_eq!((kept.len(), garbage, total), (51, 49, 100));
                assert!(kept.iter().all(|c| c.chunk.text == GOOD && c.skip_ocr_fix));
            }
            other => panic!("unexpected verdict: {other:?}"),
        }
    }

    #[test]
    fn test_document_with_few_glyphs_and_fragments() {
        // ~5000 characters of prose with three stray glyphs, plus two 8-character fragments.
        let paragraph = "The library kept ledgers of every loan, and the clerks wrote \
                         their notes in a careful hand that later readers could follow. ";
        let mut text = paragraph.repeat(41);
        for (i, glyph) in [(700, '☃'), (2100, '☃'), (3900, '☃')] {
            let at = text.char_indices().nth(i).map(|(b, _)| b).unwrap();
            text.insert(at, glyph);
        }
        assert!(text.chars().count() > 5000);

        // Eight characters each: rejected on length alone.
        let fragments = ["Page 12.", "-- 17 --"];
        for f in fragments {
            assert_eq!(f.chars().count(), 8);
            assert!(is_garbage(f));
        }
        assert!(!is_garbage("Page 1234."));

        let mut chunks = RecursiveChunker::new(1000, 200).chunk(&text);
        let prose = chunks.len();
        chunks.extend(fragments.iter().map(|f| chunk(f)));

        match QualityFilter::default().evaluate(chunks) {
            Verdict::Accepted { kept, garbage, total } => {
                assert_eq!(garbage, 2);
                assert_eq!(total, prose + 2);
                assert_eq!(kept.len(), prose);
                assert!(kept.iter().all(|c| c.skip_ocr_fix));
            }
            other => panic!("unexpected verdict: {other:?}"),
        }
    }

    #[test]
    fn test_empty_document_is_accepted_with_nothing_kept() {
        let verdict = QualityFilter::default().evaluate(Vec::new());
        assert!(matches!(verdict, Verdict::Accepted { ref kept, .. } if kept.is_empty()));
        assert_eq!(verdict.garbage_ratio(), 0.0);
    }
}
