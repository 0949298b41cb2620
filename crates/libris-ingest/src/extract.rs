//! Format dispatch: file extension → text extractor.
//!
//! Each extractor turns one file into text segments (pages, posts,
//! chapters). The registry picks the extractor by lowercase extension;
//! several may share an extension and claim files by content (XML exports).

mod archive;
mod external;
mod feeds;
mod markup;
mod text;

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use libris_core::{Error, Result};

pub use archive::{DocxExtractor, EpubExtractor};
pub use external::{DjvuExtractor, MobiExtractor, PdfExtractor};
pub use feeds::{BloggerExtractor, WordPressExtractor};
pub use markup::{html_to_text, rtf_to_text, HtmlExtractor, RtfExtractor};
pub use text::{decode_text, MarkdownExtractor, PlainTextExtractor};

/// Separator placed between extracted segments.
pub const SEGMENT_SEPARATOR: &str = "\n\n";

pub trait TextExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this extractor claims `path` once its extension matched.
    fn accepts(&self, _path: &Path) -> bool {
        true
    }

    fn extract(&self, path: &Path) -> Result<Vec<String>>;

    /// Unformatted text that skips layout cleanup and the OCR scan.
    fn is_plain_text(&self) -> bool {
        false
    }
}

/// The output of a successful extraction.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub extractor: &'static str,
    pub segments: Vec<String>,
    pub plain_text: bool,
}

impl Extraction {
    /// Non-blank segments joined by a blank line.
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(SEGMENT_SEPARATOR)
    }

    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| s.trim().is_empty())
    }
}

#[derive(Default)]
pub struct ExtractorRegistry {
    by_extension: HashMap<String, Vec<Arc<dyn TextExtractor>>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in format. `blog_tags` filters Blogger posts.
    pub fn with_defaults(blog_tags: &[String]) -> Self {
        let mut registry = Self::new();
        registry.register("txt", Arc::new(PlainTextExtractor));
        registry.register("md", Arc::new(MarkdownExtractor));
        let html: Arc<dyn TextExtractor> = Arc::new(HtmlExtractor);
        registry.register("html", html.clone());
        registry.register("htm", html);
        registry.register("xml", Arc::new(WordPressExtractor));
        registry.register("xml", Arc::new(BloggerExtractor::new(blog_tags.to_vec())));
        registry.register("docx", Arc::new(DocxExtractor));
        registry.register("epub", Arc::new(EpubExtractor));
        registry.register("rtf", Arc::new(RtfExtractor));
        registry.register("pdf", Arc::new(PdfExtractor));
        registry.register("djvu", Arc::new(DjvuExtractor));
        registry.register("mobi", Arc::new(MobiExtractor));
        registry
    }

    /// Add an extractor for `extension` after any already registered.
    pub fn register(&mut self, extension: &str, extractor: Arc<dyn TextExtractor>) {
        self.by_extension
            .entry(extension.trim_start_matches('.').to_lowercase())
            .or_default()
            .push(extractor);
    }

    pub fn supports_extension(&self, extension: &str) -> bool {
        self.by_extension
            .contains_key(&extension.trim_start_matches('.').to_lowercase())
    }

    pub fn extensions(&self) -> Vec<&str> {
        let mut exts: Vec<&str> = self.by_extension.keys().map(String::as_str).collect();
        exts.sort_unstable();
        exts
    }

    /// Extract `path`. `Ok(None)` when no extractor handles it.
    pub fn extract(&self, path: &Path) -> Result<Option<Extraction>> {
        let Some(ext) = extension_of(path) else {
            debug!("[skip] no extension: {}", path.display());
            return Ok(None);
        };
        let Some(candidates) = self.by_extension.get(&ext) else {
            debug!("[skip] unsupported extension .{ext}: {}", path.display());
            return Ok(None);
        };
        let Some(extractor) = candidates.iter().find(|e| e.accepts(path)) else {
            info!("[skip] .{ext} file not recognized by any extractor: {}", path.display());
            return Ok(None);
        };

        let segments = catch_panic(path, extractor.name(), || extractor.extract(path))?;
        debug!(
            extractor = extractor.name(),
            segments = segments.len(),
            "Extracted {}",
            path.display()
        );
        Ok(Some(Extraction {
            extractor: extractor.name(),
            segments,
            plain_text: extractor.is_plain_text(),
        }))
    }
}

/// Run `f`, turning a panic inside a parser into an extraction error for `path`.
pub(crate) fn catch_panic<T>(path: &Path, what: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(Error::extraction(
            path.display(),
            format!("{what} parser panicked: {}", panic_message(payload.as_ref())),
        ))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause")
}

/// Lowercase extension without the dot.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    impl TextExtractor for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn accepts(&self, path: &Path) -> bool {
            path.to_string_lossy().contains(self.0)
        }

        fn extract(&self, _path: &Path) -> Result<Vec<String>> {
            Ok(vec![format!("from {}", self.0), "  ".into(), "tail".into()])
        }
    }

    struct Exploding;

    impl TextExtractor for Exploding {
        fn name(&self) -> &'static str {
            "exploding"
        }

        fn extract(&self, _path: &Path) -> Result<Vec<String>> {
            panic!("bad xref table");
        }
    }

    #[test]
    fn test_panicking_extractor_becomes_extraction_error() {
        let mut registry = ExtractorRegistry::new();
        registry.register("bin", Arc::new(Exploding));

        match registry.extract(Path::new("/tmp/blob.bin")) {
            Err(Error::Extraction { reason, .. }) => {
                assert_eq!(reason, "exploding parser panicked: bad xref table")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_extension_is_unsupported() {
        let registry = ExtractorRegistry::with_defaults(&[]);
        assert!(registry.extract(Path::new("/tmp/photo.jpg")).unwrap().is_none());
        assert!(registry.extract(Path::new("/tmp/README")).unwrap().is_none());
        assert!(registry.supports_extension(".PDF"));
        assert!(!registry.supports_extension("chm"));
    }

    #[test]
    fn test_first_accepting_extractor_wins() {
        let mut registry = ExtractorRegistry::new();
        registry.register("dat", Arc::new(Fixed("alpha")));
        registry.register(".DAT", Arc::new(Fixed("beta")));

        let got = registry.extract(Path::new("beta.dat")).unwrap().unwrap();
        assert_eq!(got.text(), "from beta\n\ntail");
        assert!(!got.plain_text);
        assert!(registry.extract(Path::new("gamma.dat")).unwrap().is_none());
        assert_eq!(registry.extensions(), vec!["dat"]);
    }

    #[test]
    fn test_plain_text_flag_and_uppercase_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("NOTES.TXT");
        std::fs::write(&path, "hello\n").unwrap();

        let got = ExtractorRegistry::with_defaults(&[])
            .extract(&path)
            .unwrap()
            .unwrap();
        assert!(got.plain_text);
        assert_eq!(got.extractor, "text");
        assert_eq!(got.text(), "hello");
    }

    #[test]
    fn test_unrecognized_xml_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.xml");
        std::fs::write(&path, "<settings><a>1</a></settings>").unwrap();
        let registry = ExtractorRegistry::with_defaults(&[]);
        assert!(registry.extract(&path).unwrap().is_none());
    }
}
