//! Formats that need a parser crate or an external converter.

use std::io::ErrorKind;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use tracing::debug;

use libris_core::{Error, Result};

use super::archive::EpubExtractor;
use super::{catch_panic, TextExtractor};

pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    /// One segment per page when the text carries form feeds.
    fn extract(&self, path: &Path) -> Result<Vec<String>> {
        let bytes = std::fs::read(path)?;
        // pdf-extract panics on some malformed documents instead of erroring.
        let text = catch_panic(path, "pdf", || {
            pdf_extract::extract_text_from_mem(&bytes)
                .map_err(|e| Error::extraction(path.display(), e))
        })?;
        Ok(text
            .split('\x0c')
            .map(str::trim)
            .filter(|page| !page.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// DjVu text layer via `djvutxt` (djvulibre).
pub struct DjvuExtractor;

impl TextExtractor for DjvuExtractor {
    fn name(&self) -> &'static str {
        "djvu"
    }

    fn extract(&self, path: &Path) -> Result<Vec<String>> {
        let output = run_tool("djvutxt", &[path.as_os_str()], path)?;
        Ok(vec![String::from_utf8_lossy(&output.stdout).trim().to_string()])
    }
}

/// MOBI via Calibre's `ebook-convert` to a temporary EPUB.
pub struct MobiExtractor;

impl TextExtractor for MobiExtractor {
    fn name(&self) -> &'static str {
        "mobi"
    }

    fn extract(&self, path: &Path) -> Result<Vec<String>> {
        let workdir = tempfile::tempdir()?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("converted");
        let epub = workdir.path().join(format!("{stem}.epub"));
        run_tool("ebook-convert", &[path.as_os_str(), epub.as_os_str()], path)?;
        if !epub.exists() {
            return Err(Error::extraction(
                path.display(),
                format!("conversion produced no EPUB at {}", epub.display()),
            ));
        }
        EpubExtractor.extract(&epub)
    }
}

fn run_tool(program: &str, args: &[&std::ffi::OsStr], path: &Path) -> Result<Output> {
    debug!("Running {program} on {}", path.display());
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::extraction(path.display(), format!("{program} is not installed")),
            _ => Error::extraction(path.display(), format!("{program}: {e}")),
        })?;
    if !output.status.success() {
        return Err(Error::extraction(
            path.display(),
            format!(
                "{program} failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }
    Ok(output)
}
