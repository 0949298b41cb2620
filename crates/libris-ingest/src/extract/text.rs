use std::path::Path;

use libris_core::{Error, Result};

use super::TextExtractor;
use crate::encoding;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

/// `.txt` files. Plain text bypasses layout cleanup.
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn name(&self) -> &'static str {
        "text"
    }

    fn extract(&self, path: &Path) -> Result<Vec<String>> {
        let bytes = std::fs::read(path)?;
        let text = decode_text(&bytes).map_err(|_| Error::Decode(path.display().to_string()))?;
        Ok(vec![text])
    }

    fn is_plain_text(&self) -> bool {
        true
    }
}

/// `.md` files, read as text but cleaned like formatted sources.
pub struct MarkdownExtractor;

impl TextExtractor for MarkdownExtractor {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn extract(&self, path: &Path) -> Result<Vec<String>> {
        let bytes = std::fs::read(path)?;
        let text = decode_text(&bytes).map_err(|_| Error::Decode(path.display().to_string()))?;
        Ok(vec![strip_markdown(&text)])
    }
}

/// Decode file bytes: UTF-8 (optional BOM), then UTF-16 with a BOM, then
/// Windows-1252. Binary-looking input is a `Decode` error.
pub fn decode_text(bytes: &[u8]) -> Result<String> {
    if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
        return std::str::from_utf8(rest)
            .map(str::to_string)
            .map_err(|e| Error::Decode(format!("invalid UTF-8 after BOM: {e}")));
    }
    if let Some(rest) = bytes.strip_prefix(UTF16_LE_BOM) {
        return decode_utf16(rest, u16::from_le_bytes);
    }
    if let Some(rest) = bytes.strip_prefix(UTF16_BE_BOM) {
        return decode_utf16(rest, u16::from_be_bytes);
    }
    if looks_binary(bytes) {
        return Err(Error::Decode("binary content".into()));
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(s.to_string()),
        Err(_) => Ok(encoding::decode(bytes)),
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(Error::Decode("odd UTF-16 byte count".into()));
    }
    let units: Vec<u16> = bytes.chunks_exact(2).map(|p| unit([p[0], p[1]])).collect();
    String::from_utf16(&units).map_err(|e| Error::Decode(format!("invalid UTF-16: {e}")))
}

/// NUL bytes, or more than one control byte in ten.
fn looks_binary(bytes: &[u8]) -> bool {
    if bytes.contains(&0) {
        return true;
    }
    let control = bytes
        .iter()
        .filter(|&&b| b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0C))
        .count();
    control * 10 > bytes.len()
}

/// Drop the markup that would otherwise leak into chunks: heading
/// markers, emphasis, code fences and link targets.
fn strip_markdown(text: &str) -> String {
    let mut out = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            continue;
        }
        let line = trimmed.trim_start_matches('#').trim_start();
        let line = line
            .strip_prefix("> ")
            .or_else(|| line.strip_prefix("- "))
            .or_else(|| line.strip_prefix("* "))
            .unwrap_or(line);
        out.push(strip_links(line).replace("**", "").replace("__", ""));
    }
    out.join("\n")
}

/// `[label](target)` → `label`.
fn strip_links(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(open) = rest.find('[') {
        let Some(close) = rest[open..].find("](").map(|i| open + i) else {
            break;
        };
        let Some(end) = rest[close..].find(')').map(|i| close + i) else {
            break;
        };
        out.push_str(&rest[..open]);
        out.push_str(&rest[open + 1..close]);
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
}
