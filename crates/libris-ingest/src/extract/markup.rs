use std::io::Cursor;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use libris_core::Result;

use super::text::decode_text;
use super::TextExtractor;
use crate::encoding;

/// Wide enough that html2text never hard-wraps a paragraph.
const RENDER_WIDTH: usize = 10_000;

static EXTRA_BLANKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

pub struct HtmlExtractor;

impl TextExtractor for HtmlExtractor {
    fn name(&self) -> &'static str {
        "html"
    }

    fn extract(&self, path: &Path) -> Result<Vec<String>> {
        let bytes = std::fs::read(path)?;
        Ok(vec![html_to_text(&decode_text(&bytes)?)])
    }
}

/// Visible text of an HTML fragment or page. Blocks are separated by a
/// blank line; entities are decoded and soft hyphens dropped.
pub fn html_to_text(html: &str) -> String {
    let rendered = html2text::config::plain_no_decorate()
        .string_from_read(Cursor::new(html.as_bytes()), RENDER_WIDTH)
        .unwrap_or_else(|e| {
            debug!("html2text failed, keeping markup: {e}");
            html.to_string()
        });
    let lines: Vec<&str> = rendered.lines().map(str::trim).collect();
    EXTRA_BLANKS
        .replace_all(&lines.join("\n").replace('\u{AD}', ""), "\n\n")
        .trim()
        .to_string()
}

pub struct RtfExtractor;

impl TextExtractor for RtfExtractor {
    fn name(&self) -> &'static str {
        "rtf"
    }

    fn extract(&self, path: &Path) -> Result<Vec<String>> {
        let bytes = std::fs::read(path)?;
        // RTF is 7-bit; anything else is escaped inside the document.
        let source = String::from_utf8_lossy(&bytes);
        Ok(vec![rtf_to_text(&source)])
    }
}

/// Destinations whose content is never visible text.
const RTF_HIDDEN: &[&str] = &[
    "fonttbl",
    "colortbl",
    "stylesheet",
    "info",
    "pict",
    "header",
    "footer",
    "object",
    "themedata",
    "datastore",
    "xmlnstbl",
    "listtable",
    "listoverridetable",
    "rsidtbl",
    "generator",
    "latentstyles",
    "mmathPr",
    "filetbl",
    "revtbl",
];

/// Strip RTF control words and groups, keeping the document text.
pub fn rtf_to_text(rtf: &str) -> String {
    let chars: Vec<char> = rtf.chars().collect();
    let mut out = String::new();
    // One entry per open group: whether its content is hidden.
    let mut hidden_stack: Vec<bool> = Vec::new();
    let mut hidden = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '{' => {
                hidden_stack.push(hidden);
                i += 1;
            }
            '}' => {
                hidden = hidden_stack.pop().unwrap_or(false);
                i += 1;
            }
            '\r' | '\n' => i += 1,
            '\\' => {
                let Some(&next) = chars.get(i + 1) else { break };
                match next {
                    '\\' | '{' | '}' => {
                        if !hidden {
                            out.push(next);
                        }
                        i += 2;
                    }
                    '*' => {
                        hidden = true;
                        i += 2;
                    }
                    '~' => {
                        if !hidden {
                            out.push(' ');
                        }
                        i += 2;
                    }
                    '_' => {
                        if !hidden {
                            out.push('-');
                        }
                        i += 2;
                    }
                    '\'' => {
                        let hex: String = chars.iter().skip(i + 2).take(2).collect();
                        if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                            if !hidden {
                                out.push(encoding::decode_byte(byte));
                            }
                        }
                        i += 2 + hex.chars().count();
                    }
                    '\r' | '\n' => {
                        if !hidden {
                            out.push('\n');
                        }
                        i += 2;
                    }
                    n if n.is_ascii_alphabetic() => {
                        let (word, param, consumed) = read_control_word(&chars[i + 1..]);
                        i += 1 + consumed;
                        if RTF_HIDDEN.contains(&word.as_str()) {
                            hidden = true;
                            continue;
                        }
                        if hidden {
                            continue;
                        }
                        match word.as_str() {
                            "par" | "line" | "sect" | "page" => out.push('\n'),
                            "tab" | "cell" => out.push('\t'),
                            "row" => out.push('\n'),
                            "emdash" => out.push('\u{2014}'),
                            "endash" => out.push('\u{2013}'),
                            "lquote" => out.push('\u{2018}'),
                            "rquote" => out.push('\u{2019}'),
                            "ldblquote" => out.push('\u{201C}'),
                            "rdblquote" => out.push('\u{201D}'),
                            "bullet" => out.push('\u{2022}'),
                            "u" => {
                                if let Some(code) = param {
                                    let code = if code < 0 { code + 65536 } else { code };
                                    if let Some(ch) = u32::try_from(code).ok().and_then(char::from_u32) {
                                        out.push(ch);
                                    }
                                }
                                i += unicode_fallback_len(&chars[i..]);
                            }
                            _ => {}
                        }
                    }
                    _ => i += 2,
                }
            }
            _ => {
                if !hidden {
                    out.push(c);
                }
                i += 1;
            }
        }
    }

    out.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Parse `word[-]digits[ ]` from just after the backslash. Returns the
/// word, its numeric parameter and the characters consumed.
fn read_control_word(chars: &[char]) -> (String, Option<i64>, usize) {
    let mut n = 0;
    let mut word = String::new();
    while n < chars.len() && chars[n].is_ascii_alphabetic() {
        word.push(chars[n]);
        n += 1;
    }
    let mut digits = String::new();
    if n < chars.len() && chars[n] == '-' {
        digits.push('-');
        n += 1;
    }
    while n < chars.len() && chars[n].is_ascii_digit() {
        digits.push(chars[n]);
        n += 1;
    }
    let param = digits.parse::<i64>().ok();
    if n < chars.len() && chars[n] == ' ' {
        n += 1;
    }
    (word, param, n)
}

/// Length of the single fallback character that follows `\uN`.
fn unicode_fallback_len(rest: &[char]) -> usize {
    match rest {
        ['\\', '\'', _, _, ..] => 4,
        ['\\' | '{' | '}', ..] | [] => 0,
        _ => 1,
    }
}
