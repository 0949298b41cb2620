//! Zip-packaged documents: DOCX and EPUB.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::ZipArchive;

use libris_core::{Error, Result};

use super::markup::html_to_text;
use super::TextExtractor;

/// Maximum decompressed bytes read from a single zip entry.
const MAX_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

fn open_archive(path: &Path) -> Result<ZipArchive<BufReader<File>>> {
    let file = File::open(path)?;
    ZipArchive::new(BufReader::new(file)).map_err(|e| Error::extraction(path.display(), e))
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
    path: &Path,
) -> Result<Vec<u8>> {
    let entry = archive
        .by_name(name)
        .map_err(|e| Error::extraction(path.display(), format!("{name}: {e}")))?;
    let mut out = Vec::new();
    entry.take(MAX_ENTRY_BYTES).read_to_end(&mut out)?;
    if out.len() as u64 >= MAX_ENTRY_BYTES {
        return Err(Error::extraction(
            path.display(),
            format!("zip entry {name} exceeds size limit ({MAX_ENTRY_BYTES} bytes)"),
        ));
    }
    Ok(out)
}

pub struct DocxExtractor;

impl TextExtractor for DocxExtractor {
    fn name(&self) -> &'static str {
        "docx"
    }

    fn extract(&self, path: &Path) -> Result<Vec<String>> {
        let mut archive = open_archive(path)?;
        let xml = read_entry(&mut archive, "word/document.xml", path)?;
        Ok(vec![docx_paragraphs(&xml, path)?])
    }
}

/// Text of `w:t` runs, one line per `w:p` paragraph.
fn docx_paragraphs(xml: &[u8], path: &Path) -> Result<String> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_text = false;
    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::extraction(path.display(), e))?;
        match event {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_text = true,
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => out.push('\t'),
                b"br" => out.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => {
                let text = t.unescape().map_err(|e| Error::extraction(path.display(), e))?;
                out.push_str(&text);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim().to_string())
}

pub struct EpubExtractor;

impl TextExtractor for EpubExtractor {
    fn name(&self) -> &'static str {
        "epub"
    }

    /// One segment per spine document, in reading order.
    fn extract(&self, path: &Path) -> Result<Vec<String>> {
        let mut archive = open_archive(path)?;
        let spine = match spine_documents(&mut archive, path) {
            Ok(spine) if !spine.is_empty() => spine,
            // No usable package document: fall back to every XHTML entry by name.
            _ => {
                let mut names: Vec<String> = archive
                    .file_names()
                    .filter(|n| {
                        let lower = n.to_lowercase();
                        lower.ends_with(".xhtml") || lower.ends_with(".html") || lower.ends_with(".htm")
                    })
                    .map(str::to_string)
                    .collect();
                names.sort();
                names
            }
        };

        let mut segments = Vec::with_capacity(spine.len());
        for name in spine {
            let bytes = read_entry(&mut archive, &name, path)?;
            let text = html_to_text(&String::from_utf8_lossy(&bytes));
            if !text.is_empty() {
                segments.push(text);
            }
        }
        Ok(segments)
    }
}

/// Resolve META-INF/container.xml → OPF → spine hrefs (archive paths).
fn spine_documents<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &Path) -> Result<Vec<String>> {
    let container = read_entry(archive, "META-INF/container.xml", path)?;
    let opf_path = first_attribute(&container, b"rootfile", b"full-path")
        .ok_or_else(|| Error::extraction(path.display(), "container.xml has no rootfile"))?;
    let opf = read_entry(archive, &opf_path, path)?;
    let base = match opf_path.rfind('/') {
        Some(i) => &opf_path[..=i],
        None => "",
    };

    let mut manifest: HashMap<String, String> = HashMap::new();
    let mut spine = Vec::new();
    let mut reader = Reader::from_reader(opf.as_slice());
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let attrs: HashMap<Vec<u8>, String> = e
                    .attributes()
                    .flatten()
                    .map(|a| (a.key.as_ref().to_vec(), String::from_utf8_lossy(&a.value).into_owned()))
                    .collect();
                match e.local_name().as_ref() {
                    b"item" => {
                        if let (Some(id), Some(href)) = (attrs.get(&b"id"[..]), attrs.get(&b"href"[..])) {
                            manifest.insert(id.clone(), format!("{base}{href}"));
                        }
                    }
                    b"itemref" => {
                        if let Some(idref) = attrs.get(&b"idref"[..]) {
                            spine.push(idref.clone());
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::extraction(path.display(), e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(spine
        .iter()
        .filter_map(|id| manifest.get(id).cloned())
        .collect())
}

fn first_attribute(xml: &[u8], element: &[u8], attribute: &[u8]) -> Option<String> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == element => {
                return e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.as_ref() == attribute)
                    .map(|a| String::from_utf8_lossy(&a.value).into_owned());
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn zip_file(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, body) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_docx_paragraphs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.docx");
        zip_file(
            &path,
            &[(
                "word/document.xml",
                r#"<w:document xmlns:w="x"><w:body>
<w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:t xml:space="preserve"> world &amp; co</w:t></w:r></w:p>
<w:p><w:r><w:t>Second</w:t><w:tab/><w:t>para</w:t></w:r></w:p>
</w:body></w:document>"#,
            )],
        );
        assert_eq!(
            DocxExtractor.extract(&path).unwrap(),
            vec!["Hello world & co\nSecond\tpara".to_string()]
        );
    }

    #[test]
    fn test_docx_not_a_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.docx");
        std::fs::write(&path, "not a zip").unwrap();
        assert!(matches!(
            DocxExtractor.extract(&path),
            Err(Error::Extraction { .. })
        ));
    }

    #[test]
    fn test_epub_follows_spine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        zip_file(
            &path,
            &[
                ("mimetype", "application/epub+zip"),
                (
                    "META-INF/container.xml",
                    r#"<container><rootfiles><rootfile full-path="OEBPS/content.opf"/></rootfiles></container>"#,
                ),
                (
                    "OEBPS/content.opf",
                    r#"<package><manifest>
<item id="c1" href="one.xhtml"/><item id="c2" href="two.xhtml"/>
</manifest><spine><itemref idref="c2"/><itemref idref="c1"/></spine></package>"#,
                ),
                ("OEBPS/one.xhtml", "<html><body><p>Chapter one.</p></body></html>"),
                ("OEBPS/two.xhtml", "<html><body><p>Chapter two.</p></body></html>"),
            ],
        );
        assert_eq!(
            EpubExtractor.extract(&path).unwrap(),
            vec!["Chapter two.".to_string(), "Chapter one.".to_string()]
        );
    }

    #[test]
    fn test_epub_without_container_uses_entry_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loose.epub");
        zip_file(
            &path,
            &[
                ("b.xhtml", "<p>Beta</p>"),
                ("a.xhtml", "<p>Alpha</p>"),
                ("style.css", "p {}"),
            ],
        );
        assert_eq!(
            EpubExtractor.extract(&path).unwrap(),
            vec!["Alpha".to_string(), "Beta".to_string()]
        );
    }
}
