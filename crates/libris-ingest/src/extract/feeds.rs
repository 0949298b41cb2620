//! Blog exports: WordPress WXR (`<rss>` with the wordpress.org/export
//! namespace) and Blogger Atom (`<feed>` from blogger.com). Each post
//! becomes one segment: title, date, blank line, body.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use libris_core::{Error, Result};

use super::markup::html_to_text;
use super::TextExtractor;

/// Bytes read when deciding which exporter produced a file.
const SNIFF_BYTES: u64 = 64 * 1024;
const WORDPRESS_NAMESPACE: &str = "wordpress.org/export";
const BLOGGER_MARKERS: [&str; 2] = ["schemas.google.com/blogger", "www.blogger.com"];
const POST_KIND_SUFFIX: &str = "#post";

struct Root {
    local_name: String,
    attr_values: Vec<String>,
    head: String,
}

fn sniff_root(path: &Path) -> Option<Root> {
    let mut head = Vec::new();
    File::open(path)
        .ok()?
        .take(SNIFF_BYTES)
        .read_to_end(&mut head)
        .ok()?;

    let mut reader = Reader::from_reader(head.as_slice());
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Some(Root {
                    local_name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                    attr_values: e
                        .attributes()
                        .flatten()
                        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
                        .collect(),
                    head: String::from_utf8_lossy(&head).to_lowercase(),
                });
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

#[derive(Default)]
struct Post {
    title: String,
    published: String,
    body: String,
    tags: Vec<String>,
}

impl Post {
    fn render(&self) -> Option<String> {
        let text = format!(
            "{}\n{}\n\n{}",
            self.title.trim(),
            self.published.trim(),
            html_to_text(&self.body)
        );
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

#[derive(Clone, Copy)]
enum Field {
    Title,
    Published,
    Body,
}

/// Walk `path` collecting the direct `title`/date/body children of each
/// `entry` element. `field_of` maps a child's qualified name to a field.
fn read_posts(
    path: &Path,
    entry: &[u8],
    field_of: fn(&[u8]) -> Option<Field>,
    on_child: fn(&BytesStart, &mut Post),
) -> Result<Vec<Post>> {
    let bytes = std::fs::read(path)?;
    let mut reader = Reader::from_reader(bytes.as_slice());
    let mut buf = Vec::new();

    let mut posts = Vec::new();
    let mut current: Option<Post> = None;
    // Depth relative to the open entry element.
    let mut depth = 0usize;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if let Some(post) = current.as_mut() {
                    depth += 1;
                    if depth == 1 {
                        on_child(&e, post);
                        field = field_of(e.name().as_ref());
                    }
                } else if e.name().as_ref() == entry {
                    current = Some(Post::default());
                    depth = 0;
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(post) = current.as_mut() {
                    if depth == 0 {
                        on_child(&e, post);
                    }
                }
            }
            Ok(Event::End(_)) => {
                if current.is_some() {
                    if depth == 0 {
                        posts.extend(current.take());
                    } else {
                        depth -= 1;
                        if depth == 0 {
                            field = None;
                        }
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(post), Some(f), 1) = (current.as_mut(), field, depth) {
                    let text = t.unescape().map_err(|e| Error::extraction(path.display(), e))?;
                    push_field(post, f, &text);
                }
            }
            Ok(Event::CData(c)) => {
                if let (Some(post), Some(f), 1) = (current.as_mut(), field, depth) {
                    push_field(post, f, &String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::extraction(path.display(), e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(posts)
}

fn push_field(post: &mut Post, field: Field, text: &str) {
    let target = match field {
        Field::Title => &mut post.title,
        Field::Published => &mut post.published,
        Field::Body => &mut post.body,
    };
    target.push_str(text);
}

pub struct WordPressExtractor;

impl TextExtractor for WordPressExtractor {
    fn name(&self) -> &'static str {
        "wordpress"
    }

    fn accepts(&self, path: &Path) -> bool {
        sniff_root(path).is_some_and(|root| {
            root.local_name == "rss"
                && root.attr_values.iter().any(|v| v.contains(WORDPRESS_NAMESPACE))
        })
    }

    fn extract(&self, path: &Path) -> Result<Vec<String>> {
        let posts = read_posts(
            path,
            b"item",
            |name| match name {
                b"title" => Some(Field::Title),
                b"pubDate" => Some(Field::Published),
                b"content:encoded" => Some(Field::Body),
                _ => None,
            },
            |_, _| {},
        )?;
        debug!("WordPress export {}: {} items", path.display(), posts.len());
        Ok(posts.iter().filter_map(Post::render).collect())
    }
}

/// Blogger Atom export. Only entries of kind `#post` are kept; a non-empty
/// tag filter further requires one matching category (case-insensitive).
pub struct BloggerExtractor {
    tags_filter: HashSet<String>,
}

impl BloggerExtractor {
    pub fn new(tags: Vec<String>) -> Self {
        Self {
            tags_filter: tags
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    fn keeps(&self, post: &Post) -> bool {
        if !post.tags.iter().any(|t| t.ends_with(POST_KIND_SUFFIX)) {
            return false;
        }
        self.tags_filter.is_empty()
            || post
                .tags
                .iter()
                .any(|t| self.tags_filter.contains(&t.trim().to_lowercase()))
    }
}

impl TextExtractor for BloggerExtractor {
    fn name(&self) -> &'static str {
        "blogger"
    }

    fn accepts(&self, path: &Path) -> bool {
        sniff_root(path).is_some_and(|root| {
            root.local_name == "feed" && BLOGGER_MARKERS.iter().any(|m| root.head.contains(m))
        })
    }

    fn extract(&self, path: &Path) -> Result<Vec<String>> {
        let posts = read_posts(
            path,
            b"entry",
            |name| match name {
                b"title" => Some(Field::Title),
                b"published" => Some(Field::Published),
                b"content" => Some(Field::Body),
                _ => None,
            },
            |child, post| {
                if child.local_name().as_ref() == b"category" {
                    let term = child
                        .attributes()
                        .flatten()
                        .find(|a| a.key.as_ref() == b"term")
                        .map(|a| String::from_utf8_lossy(&a.value).into_owned());
                    post.tags.extend(term.filter(|t| !t.is_empty()));
                }
            },
        )?;
        let total = posts.len();
        let kept: Vec<String> = posts
            .iter()
            .filter(|p| self.keeps(p))
            .filter_map(Post::render)
            .collect();
        debug!("Blogger export {}: kept {} of {} entries", path.display(), kept.len(), total);
        Ok(kept)
    }
}
