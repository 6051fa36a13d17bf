//! Article page → plain text.
//!
//! Two passes over the parsed document:
//! 1. *density*: the container holding the most paragraph text wins, provided it
//!    carries at least `min_primary_chars` characters;
//! 2. *structural*: `main`, else `article`, else `body`, with boilerplate
//!    subtrees (navigation, scripts, forms, ...) skipped, one line per block.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::header::ACCEPT;
use scraper::{ElementRef, Html, Node, Selector};

use crate::config::settings::DEFAULT_MAX_PAGE_BYTES;
use crate::config::Settings;
use crate::error::ExtractionError;
use crate::ingest::word_count;

pub const DEFAULT_MIN_PRIMARY_CHARS: usize = 100;

const SKIP_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "aside", "noscript", "form", "iframe",
];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "h1", "h2", "h3", "h4", "h5", "h6", "li", "ul",
    "ol", "br", "tr", "table", "blockquote", "pre", "figure", "figcaption", "dd", "dt",
];

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("static selector `{css}`: {e}"))
}

static SEMANTIC: Lazy<Selector> = Lazy::new(|| selector(r#"article, main, [role="main"]"#));
static BLOCKS: Lazy<Selector> = Lazy::new(|| selector("div, section"));
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| selector("p"));
static MAIN: Lazy<Selector> = Lazy::new(|| selector("main"));
static ARTICLE: Lazy<Selector> = Lazy::new(|| selector("article"));
static BODY: Lazy<Selector> = Lazy::new(|| selector("body"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractMethod {
    Density,
    Structural,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub content: String,
    pub word_count: u32,
    pub method: ExtractMethod,
}

impl Extracted {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn extract(&self, url: &str) -> Result<Extracted, ExtractionError>;
}

pub struct HttpContentExtractor {
    client: reqwest::Client,
    min_primary_chars: usize,
    max_bytes: usize,
}

impl HttpContentExtractor {
    pub fn new(settings: &Settings) -> Result<Self, ExtractionError> {
        Ok(Self::with_client(settings.http_client()?).max_bytes(settings.max_page_bytes))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            min_primary_chars: DEFAULT_MIN_PRIMARY_CHARS,
            max_bytes: DEFAULT_MAX_PAGE_BYTES,
        }
    }

    /// Bytes of the page body read before parsing; the rest is dropped.
    pub fn max_bytes(mut self, n: usize) -> Self {
        self.max_bytes = n.max(1);
        self
    }

    pub fn min_primary_chars(mut self, n: usize) -> Self {
        self.min_primary_chars = n;
        self
    }
}

#[async_trait]
impl ContentFetcher for HttpContentExtractor {
    async fn extract(&self, url: &str) -> Result<Extracted, ExtractionError> {
        let mut resp = self
            .client
            .get(url)
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.5")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ExtractionError::Status {
                status: status.as_u16(),
            });
        }
        if let Some(len) = resp.content_length().filter(|n| *n > self.max_bytes as u64) {
            tracing::debug!(target: "enrich", url, len, cap = self.max_bytes, "page larger than cap, truncating");
        }
        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = resp.chunk().await? {
            let room = self.max_bytes - body.len();
            if chunk.len() >= room {
                body.extend_from_slice(&chunk[..room]);
                break;
            }
            body.extend_from_slice(&chunk);
        }
        let html = String::from_utf8_lossy(&body);
        let out = extract_html(&html, self.min_primary_chars);
        tracing::debug!(
            target: "enrich",
            url,
            method = ?out.method,
            words = out.word_count,
            "article extracted"
        );
        Ok(out)
    }
}

/// Pure extraction over an HTML document.
pub fn extract_html(html: &str, min_primary_chars: usize) -> Extracted {
    let doc = Html::parse_document(html);

    if let Some(text) = density_pass(&doc).filter(|t| t.chars().count() >= min_primary_chars) {
        return finish(text, ExtractMethod::Density);
    }

    let text = structural_pass(&doc);
    if text.is_empty() {
        return finish(String::new(), ExtractMethod::Empty);
    }
    finish(text, ExtractMethod::Structural)
}

fn finish(content: String, method: ExtractMethod) -> Extracted {
    Extracted {
        word_count: word_count(&content),
        content,
        method,
    }
}

fn collapse<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for word in parts.flat_map(str::split_whitespace) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

fn paragraphs<'a>(ps: impl Iterator<Item = ElementRef<'a>>) -> String {
    ps.map(|p| collapse(p.text()))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn in_skipped_subtree(el: ElementRef<'_>) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| SKIP_TAGS.contains(&a.value().name()))
}

/// Semantic containers count every paragraph below them; generic `div`/`section`
/// only their direct `p` children, so wrappers do not win by nesting.
fn density_pass(doc: &Html) -> Option<String> {
    let semantic = doc.select(&SEMANTIC).map(|c| {
        paragraphs(
            c.select(&PARAGRAPH)
                .filter(|p| !in_skipped_subtree(*p)),
        )
    });
    let generic = doc.select(&BLOCKS).filter(|c| !in_skipped_subtree(*c)).map(|c| {
        paragraphs(
            c.children()
                .filter_map(ElementRef::wrap)
                .filter(|e| e.value().name() == "p"),
        )
    });

    semantic
        .chain(generic)
        .filter(|t| !t.is_empty())
        .fold(None, |best: Option<String>, t| match best {
            Some(b) if b.chars().count() >= t.chars().count() => Some(b),
            _ => Some(t),
        })
}

fn structural_pass(doc: &Html) -> String {
    let root = [&*MAIN, &*ARTICLE, &*BODY]
        .into_iter()
        .find_map(|sel| doc.select(sel).next())
        .unwrap_or_else(|| doc.root_element());

    let mut lines = Vec::new();
    let mut line = String::new();
    walk(root, &mut lines, &mut line);
    flush(&mut lines, &mut line);
    lines.join("\n")
}

fn walk(el: ElementRef<'_>, lines: &mut Vec<String>, line: &mut String) {
    for node in el.children() {
        match node.value() {
            Node::Text(t) => {
                line.push(' ');
                line.push_str(t);
            }
            Node::Element(e) => {
                let name = e.name();
                if SKIP_TAGS.contains(&name) {
                    continue;
                }
                let Some(child) = ElementRef::wrap(node) else {
                    continue;
                };
                let block = BLOCK_TAGS.contains(&name);
                if block {
                    flush(lines, line);
                }
                walk(child, lines, line);
                if block {
                    flush(lines, line);
                }
            }
            _ => {}
        }
    }
}

fn flush(lines: &mut Vec<String>, line: &mut String) {
    let text = collapse(std::iter::once(line.as_str()));
    if !text.is_empty() {
        lines.push(text);
    }
    line.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_para(word: &str) -> String {
        format!("<p>{}</p>", format!("{word} ").repeat(30))
    }

    #[test]
    fn density_prefers_the_paragraph_heavy_container() {
        let html = format!(
            r#"<html><body>
<nav><p>Home About Contact</p></nav>
<div class="sidebar"><p>Short teaser</p></div>
<div class="story">{}{}</div>
<footer><p>Copyright</p></footer>
</body></html>"#,
            long_para("juba"),
            long_para("peace")
        );
        let out = extract_html(&html, 100);
        assert_eq!(out.method, ExtractMethod::Density);
        assert!(out.content.starts_with("juba juba"));
        assert!(out.content.contains("\n\npeace"));
        assert!(!out.content.contains("Copyright"));
        assert_eq!(out.word_count, 60);
    }

    #[test]
    fn article_element_counts_nested_paragraphs() {
        let html = format!(
            "<html><body><article><div>{}</div><div>{}</div></article></body></html>",
            long_para("alpha"),
            long_para("beta")
        );
        let out = extract_html(&html, 100);
        assert_eq!(out.method, ExtractMethod::Density);
        assert_eq!(out.word_count, 60);
    }

    #[test]
    fn structural_fallback_skips_boilerplate() {
        let html = r#"<html><head><style>.x{}</style></head><body>
<header>Site header</header>
<main>
  <h1>Wau floods</h1>
  <span>Water levels</span> <span>rose overnight &amp; displaced families.</span>
  <script>var tracking = 1;</script>
  <form><input value="search"/>Search</form>
</main>
<aside>Related</aside>
</body></html>"#;
        let out = extract_html(html, 100);
        assert_eq!(out.method, ExtractMethod::Structural);
        assert_eq!(
            out.content,
            "Wau floods\nWater levels rose overnight & displaced families."
        );
    }

    #[test]
    fn empty_documents_yield_empty_text() {
        let out = extract_html("<html><body><script>x()</script></body></html>", 100);
        assert!(out.is_empty());
        assert_eq!(out.method, ExtractMethod::Empty);
        assert_eq!(out.word_count, 0);
    }
}
