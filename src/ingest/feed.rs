// src/ingest/feed.rs
//! RSS 2.0 / RSS 1.0 (RDF) / Atom parsing and the HTTP feed fetcher.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use reqwest::header::ACCEPT;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::config::Settings;
use crate::error::{EntryParseError, FetchError};
use crate::ingest::types::{FeedEntry, FeedFetcher};
use crate::ingest::{normalize_text, truncate_chars};
use crate::model::Source;

pub const SUMMARY_MAX_CHARS: usize = 1000;

const FEED_ACCEPT: &str =
    "application/rss+xml, application/atom+xml, application/rdf+xml, application/xml;q=0.9, text/xml;q=0.8, */*;q=0.5";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    Rss,
    Rdf,
    Atom,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFeed {
    pub kind: FeedKind,
    pub entries: Vec<FeedEntry>,
    /// Entries dropped for a missing title or a non-http link.
    pub skipped: usize,
}

/* ----------------------------
Parser
---------------------------- */

#[derive(Debug, Default)]
struct EntryBuilder {
    title: String,
    link: Option<String>,
    fallback_link: Option<String>,
    summary: String,
    content: String,
    author: String,
    media_content: Option<String>,
    media_thumbnail: Option<String>,
    enclosure_image: Option<String>,
    published: String,
    updated: String,
}

impl EntryBuilder {
    fn push_text(&mut self, element: &str, parent: Option<&str>, text: &str) {
        let slot = match element {
            "title" => &mut self.title,
            "description" | "summary" => &mut self.summary,
            "content:encoded" | "content" => &mut self.content,
            "author" | "dc:creator" => &mut self.author,
            "name" if parent == Some("author") => &mut self.author,
            "pubDate" | "published" | "dc:date" => &mut self.published,
            "updated" => &mut self.updated,
            "link" => {
                let link = self.link.get_or_insert_with(String::new);
                link.push_str(text);
                return;
            }
            "guid" | "id" => {
                if self.fallback_link.is_none() && text.trim().starts_with("http") {
                    self.fallback_link = Some(text.trim().to_string());
                }
                return;
            }
            _ => return,
        };
        slot.push_str(text);
    }

    fn take_attributes(&mut self, e: &BytesStart<'_>) {
        let name = qname(e);
        match name.as_str() {
            "item" | "entry" => {
                if let Some(about) = attr(e, "rdf:about") {
                    self.fallback_link = Some(about);
                }
            }
            // Atom: <link href=".." rel="alternate|enclosure" type=".."/>
            "link" => {
                let Some(href) = attr(e, "href") else { return };
                match attr(e, "rel").as_deref() {
                    None | Some("alternate") => {
                        if self.link.as_deref().is_none_or(|l| l.trim().is_empty()) {
                            self.link = Some(href);
                        }
                    }
                    Some("enclosure") if is_image_type(attr(e, "type").as_deref()) => {
                        self.enclosure_image.get_or_insert(href);
                    }
                    _ => {}
                }
            }
            "media:content" => {
                let medium = attr(e, "medium");
                let kind = attr(e, "type");
                let image = match (medium.as_deref(), kind.as_deref()) {
                    (Some(m), _) => m == "image",
                    (None, Some(t)) => t.starts_with("image/"),
                    (None, None) => true,
                };
                if let (true, Some(url)) = (image, attr(e, "url")) {
                    self.media_content.get_or_insert(url);
                }
            }
            "media:thumbnail" => {
                if let Some(url) = attr(e, "url") {
                    self.media_thumbnail.get_or_insert(url);
                }
            }
            "enclosure" => {
                if is_image_type(attr(e, "type").as_deref()) {
                    if let Some(url) = attr(e, "url") {
                        self.enclosure_image.get_or_insert(url);
                    }
                }
            }
            _ => {}
        }
    }

    /// Validate into a `FeedEntry`.
    fn build(self, now: DateTime<Utc>) -> Result<FeedEntry, EntryParseError> {
        let title = normalize_text(&self.title);
        if title.is_empty() {
            return Err(EntryParseError::MissingTitle);
        }

        let raw_link = self
            .link
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .or(self.fallback_link)
            .ok_or(EntryParseError::MissingLink)?;
        let parsed = match url::Url::parse(&raw_link) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => u,
            _ => return Err(EntryParseError::BadLink(raw_link)),
        };

        let body = if self.summary.trim().is_empty() {
            &self.content
        } else {
            &self.summary
        };
        let date_raw = if self.published.trim().is_empty() {
            &self.updated
        } else {
            &self.published
        };

        Ok(FeedEntry {
            title,
            url: parsed.to_string(),
            summary: truncate_chars(&normalize_text(body), SUMMARY_MAX_CHARS),
            author: normalize_text(&self.author),
            image_url: self
                .media_content
                .or(self.media_thumbnail)
                .or(self.enclosure_image),
            published_at: parse_date(date_raw).unwrap_or(now),
        })
    }
}

fn qname(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn attr(e: &BytesStart<'_>, key: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key.as_bytes())
        .map(|a| match a.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&a.value).into_owned(),
        })
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_image_type(t: Option<&str>) -> bool {
    t.is_some_and(|t| t.to_ascii_lowercase().starts_with("image/"))
}

fn is_entry(name: &str) -> bool {
    matches!(name, "item" | "entry")
}

/// RFC 2822 (RSS) or RFC 3339 (Atom, dc:date).
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(odt) = OffsetDateTime::parse(s, &Rfc2822).or_else(|_| OffsetDateTime::parse(s, &Rfc3339)) {
        return DateTime::from_timestamp(odt.unix_timestamp(), odt.nanosecond());
    }
    // chrono is more lenient with obsolete zone names ("EST", "UT")
    DateTime::parse_from_rfc2822(s)
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Parse a feed document. Only the first `max_entries` entries are considered.
pub fn parse_feed(xml: &[u8], max_entries: usize, now: DateTime<Utc>) -> Result<ParsedFeed, FetchError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut kind: Option<FeedKind> = None;
    let mut stack: Vec<String> = Vec::new();
    let mut current: Option<(usize, EntryBuilder)> = None;
    let mut seen = 0usize;
    let mut entries = Vec::new();
    let mut skipped = 0usize;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| FetchError::Parse(format!("XML parse error: {e}")))?;
        match event {
            Event::Start(e) => {
                let name = qname(&e);
                if kind.is_none() {
                    kind = Some(root_kind(&name)?);
                }
                if current.is_none() && is_entry(&name) {
                    let mut b = EntryBuilder::default();
                    b.take_attributes(&e);
                    current = Some((stack.len(), b));
                } else if let Some((_, b)) = current.as_mut() {
                    b.take_attributes(&e);
                }
                stack.push(name);
            }
            Event::Empty(e) => {
                if kind.is_none() {
                    return Err(FetchError::Parse("empty feed document".into()));
                }
                if let Some((_, b)) = current.as_mut() {
                    b.take_attributes(&e);
                }
            }
            Event::Text(e) => {
                if let Some((depth, b)) = current.as_mut() {
                    let text = match e.unescape() {
                        Ok(t) => t.into_owned(),
                        // unknown HTML entities (&nbsp;) are decoded later
                        Err(_) => String::from_utf8_lossy(&e).into_owned(),
                    };
                    route_text(&stack, *depth, b, &text);
                }
            }
            Event::CData(e) => {
                if let Some((depth, b)) = current.as_mut() {
                    let text = String::from_utf8_lossy(&e).into_owned();
                    route_text(&stack, *depth, b, &text);
                }
            }
            Event::End(_) => {
                let closed = stack.pop();
                let finished = matches!(&current, Some((depth, _)) if *depth == stack.len());
                if finished && closed.as_deref().is_some_and(is_entry) {
                    if let Some((_, b)) = current.take() {
                        seen += 1;
                        match b.build(now) {
                            Ok(entry) => entries.push(entry),
                            Err(e) => {
                                tracing::trace!(target: "ingest", error = %e, "feed entry skipped");
                                skipped += 1;
                            }
                        }
                        if seen >= max_entries {
                            break;
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let kind = kind.ok_or_else(|| FetchError::Parse("empty feed document".into()))?;
    Ok(ParsedFeed {
        kind,
        entries,
        skipped,
    })
}

fn root_kind(name: &str) -> Result<FeedKind, FetchError> {
    match name {
        "rss" => Ok(FeedKind::Rss),
        "feed" => Ok(FeedKind::Atom),
        n if n == "RDF" || n.ends_with(":RDF") => Ok(FeedKind::Rdf),
        other => Err(FetchError::Parse(format!("unrecognized feed root <{other}>"))),
    }
}

/// Text belongs to the innermost open element, ignoring nested Atom `<source>` blocks.
fn route_text(stack: &[String], entry_depth: usize, b: &mut EntryBuilder, text: &str) {
    let inner = stack.get(entry_depth + 1..).unwrap_or_default();
    if inner.iter().any(|n| n == "source") {
        return;
    }
    if let Some(element) = inner.last() {
        let parent = inner.len().checked_sub(2).and_then(|i| inner.get(i));
        b.push_text(element, parent.map(String::as_str), text);
    }
}

/* ----------------------------
HTTP fetcher
---------------------------- */

pub struct HttpFeedFetcher {
    client: reqwest::Client,
    max_entries: usize,
}

impl HttpFeedFetcher {
    pub fn new(settings: &Settings) -> Result<Self, FetchError> {
        Ok(Self::with_client(settings.http_client()?, settings.ingest_max_entries))
    }

    pub fn with_client(client: reqwest::Client, max_entries: usize) -> Self {
        Self {
            client,
            max_entries: max_entries.max(1),
        }
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<FeedEntry>, FetchError> {
        let resp = self
            .client
            .get(&source.url)
            .header(ACCEPT, FEED_ACCEPT)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }
        let body = resp.bytes().await?;

        let t0 = std::time::Instant::now();
        let parsed = parse_feed(&body, self.max_entries, Utc::now())?;
        histogram!("curation_ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        if parsed.skipped > 0 {
            counter!("curation_ingest_entries_skipped_total").increment(parsed.skipped as u64);
            tracing::debug!(
                target: "ingest",
                source = %source.name,
                skipped = parsed.skipped,
                "malformed feed entries skipped"
            );
        }
        tracing::debug!(
            target: "ingest",
            source = %source.name,
            kind = ?parsed.kind,
            entries = parsed.entries.len(),
            "feed parsed"
        );
        Ok(parsed.entries)
    }
}
