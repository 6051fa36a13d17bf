// src/ingest/mod.rs
pub mod config;
pub mod feed;
pub mod pipeline;
pub mod types;

pub use feed::{parse_feed, HttpFeedFetcher, ParsedFeed};
pub use pipeline::{IngestStats, IngestionPipeline};
pub use types::{FeedEntry, FeedFetcher};

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("curation_ingest_cycles_total", "Completed ingestion cycles.");
        describe_counter!(
            "curation_ingest_entries_total",
            "Feed entries returned by sources."
        );
        describe_counter!(
            "curation_ingest_entries_skipped_total",
            "Malformed feed entries skipped (missing title or link)."
        );
        describe_counter!(
            "curation_ingest_articles_new_total",
            "Articles persisted by ingestion."
        );
        describe_counter!(
            "curation_ingest_duplicates_total",
            "Entries dropped because their URL was already stored."
        );
        describe_counter!(
            "curation_ingest_below_floor_total",
            "Entries dropped below the relevance floor."
        );
        describe_counter!(
            "curation_ingest_source_errors_total",
            "Source fetch/parse errors."
        );
        describe_histogram!("curation_ingest_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!(
            "curation_ingest_last_run_ts",
            "Unix ts when the ingestion pipeline last ran."
        );
    });
}

static RE_TAGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)</?[a-z!][^>]*>").expect("static tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static ws regex"));

/// Feed text → plain text: decode entities, strip tags, ASCII quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode (descriptions are often escaped HTML)
    let decoded = html_escape::decode_html_entities(s);

    // 2) Strip HTML tags, then decode whatever was double-escaped inside them
    let stripped = RE_TAGS.replace_all(&decoded, " ");
    let stripped = html_escape::decode_html_entities(&stripped);

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    let quoted = stripped
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace('\u{00A0}', " ");

    // 4) Collapse whitespace
    RE_WS.replace_all(&quoted, " ").trim().to_string()
}

/// Cut to at most `max` chars (no ellipsis).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

pub fn word_count(text: &str) -> u32 {
    u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX)
}
