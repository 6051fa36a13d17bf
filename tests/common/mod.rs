// tests/common/mod.rs
//
// Shared doubles for the integration tests: a scripted feed fetcher, a
// scripted content fetcher and a curator wired to an in-memory store.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use regional_news_curator::config::CurationConfig;
use regional_news_curator::enrich::extract::ExtractMethod;
use regional_news_curator::enrich::{ContentFetcher, Extracted, ProcessLimits};
use regional_news_curator::error::{ExtractionError, FetchError};
use regional_news_curator::ingest::{FeedEntry, FeedFetcher};
use regional_news_curator::model::{Source, SourceSeed};
use regional_news_curator::publish::PublisherMux;
use regional_news_curator::{AutoPolicy, Curator, CuratorDeps, CurationStore, MemoryStore};

pub fn fixture(name: &str) -> String {
    let path = format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"));
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("read fixture {path}: {e}"))
}

pub fn seed(name: &str, url: &str) -> SourceSeed {
    SourceSeed {
        name: name.into(),
        url: url.into(),
        priority: 1,
        enabled: true,
    }
}

pub fn entry(title: &str, url: &str, summary: &str) -> FeedEntry {
    FeedEntry {
        title: title.into(),
        url: url.into(),
        summary: summary.into(),
        author: String::new(),
        image_url: None,
        published_at: Utc.with_ymd_and_hms(2024, 4, 2, 9, 30, 0).unwrap(),
    }
}

/// Feed double keyed by source URL. Unknown URLs fail with HTTP 404.
#[derive(Default)]
pub struct ScriptedFeed {
    feeds: Mutex<HashMap<String, Vec<FeedEntry>>>,
}

impl ScriptedFeed {
    pub fn with(self, url: &str, entries: Vec<FeedEntry>) -> Self {
        self.set(url, entries);
        self
    }

    pub fn set(&self, url: &str, entries: Vec<FeedEntry>) {
        self.feeds.lock().unwrap().insert(url.to_string(), entries);
    }
}

#[async_trait]
impl FeedFetcher for ScriptedFeed {
    async fn fetch(&self, source: &Source) -> Result<Vec<FeedEntry>, FetchError> {
        self.feeds
            .lock()
            .unwrap()
            .get(&source.url)
            .cloned()
            .ok_or(FetchError::Status { status: 404 })
    }
}

/// Content double keyed by article URL. Unknown URLs fail with HTTP 503.
#[derive(Default)]
pub struct ScriptedContent {
    pages: Mutex<HashMap<String, String>>,
}

impl ScriptedContent {
    pub fn with(self, url: &str, text: &str) -> Self {
        self.set(url, text);
        self
    }

    pub fn set(&self, url: &str, text: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), text.to_string());
    }
}

#[async_trait]
impl ContentFetcher for ScriptedContent {
    async fn extract(&self, url: &str) -> Result<Extracted, ExtractionError> {
        let text = self
            .pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or(ExtractionError::Status { status: 503 })?;
        Ok(Extracted {
            word_count: text.split_whitespace().count() as u32,
            method: if text.is_empty() {
                ExtractMethod::Empty
            } else {
                ExtractMethod::Density
            },
            content: text,
        })
    }
}

pub fn no_delay() -> ProcessLimits {
    ProcessLimits {
        delay: std::time::Duration::ZERO,
        ..ProcessLimits::default()
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub feed: Arc<ScriptedFeed>,
    pub content: Arc<ScriptedContent>,
    pub curator: Curator,
}

pub fn harness(seeds: &[SourceSeed], auto: AutoPolicy) -> Harness {
    harness_with(seeds, auto, PublisherMux::unconfigured())
}

pub fn harness_with(seeds: &[SourceSeed], auto: AutoPolicy, publishers: PublisherMux) -> Harness {
    let store = Arc::new(MemoryStore::new());
    store.seed_sources(seeds).expect("seed sources");
    let feed = Arc::new(ScriptedFeed::default());
    let content = Arc::new(ScriptedContent::default());
    let cfg = CurationConfig::builtin().expect("builtin config");

    let curator = Curator::new(
        CuratorDeps {
            store: store.clone(),
            feed: feed.clone(),
            content: content.clone(),
            publishers,
        },
        &cfg,
        no_delay(),
        auto,
    );
    Harness {
        store,
        feed,
        content,
        curator,
    }
}
