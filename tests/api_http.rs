// tests/api_http.rs
//
// Ops router without opening sockets (tower::ServiceExt::oneshot), plus the
// cycle guard that keeps two cycles of the same kind from overlapping.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
};
use serde_json::Value as Json;
use tokio::sync::Notify;
use tower::ServiceExt as _; // for `oneshot`

use common::{entry, harness, no_delay, seed, ScriptedContent};
use regional_news_curator::api::{self, AppState};
use regional_news_curator::config::CurationConfig;
use regional_news_curator::error::{CurationError, CycleKind, FetchError};
use regional_news_curator::ingest::{FeedEntry, FeedFetcher};
use regional_news_curator::model::Source;
use regional_news_curator::publish::PublisherMux;
use regional_news_curator::{AutoPolicy, Curator, CuratorDeps, CurationStore, MemoryStore};

const BODY_LIMIT: usize = 1024 * 1024;
const FEED: &str = "https://desk.example/rss";

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, bytes)
}

#[tokio::test]
async fn health_returns_ok() {
    let h = harness(&[], AutoPolicy::default());
    let app = api::create_router(
        AppState {
            curator: Arc::new(h.curator),
        },
        None,
    );
    let (status, body) = get(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(body).unwrap(), "ok");
}

#[tokio::test]
async fn status_reports_stats_and_platforms() {
    let h = harness(&[seed("Desk", FEED)], AutoPolicy::default());
    h.feed.set(
        FEED,
        vec![
            entry("Juba council meets", "https://desk.example/a", "Juba"),
            entry("Abyei talks", "https://desk.example/b", "Abyei"),
        ],
    );
    h.curator.run_fetch_cycle().await.unwrap();

    let app = api::create_router(
        AppState {
            curator: Arc::new(h.curator),
        },
        None,
    );
    let (status, body) = get(app, "/status").await;
    assert_eq!(status, StatusCode::OK);

    let v: Json = serde_json::from_slice(&body).expect("json body");
    assert_eq!(v["stats"]["total_articles"], 2);
    assert_eq!(v["stats"]["articles_today"], 2);
    assert_eq!(v["stats"]["pending_posts"], 0);
    assert_eq!(v["stats"]["posted_today"], 0);

    let platforms = v["platforms"].as_array().expect("platforms array");
    assert_eq!(platforms.len(), 4);
    assert_eq!(platforms[0]["platform"], "x");
    assert_eq!(platforms[0]["state"], "not_configured");
    assert_eq!(platforms[3]["platform"], "tiktok");
    assert_eq!(platforms[3]["state"], "manual");
}

#[tokio::test]
async fn unknown_route_is_404() {
    let h = harness(&[], AutoPolicy::default());
    let app = api::create_router(
        AppState {
            curator: Arc::new(h.curator),
        },
        None,
    );
    let (status, _) = get(app, "/articles").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Feed that parks inside `fetch` until released.
#[derive(Default)]
struct GatedFeed {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl FeedFetcher for GatedFeed {
    async fn fetch(&self, _source: &Source) -> Result<Vec<FeedEntry>, FetchError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(vec![entry("Juba update", "https://desk.example/gated", "Juba")])
    }
}

#[tokio::test]
async fn overlapping_cycles_of_the_same_kind_are_rejected() {
    let store = Arc::new(MemoryStore::new());
    store.seed_sources(&[seed("Desk", FEED)]).unwrap();
    let feed = Arc::new(GatedFeed::default());
    let curator = Arc::new(Curator::new(
        CuratorDeps {
            store: store.clone(),
            feed: feed.clone(),
            content: Arc::new(ScriptedContent::default()),
            publishers: PublisherMux::unconfigured(),
        },
        &CurationConfig::builtin().unwrap(),
        no_delay(),
        AutoPolicy::default(),
    ));

    let first = tokio::spawn({
        let curator = curator.clone();
        async move { curator.run_fetch_cycle().await }
    });
    feed.entered.notified().await;

    match curator.run_fetch_cycle().await {
        Err(CurationError::CycleBusy(CycleKind::Fetch)) => {}
        other => panic!("expected CycleBusy, got {other:?}"),
    }
    // a different cycle kind is not blocked
    curator.run_process_cycle().await.expect("process cycle");

    feed.release.notify_one();
    let stats = first.await.expect("join").expect("first cycle");
    assert_eq!(stats.articles_new, 1);

    // lock released afterwards
    feed.release.notify_one();
    let again = curator.run_fetch_cycle().await.expect("second cycle");
    assert_eq!(again.duplicates, 1);
}
