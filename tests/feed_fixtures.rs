// tests/feed_fixtures.rs
//
// Parser over the RSS/Atom/RDF fixtures, then the HTTP fetchers against a
// local axum server serving the same files.

mod common;

use axum::{http::StatusCode, routing::get, Router};
use chrono::{TimeZone, Utc};

use common::fixture;
use regional_news_curator::enrich::extract::ExtractMethod;
use regional_news_curator::enrich::{ContentFetcher, HttpContentExtractor};
use regional_news_curator::error::{ExtractionError, FetchError};
use regional_news_curator::ingest::feed::FeedKind;
use regional_news_curator::ingest::{parse_feed, FeedFetcher, HttpFeedFetcher};
use regional_news_curator::model::{Source, SourceId};

#[test]
fn rss_fixture_parses_items_media_and_dates() {
    let parsed = parse_feed(fixture("rss.xml").as_bytes(), 25, Utc::now()).unwrap();
    assert_eq!(parsed.kind, FeedKind::Rss);
    assert_eq!(parsed.entries.len(), 3);
    assert_eq!(parsed.skipped, 1, "untitled item is skipped");

    let first = &parsed.entries[0];
    assert_eq!(first.title, "Salva Kiir meets Riek Machar in Juba");
    assert_eq!(first.url, "https://desk.example/2024/kiir-machar-juba");
    assert_eq!(first.summary, "Peace talks continue as both leaders meet in the capital.");
    assert_eq!(first.author, "Desk Reporter");
    assert_eq!(first.image_url.as_deref(), Some("https://desk.example/img/juba.jpg"));
    assert_eq!(
        first.published_at,
        Utc.with_ymd_and_hms(2024, 4, 2, 9, 30, 0).unwrap()
    );
}

#[test]
fn atom_fixture_uses_alternate_links_and_falls_back_to_updated() {
    let parsed = parse_feed(fixture("atom.xml").as_bytes(), 25, Utc::now()).unwrap();
    assert_eq!(parsed.kind, FeedKind::Atom);
    assert_eq!(parsed.entries.len(), 2);

    let igad = &parsed.entries[0];
    assert_eq!(igad.url, "https://horn.example/igad-juba");
    assert_eq!(igad.summary, "Regional mediators seek a ceasefire deal.");
    assert_eq!(igad.author, "Amina Deng");

    let oil = &parsed.entries[1];
    assert_eq!(oil.summary, "Exports are expected to rise.");
    assert_eq!(oil.published_at, Utc.with_ymd_and_hms(2024, 4, 1, 16, 45, 0).unwrap());
}

#[test]
fn rdf_fixture_parses_dublin_core_fields() {
    let parsed = parse_feed(fixture("rdf.xml").as_bytes(), 25, Utc::now()).unwrap();
    assert_eq!(parsed.kind, FeedKind::Rdf);
    assert_eq!(parsed.entries.len(), 1);
    let e = &parsed.entries[0];
    assert_eq!(e.url, "https://wire.example/unmiss-malakal");
    assert_eq!(e.author, "Wire Staff");
    assert_eq!(e.published_at, Utc.with_ymd_and_hms(2024, 4, 2, 6, 0, 0).unwrap());
}

/// A short lead article, ~280 KB of padding, then a much longer section.
/// Read in full, the trailing section wins the density pass.
fn oversized_page() -> String {
    let lead = "<p>President Salva Kiir opened the session in Juba on Monday, urging lawmakers \
                to pass the budget before the rainy season.</p>";
    let padding = format!("<aside>{}</aside>", "<span>x</span>".repeat(20_000));
    let tail = format!("<section><p>{}</p></section>", "TAILMARKER ".repeat(2_000));
    format!("<html><body><article>{lead}</article>{padding}{tail}</body></html>")
}

async fn serve_fixtures() -> String {
    let app = Router::new()
        .route("/rss", get(|| async { fixture("rss.xml") }))
        .route("/article", get(|| async { fixture("article.html") }))
        .route("/missing", get(|| async { (StatusCode::NOT_FOUND, "gone") }))
        .route("/not-a-feed", get(|| async { "<html><body>hi</body></html>" }))
        .route("/oversized", get(|| async { oversized_page() }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn source(url: String) -> Source {
    Source {
        id: SourceId(1),
        name: "Desk".into(),
        url,
        source_type: "rss".into(),
        enabled: true,
        priority: 1,
        last_fetched: None,
        fetch_count: 0,
        error_count: 0,
        last_error: None,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn http_feed_fetcher_parses_and_caps_intake() {
    let base = serve_fixtures().await;
    let fetcher = HttpFeedFetcher::with_client(reqwest::Client::new(), 2);

    let entries = fetcher.fetch(&source(format!("{base}/rss"))).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].title, "Floods displace thousands in Bor");
}

#[tokio::test]
async fn http_feed_fetcher_reports_status_and_parse_errors() {
    let base = serve_fixtures().await;
    let fetcher = HttpFeedFetcher::with_client(reqwest::Client::new(), 25);

    let err = fetcher.fetch(&source(format!("{base}/missing"))).await.unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 404 }), "{err:?}");

    let err = fetcher.fetch(&source(format!("{base}/not-a-feed"))).await.unwrap_err();
    assert!(matches!(err, FetchError::Parse(_)), "{err:?}");
}

#[tokio::test]
async fn http_extractor_returns_the_article_text() {
    let base = serve_fixtures().await;
    let extractor = HttpContentExtractor::with_client(reqwest::Client::new());

    let out = extractor.extract(&format!("{base}/article")).await.unwrap();
    assert_eq!(out.method, ExtractMethod::Density);
    assert!(out.content.starts_with("President Salva Kiir"), "{}", out.content);

    let err = extractor.extract(&format!("{base}/missing")).await.unwrap_err();
    assert!(matches!(err, ExtractionError::Status { status: 404 }));
}

#[tokio::test]
async fn http_extractor_stops_reading_at_the_byte_cap() {
    let base = serve_fixtures().await;
    let url = format!("{base}/oversized");

    let uncapped = HttpContentExtractor::with_client(reqwest::Client::new())
        .max_bytes(1024 * 1024);
    let full = uncapped.extract(&url).await.unwrap();
    assert!(full.content.starts_with("TAILMARKER"), "{}", &full.content[..40]);

    let capped = HttpContentExtractor::with_client(reqwest::Client::new()).max_bytes(16 * 1024);
    let out = capped.extract(&url).await.unwrap();
    assert!(out.content.starts_with("President Salva Kiir"), "{}", out.content);
    assert!(!out.content.contains("TAILMARKER"));
}
