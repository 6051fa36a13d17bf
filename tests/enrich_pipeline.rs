// tests/enrich_pipeline.rs
//
// Processing cycles with a scripted content fetcher: upgrade on success,
// empty extraction still completes, failures are retried next cycle.

mod common;

use common::{entry, fixture, harness, seed};
use regional_news_curator::enrich::extract::ExtractMethod;
use regional_news_curator::enrich::extract_html;
use regional_news_curator::model::{Article, ArticleStatus};
use regional_news_curator::store::CurationStore;
use regional_news_curator::AutoPolicy;

const FEED: &str = "https://desk.example/rss";
const RICH: &str = "https://desk.example/rich";
const BARE: &str = "https://desk.example/bare";
const DOWN: &str = "https://desk.example/down";

async fn seeded(auto: AutoPolicy) -> common::Harness {
    let h = harness(&[seed("Desk", FEED)], auto);
    h.feed.set(
        FEED,
        vec![
            entry("Kiir visits Juba market", RICH, "Juba traders"),
            entry("Juba weather", BARE, "Juba"),
            entry("Juba road works", DOWN, "Juba"),
        ],
    );
    h.content.set(
        RICH,
        "President Salva Kiir toured the Juba market on Monday. Traders said oil revenue \
         delays hurt the economy and investment in infrastructure.",
    );
    h.content.set(BARE, "");
    h.curator.run_fetch_cycle().await.expect("fetch cycle");
    h
}

fn status_of(h: &common::Harness, url: &str) -> ArticleStatus {
    article_by_url(h, url).status
}

fn article_by_url(h: &common::Harness, url: &str) -> Article {
    h.store
        .query_articles(&Default::default())
        .unwrap()
        .into_iter()
        .find(|a| a.url == url)
        .unwrap_or_else(|| panic!("no article for {url}"))
}

#[tokio::test]
async fn cycle_upgrades_content_and_isolates_failures() {
    let h = seeded(AutoPolicy::default()).await;
    let before = article_by_url(&h, RICH);

    let report = h.curator.run_process_cycle().await.unwrap();
    assert_eq!(report.stats.selected, 3);
    assert_eq!(report.stats.processed, 2);
    assert_eq!(report.stats.failed, 1);
    assert!(report.auto_approved.is_empty());

    let rich = article_by_url(&h, RICH);
    assert_eq!(rich.status, ArticleStatus::Processed);
    assert!(rich.content.contains("oil revenue"));
    assert!(rich.word_count > before.word_count);
    assert!(rich.relevance_score > before.relevance_score);
    assert!(rich.category_list().contains(&"Economy"));
    assert!(rich.keyword_list().contains(&"salva kiir"));

    // empty extraction keeps the feed text but completes
    let bare = article_by_url(&h, BARE);
    assert_eq!(bare.status, ArticleStatus::Processed);
    assert_eq!(bare.content, "Juba");

    assert_eq!(status_of(&h, DOWN), ArticleStatus::Failed);
}

#[tokio::test]
async fn failed_articles_are_retried_next_cycle() {
    let h = seeded(AutoPolicy::default()).await;
    h.curator.run_process_cycle().await.unwrap();
    assert_eq!(status_of(&h, DOWN), ArticleStatus::Failed);

    h.content.set(DOWN, "Crews resurfaced the Juba ring road ahead of the rains.");
    let report = h.curator.run_process_cycle().await.unwrap();
    assert_eq!(report.stats.selected, 1);
    assert_eq!(report.stats.processed, 1);
    assert_eq!(status_of(&h, DOWN), ArticleStatus::Processed);
}

#[tokio::test]
async fn approved_articles_are_not_reprocessed() {
    let h = seeded(AutoPolicy::default()).await;
    let rich = article_by_url(&h, RICH);
    h.curator.lifecycle().approve(rich.id).unwrap();

    let report = h.curator.run_process_cycle().await.unwrap();
    assert_eq!(report.stats.selected, 2);
    assert_eq!(status_of(&h, RICH), ArticleStatus::Approved);
}

#[tokio::test]
async fn auto_approve_picks_relevant_processed_articles() {
    let h = seeded(AutoPolicy {
        approve: true,
        post: false,
    })
    .await;

    let report = h.curator.run_process_cycle().await.unwrap();
    let rich = article_by_url(&h, RICH);
    assert!(report.auto_approved.contains(&rich.id));
    assert_eq!(rich.status, ArticleStatus::Approved);
    // failed articles are never approved
    assert_eq!(status_of(&h, DOWN), ArticleStatus::Failed);
    assert_eq!(report.auto_posted, 0);
}

#[test]
fn fixture_page_extracts_the_article_body() {
    let out = extract_html(&fixture("article.html"), 100);
    assert_eq!(out.method, ExtractMethod::Density);
    assert!(out.content.contains("unification of forces"));
    assert!(out.content.contains("ceasefire"));
    assert!(!out.content.contains("Subscribe"));
    assert!(!out.content.contains("Copyright"));
    assert!(!out.content.contains("analytics"));
    assert!(out.word_count > 50);
}
