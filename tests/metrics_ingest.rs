// tests/metrics_ingest.rs
#![cfg(feature = "strict-metrics")]
mod common;

use metrics_exporter_prometheus::PrometheusBuilder;

use common::{entry, harness, seed};
use regional_news_curator::AutoPolicy;

#[tokio::test]
async fn ingest_counters_match_the_cycle_stats() {
    // Install a local recorder for the test
    let handle = PrometheusBuilder::new().install_recorder().expect("recorder");

    let feed = "https://desk.example/rss";
    let broken = "https://broken.example/rss";
    let h = harness(&[seed("Desk", feed), seed("Broken", broken)], AutoPolicy::default());
    h.feed.set(
        feed,
        vec![
            entry("Juba update", "https://desk.example/a", "Juba"),
            entry("Juba update", "https://desk.example/a", "Juba"),
            entry("Local bakery wins award", "https://desk.example/b", "Lisbon"),
        ],
    );
    let stats = h.curator.run_fetch_cycle().await.unwrap();
    assert_eq!((stats.articles_new, stats.duplicates, stats.below_floor), (1, 1, 1));

    let out = handle.render();
    for line in [
        "curation_ingest_cycles_total 1",
        "curation_ingest_entries_total 3",
        "curation_ingest_articles_new_total 1",
        "curation_ingest_duplicates_total 1",
        "curation_ingest_below_floor_total 1",
        "curation_ingest_source_errors_total 1",
    ] {
        assert!(out.lines().any(|l| l == line), "missing '{line}'\n{out}");
    }
    assert!(out.contains("curation_ingest_last_run_ts"));
}
