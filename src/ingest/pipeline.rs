// src/ingest/pipeline.rs
use chrono::Utc;
use metrics::{counter, gauge};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::categorize::Categorizer;
use crate::error::StoreError;
use crate::ingest::types::{FeedEntry, FeedFetcher};
use crate::ingest::{ensure_metrics_described, truncate_chars, word_count};
use crate::model::{NewActivity, NewArticle, Source};
use crate::relevance::RelevanceEngine;
use crate::store::{CurationStore, FetchOutcome, SourceBatch};

/// Article summaries are shorter than feed summaries.
pub const ARTICLE_SUMMARY_CHARS: usize = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub sources_processed: usize,
    pub sources_failed: usize,
    pub articles_found: usize,
    pub articles_new: usize,
    /// New articles at or above the "relevant" marker.
    pub articles_relevant: usize,
    pub duplicates: usize,
    pub below_floor: usize,
    /// `"<source>: <error>"` per failed source.
    pub errors: Vec<String>,
}

/// Source feeds → scored, categorized, deduplicated `fetched` articles.
pub struct IngestionPipeline {
    store: Arc<dyn CurationStore>,
    fetcher: Arc<dyn FeedFetcher>,
    relevance: Arc<RelevanceEngine>,
    categorizer: Arc<Categorizer>,
}

struct Staged {
    articles: Vec<NewArticle>,
    duplicates: usize,
    below_floor: usize,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn CurationStore>,
        fetcher: Arc<dyn FeedFetcher>,
        relevance: Arc<RelevanceEngine>,
        categorizer: Arc<Categorizer>,
    ) -> Self {
        Self {
            store,
            fetcher,
            relevance,
            categorizer,
        }
    }

    /// One pass over every enabled source. Source failures are recorded and
    /// skipped; only store failures abort the cycle.
    pub async fn run_cycle(&self) -> Result<IngestStats, StoreError> {
        ensure_metrics_described();
        let mut stats = IngestStats::default();

        for source in self.store.enabled_sources()? {
            let (articles, outcome) = match self.fetcher.fetch(&source).await {
                Ok(entries) => {
                    stats.sources_processed += 1;
                    stats.articles_found += entries.len();
                    let staged = self.stage(&source, entries)?;
                    stats.duplicates += staged.duplicates;
                    stats.below_floor += staged.below_floor;
                    (staged.articles, FetchOutcome::Fetched)
                }
                Err(e) => {
                    tracing::warn!(target: "ingest", source = %source.name, error = %e, "source fetch failed");
                    counter!("curation_ingest_source_errors_total").increment(1);
                    stats.sources_failed += 1;
                    stats.errors.push(format!("{}: {e}", source.name));
                    (Vec::new(), FetchOutcome::Failed(e.to_string()))
                }
            };

            let commit = self.store.commit_source_batch(SourceBatch {
                source_id: source.id,
                articles,
                outcome,
                at: Utc::now(),
            })?;

            // a concurrent writer may have stored some URLs since staging
            stats.duplicates += commit.duplicates;
            stats.articles_new += commit.inserted.len();
            for id in &commit.inserted {
                if let Some(a) = self.store.article(*id)? {
                    if a.relevance_score >= self.relevance.relevant_score() {
                        stats.articles_relevant += 1;
                    }
                }
            }

            tracing::debug!(
                target: "ingest",
                source = %source.name,
                new = commit.inserted.len(),
                duplicates = commit.duplicates,
                "source committed"
            );
        }

        counter!("curation_ingest_cycles_total").increment(1);
        counter!("curation_ingest_entries_total").increment(stats.articles_found as u64);
        counter!("curation_ingest_articles_new_total").increment(stats.articles_new as u64);
        counter!("curation_ingest_duplicates_total").increment(stats.duplicates as u64);
        counter!("curation_ingest_below_floor_total").increment(stats.below_floor as u64);
        gauge!("curation_ingest_last_run_ts").set(Utc::now().timestamp() as f64);

        self.store.append_activity(
            NewActivity::new("fetch_news", "system").details(format!(
                "New: {}, Relevant: {}",
                stats.articles_new, stats.articles_relevant
            )),
        )?;

        tracing::info!(
            target: "ingest",
            sources = stats.sources_processed,
            failed = stats.sources_failed,
            found = stats.articles_found,
            new = stats.articles_new,
            relevant = stats.articles_relevant,
            duplicates = stats.duplicates,
            below_floor = stats.below_floor,
            "fetch cycle finished"
        );
        Ok(stats)
    }

    /// Dedup against the store and within the feed, score, drop below the floor.
    fn stage(&self, source: &Source, entries: Vec<FeedEntry>) -> Result<Staged, StoreError> {
        let fetched_at = Utc::now();
        let min = self.relevance.min_score();

        let mut staged = Staged {
            articles: Vec::with_capacity(entries.len()),
            duplicates: 0,
            below_floor: 0,
        };
        let mut seen: HashSet<String> = HashSet::new();

        for entry in entries {
            if !seen.insert(entry.url.clone()) || self.store.has_article_url(&entry.url)? {
                staged.duplicates += 1;
                continue;
            }

            let rel = self.relevance.score_article(&entry.title, &entry.summary);
            if rel.score < min {
                staged.below_floor += 1;
                continue;
            }

            let categories = self
                .categorizer
                .categorize(&format!("{} {}", entry.title, entry.summary));
            let summary = truncate_chars(&entry.summary, ARTICLE_SUMMARY_CHARS);

            staged.articles.push(NewArticle {
                url: entry.url,
                title: entry.title,
                content: entry.summary.clone(),
                word_count: word_count(&entry.summary),
                summary,
                author: entry.author,
                source_name: source.name.clone(),
                image_url: entry.image_url,
                published_at: entry.published_at,
                fetched_at,
                relevance_score: rel.score,
                categories: categories.join(","),
                keywords: rel.matched.join(","),
            });
        }
        Ok(staged)
    }
}
