use metrics::{counter, gauge, histogram};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::categorize::Categorizer;
use crate::config::Settings;
use crate::enrich::ensure_metrics_described;
use crate::enrich::extract::ContentFetcher;
use crate::error::StoreError;
use crate::ingest::{truncate_chars, word_count};
use crate::model::{Article, ArticleId, ArticleStatus, NewActivity};
use crate::relevance::RelevanceEngine;
use crate::store::{AbandonGuard, ArticleQuery, CurationStore};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessStats {
    pub selected: usize,
    pub processed: usize,
    pub failed: usize,
    /// Articles whose status changed between selection and claim.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ProcessLimits {
    pub batch_size: usize,
    pub delay: Duration,
    pub max_content_chars: usize,
    /// Failed articles claimed this many times are no longer retried.
    pub max_attempts: u32,
}

impl ProcessLimits {
    pub fn from_settings(s: &Settings) -> Self {
        Self {
            batch_size: s.process_batch_size,
            delay: s.process_delay,
            max_content_chars: s.max_content_chars,
            max_attempts: s.max_process_attempts,
        }
    }
}

impl Default for ProcessLimits {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Processed,
    Failed,
    Skipped,
}

/// Upgrades `fetched` articles to full text and re-scores them.
pub struct ProcessingPipeline {
    store: Arc<dyn CurationStore>,
    fetcher: Arc<dyn ContentFetcher>,
    relevance: Arc<RelevanceEngine>,
    categorizer: Arc<Categorizer>,
    limits: ProcessLimits,
}

impl ProcessingPipeline {
    pub fn new(
        store: Arc<dyn CurationStore>,
        fetcher: Arc<dyn ContentFetcher>,
        relevance: Arc<RelevanceEngine>,
        categorizer: Arc<Categorizer>,
        limits: ProcessLimits,
    ) -> Self {
        Self {
            store,
            fetcher,
            relevance,
            categorizer,
            limits,
        }
    }

    /// Best fetched articles first, then failed ones with attempts left,
    /// least-tried first.
    fn select_batch(&self) -> Result<Vec<Article>, StoreError> {
        let cap = self.limits.batch_size;
        let mut batch = self
            .store
            .query_articles(&ArticleQuery::with_status(ArticleStatus::Fetched).limit(cap))?;
        if batch.len() < cap {
            let mut retries = self.store.query_articles(&ArticleQuery {
                attempts_below: Some(self.limits.max_attempts),
                ..ArticleQuery::with_status(ArticleStatus::Failed)
            })?;
            // stable: ties keep score order
            retries.sort_by_key(|a| a.process_attempts);
            retries.truncate(cap - batch.len());
            batch.extend(retries);
        }
        Ok(batch)
    }

    pub async fn run_cycle(&self) -> Result<ProcessStats, StoreError> {
        ensure_metrics_described();
        let batch = self.select_batch()?;
        let mut stats = ProcessStats {
            selected: batch.len(),
            ..ProcessStats::default()
        };

        for (i, article) in batch.into_iter().enumerate() {
            if i > 0 && !self.limits.delay.is_zero() {
                tokio::time::sleep(self.limits.delay).await;
            }
            match self.process_one(article).await? {
                Outcome::Processed => stats.processed += 1,
                Outcome::Failed => stats.failed += 1,
                Outcome::Skipped => stats.skipped += 1,
            }
        }

        counter!("curation_process_cycles_total").increment(1);
        counter!("curation_process_articles_total", "outcome" => "processed")
            .increment(stats.processed as u64);
        counter!("curation_process_articles_total", "outcome" => "failed")
            .increment(stats.failed as u64);
        gauge!("curation_process_last_run_ts").set(chrono::Utc::now().timestamp() as f64);

        self.store.append_activity(
            NewActivity::new("process_articles", "system").details(format!(
                "Processed: {}, Failed: {}",
                stats.processed, stats.failed
            )),
        )?;
        tracing::info!(
            target: "enrich",
            selected = stats.selected,
            processed = stats.processed,
            failed = stats.failed,
            skipped = stats.skipped,
            "process cycle finished"
        );
        Ok(stats)
    }

    async fn process_one(&self, article: Article) -> Result<Outcome, StoreError> {
        let id = article.id;
        let expected = article.status;
        if !self.claim(id, expected)? {
            tracing::debug!(target: "enrich", article = %id, "status changed since selection, skipped");
            return Ok(Outcome::Skipped);
        }

        let store = &*self.store;
        let abandoned = AbandonGuard::new(move || release_abandoned(store, id));

        let t0 = Instant::now();
        let result = self.fetcher.extract(&article.url).await;
        histogram!("curation_process_extract_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        abandoned.disarm();

        match result {
            Ok(extracted) => {
                let upgrade = if extracted.is_empty() {
                    None
                } else {
                    let content = truncate_chars(&extracted.content, self.limits.max_content_chars);
                    let rel = self.relevance.score_article(&article.title, &content);
                    let categories = self
                        .categorizer
                        .categorize(&format!("{} {}", article.title, content));
                    Some((content, rel, categories))
                };

                self.store.modify_article(id, &mut |a| {
                    if a.status != ArticleStatus::Processing {
                        return;
                    }
                    if let Some((content, rel, categories)) = &upgrade {
                        a.word_count = word_count(content);
                        a.content = content.clone();
                        a.relevance_score = rel.score;
                        a.keywords = rel.matched.join(",");
                        a.categories = categories.join(",");
                    }
                    a.status = ArticleStatus::Processed;
                })?;

                tracing::debug!(
                    target: "enrich",
                    article = %id,
                    upgraded = upgrade.is_some(),
                    score = upgrade.as_ref().map(|(_, r, _)| r.score),
                    "article processed"
                );
                Ok(Outcome::Processed)
            }
            Err(e) => {
                tracing::warn!(target: "enrich", article = %id, url = %article.url, error = %e, "extraction failed");
                self.store.modify_article(id, &mut |a| {
                    if a.status == ArticleStatus::Processing {
                        a.status = ArticleStatus::Failed;
                    }
                })?;
                Ok(Outcome::Failed)
            }
        }
    }

    /// Compare-and-set `expected` → `processing`; every claim counts as an attempt.
    fn claim(&self, id: ArticleId, expected: ArticleStatus) -> Result<bool, StoreError> {
        let mut claimed = false;
        self.store.modify_article(id, &mut |a| {
            if a.status == expected && a.status.can_transition_to(ArticleStatus::Processing) {
                a.status = ArticleStatus::Processing;
                a.process_attempts = a.process_attempts.saturating_add(1);
                claimed = true;
            }
        })?;
        Ok(claimed)
    }
}

/// The cycle was dropped (cancelled, timed out) or panicked mid-extraction.
fn release_abandoned(store: &dyn CurationStore, id: ArticleId) {
    let res = store.modify_article(id, &mut |a| {
        if a.status == ArticleStatus::Processing {
            a.status = ArticleStatus::Failed;
        }
    });
    counter!("curation_process_articles_total", "outcome" => "abandoned").increment(1);
    match res {
        Ok(_) => tracing::warn!(target: "enrich", article = %id, "processing abandoned, article marked failed"),
        Err(e) => tracing::error!(target: "enrich", article = %id, error = %e, "could not release abandoned article"),
    }
}
