//! Facade wiring the store, the two pipelines and the lifecycle controller.
//!
//! The curator owns no timers. Callers (the scheduler in the binary, an
//! operator tool, tests) trigger `run_fetch_cycle` / `run_process_cycle`;
//! a second trigger of the same kind while one is running gets `CycleBusy`.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::categorize::Categorizer;
use crate::config::{CurationConfig, Settings};
use crate::enrich::{ContentFetcher, HttpContentExtractor, ProcessLimits, ProcessStats, ProcessingPipeline};
use crate::error::{CurationError, CurationResult, CycleKind};
use crate::ingest::{FeedFetcher, HttpFeedFetcher, IngestStats, IngestionPipeline};
use crate::lifecycle::{LifecycleController, PublishReport};
use crate::model::{ActivityLog, Article, ArticleId, Post, PostStatus, Source, SourceSeed};
use crate::publish::{PlatformStatus, PublisherMux};
use crate::relevance::RelevanceEngine;
use crate::store::{ArticleQuery, CurationStore, MemoryStore, PostQuery};

/// Follow-up actions after a processing cycle (`AUTO_APPROVE` / `AUTO_POST`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoPolicy {
    pub approve: bool,
    pub post: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessCycleReport {
    #[serde(flatten)]
    pub stats: ProcessStats,
    pub auto_approved: Vec<ArticleId>,
    pub auto_posted: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_articles: usize,
    pub articles_today: usize,
    pub pending_posts: usize,
    pub posted_today: usize,
}

/// Collaborators handed to `Curator::new`; the binaries use `from_settings`.
pub struct CuratorDeps {
    pub store: Arc<dyn CurationStore>,
    pub feed: Arc<dyn FeedFetcher>,
    pub content: Arc<dyn ContentFetcher>,
    pub publishers: PublisherMux,
}

pub struct Curator {
    store: Arc<dyn CurationStore>,
    relevance: Arc<RelevanceEngine>,
    ingest: IngestionPipeline,
    process: ProcessingPipeline,
    lifecycle: LifecycleController,
    auto: AutoPolicy,
    approve_batch: usize,
    fetch_lock: Mutex<()>,
    process_lock: Mutex<()>,
}

impl Curator {
    pub fn new(
        deps: CuratorDeps,
        config: &CurationConfig,
        limits: ProcessLimits,
        auto: AutoPolicy,
    ) -> Self {
        let relevance = Arc::new(config.relevance_engine());
        let categorizer: Arc<Categorizer> = Arc::new(config.categorizer());
        let generator = Arc::new(config.post_generator());

        Self {
            ingest: IngestionPipeline::new(
                deps.store.clone(),
                deps.feed,
                relevance.clone(),
                categorizer.clone(),
            ),
            process: ProcessingPipeline::new(
                deps.store.clone(),
                deps.content,
                relevance.clone(),
                categorizer,
                limits,
            ),
            lifecycle: LifecycleController::new(deps.store.clone(), generator, deps.publishers),
            store: deps.store,
            relevance,
            auto,
            approve_batch: limits.batch_size,
            fetch_lock: Mutex::new(()),
            process_lock: Mutex::new(()),
        }
    }

    /// Production wiring: redb-backed store (or memory), HTTP collaborators,
    /// publishers from credentials, seed sources.
    pub fn from_settings(
        settings: &Settings,
        config: &CurationConfig,
        seeds: &[SourceSeed],
    ) -> anyhow::Result<Self> {
        let store: Arc<dyn CurationStore> = match &settings.store_path {
            Some(path) => Arc::new(
                MemoryStore::open(path)
                    .with_context(|| format!("opening store {}", path.display()))?
                    .with_activity_retention(settings.activity_retention),
            ),
            None => Arc::new(MemoryStore::new().with_activity_retention(settings.activity_retention)),
        };
        let added = store.seed_sources(seeds).context("seeding sources")?;
        if added > 0 {
            tracing::info!(target: "store", added, "seed sources added");
        }

        let client = settings.http_client().context("building HTTP client")?;
        let deps = CuratorDeps {
            store,
            feed: Arc::new(HttpFeedFetcher::with_client(client.clone(), settings.ingest_max_entries)),
            content: Arc::new(
                HttpContentExtractor::with_client(client.clone()).max_bytes(settings.max_page_bytes),
            ),
            publishers: PublisherMux::from_credentials(&settings.credentials, client),
        };
        Ok(Self::new(
            deps,
            config,
            ProcessLimits::from_settings(settings),
            AutoPolicy {
                approve: settings.auto_approve,
                post: settings.auto_post,
            },
        ))
    }

    pub fn store(&self) -> &Arc<dyn CurationStore> {
        &self.store
    }

    pub fn lifecycle(&self) -> &LifecycleController {
        &self.lifecycle
    }

    pub fn relevance(&self) -> &RelevanceEngine {
        &self.relevance
    }

    pub async fn run_fetch_cycle(&self) -> CurationResult<IngestStats> {
        let _guard = self
            .fetch_lock
            .try_lock()
            .map_err(|_| CurationError::CycleBusy(CycleKind::Fetch))?;
        Ok(self.ingest.run_cycle().await?)
    }

    pub async fn run_process_cycle(&self) -> CurationResult<ProcessCycleReport> {
        let _guard = self
            .process_lock
            .try_lock()
            .map_err(|_| CurationError::CycleBusy(CycleKind::Process))?;
        let stats = self.process.run_cycle().await?;
        let mut report = ProcessCycleReport {
            stats,
            ..ProcessCycleReport::default()
        };

        if self.auto.approve {
            report.auto_approved = self
                .lifecycle
                .approve_top(self.relevance.relevant_score(), self.approve_batch)?;
        }
        if self.auto.post {
            for id in report.auto_approved.clone() {
                report.auto_posted += self.auto_post(id).await?;
            }
        }
        Ok(report)
    }

    /// Generate posts for an approved article and publish to every ready platform.
    async fn auto_post(&self, id: ArticleId) -> CurationResult<usize> {
        let posts = match self.lifecycle.generate_posts(id) {
            Ok(posts) => posts,
            Err(e) if e.is_client_error() => {
                tracing::warn!(target: "lifecycle", article = %id, error = %e, "auto post skipped");
                return Ok(0);
            }
            Err(e) => return Err(e),
        };
        let mut posted = 0;
        for post in posts {
            if let PublishReport::Posted(_) = self.lifecycle.publish(post.id).await? {
                posted += 1;
            }
        }
        Ok(posted)
    }

    /* ---- read side ---- */

    pub fn stats(&self) -> CurationResult<DashboardStats> {
        let today = start_of_day(Utc::now());
        Ok(DashboardStats {
            total_articles: self.store.count_articles(&ArticleQuery::default())?,
            articles_today: self.store.count_articles(&ArticleQuery {
                fetched_since: Some(today),
                ..ArticleQuery::default()
            })?,
            pending_posts: self.store.count_posts(&PostQuery {
                statuses: vec![PostStatus::Pending],
                ..PostQuery::default()
            })?,
            posted_today: self.store.count_posts(&PostQuery {
                statuses: vec![PostStatus::Posted],
                posted_since: Some(today),
                ..PostQuery::default()
            })?,
        })
    }

    pub fn articles(&self, query: &ArticleQuery) -> CurationResult<Vec<Article>> {
        Ok(self.store.query_articles(query)?)
    }

    pub fn posts(&self, query: &PostQuery) -> CurationResult<Vec<Post>> {
        Ok(self.store.query_posts(query)?)
    }

    pub fn sources(&self) -> CurationResult<Vec<Source>> {
        Ok(self.store.sources()?)
    }

    pub fn recent_activity(&self, limit: usize) -> CurationResult<Vec<ActivityLog>> {
        Ok(self.store.recent_activity(limit)?)
    }

    pub fn platform_status(&self) -> Vec<PlatformStatus> {
        self.lifecycle.publishers().platform_status()
    }
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|d| d.and_utc())
        .unwrap_or(now)
}
