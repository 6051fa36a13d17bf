//! Storage interface and its implementation.
//!
//! Every pipeline stage receives the store as an explicit handle
//! (`Arc<dyn CurationStore>`). `MemoryStore` keeps all tables behind one mutex
//! so each call is atomic. Opened with a path, it also writes every changed
//! row through to a redb database in one transaction per call, and loads the
//! tables back on open.
//!
//! # Table layout
//!
//! One redb table per entity, keyed by the numeric id, value is the JSON
//! record. Id counters are recovered from the highest stored key.

use chrono::{DateTime, Utc};
use redb::{Database, ReadTransaction, ReadableTable, TableDefinition, WriteTransaction};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, error, info};

use crate::error::StoreError;
use crate::model::{
    ActivityLog, Article, ArticleId, ArticleStatus, NewActivity, NewArticle, NewPost, Post,
    PostId, PostStatus, Source, SourceId, SourceSeed,
};

/* ----------------------------
Queries & batches
---------------------------- */

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArticleOrder {
    /// Score descending, then newest publication first.
    #[default]
    ScoreDesc,
    NewestFirst,
}

#[derive(Debug, Clone, Default)]
pub struct ArticleQuery {
    /// Empty means any status.
    pub statuses: Vec<ArticleStatus>,
    pub min_score: Option<f32>,
    pub fetched_since: Option<DateTime<Utc>>,
    /// Only articles claimed for processing fewer times than this.
    pub attempts_below: Option<u32>,
    pub order: ArticleOrder,
    pub limit: Option<usize>,
}

impl ArticleQuery {
    pub fn with_status(status: ArticleStatus) -> Self {
        Self {
            statuses: vec![status],
            ..Self::default()
        }
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    fn matches(&self, a: &Article) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&a.status))
            && self.min_score.is_none_or(|m| a.relevance_score >= m)
            && self.fetched_since.is_none_or(|t| a.fetched_at >= t)
            && self.attempts_below.is_none_or(|n| a.process_attempts < n)
    }
}

/// Posts come back newest first.
#[derive(Debug, Clone, Default)]
pub struct PostQuery {
    pub statuses: Vec<PostStatus>,
    pub article_id: Option<ArticleId>,
    pub posted_since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl PostQuery {
    fn matches(&self, p: &Post) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&p.status))
            && self.article_id.is_none_or(|id| p.article_id == id)
            && self
                .posted_since
                .is_none_or(|t| p.posted_at.is_some_and(|at| at >= t))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fetched,
    Failed(String),
}

/// Everything one source produced in one cycle; committed as a unit.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub source_id: SourceId,
    pub articles: Vec<NewArticle>,
    pub outcome: FetchOutcome,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchCommit {
    pub inserted: Vec<ArticleId>,
    /// URLs that were already stored (or repeated inside the batch).
    pub duplicates: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueueOutcome {
    Queued(Vec<Post>),
    ArticleNotFound,
    WrongStatus(ArticleStatus),
}

/* ----------------------------
Interface
---------------------------- */

pub trait CurationStore: Send + Sync {
    /// Insert seeds whose URL is not yet known. Returns how many were added.
    fn seed_sources(&self, seeds: &[SourceSeed]) -> Result<usize, StoreError>;
    /// All sources ordered by name.
    fn sources(&self) -> Result<Vec<Source>, StoreError>;
    /// Enabled sources ordered by priority ascending (ties by id).
    fn enabled_sources(&self) -> Result<Vec<Source>, StoreError>;
    fn source(&self, id: SourceId) -> Result<Option<Source>, StoreError>;
    fn modify_source(
        &self,
        id: SourceId,
        f: &mut dyn FnMut(&mut Source),
    ) -> Result<Option<Source>, StoreError>;

    fn has_article_url(&self, url: &str) -> Result<bool, StoreError>;
    /// Dedup + insert the batch articles and update the source, atomically.
    fn commit_source_batch(&self, batch: SourceBatch) -> Result<BatchCommit, StoreError>;
    fn article(&self, id: ArticleId) -> Result<Option<Article>, StoreError>;
    /// Mutate one article under the store lock; `None` if the id is unknown.
    fn modify_article(
        &self,
        id: ArticleId,
        f: &mut dyn FnMut(&mut Article),
    ) -> Result<Option<Article>, StoreError>;
    fn query_articles(&self, q: &ArticleQuery) -> Result<Vec<Article>, StoreError>;
    fn count_articles(&self, q: &ArticleQuery) -> Result<usize, StoreError>;

    /// Store all posts and move the article approved → queued, or do nothing.
    fn queue_posts(
        &self,
        article_id: ArticleId,
        posts: Vec<NewPost>,
    ) -> Result<QueueOutcome, StoreError>;
    fn post(&self, id: PostId) -> Result<Option<Post>, StoreError>;
    fn modify_post(
        &self,
        id: PostId,
        f: &mut dyn FnMut(&mut Post),
    ) -> Result<Option<Post>, StoreError>;
    fn query_posts(&self, q: &PostQuery) -> Result<Vec<Post>, StoreError>;
    fn count_posts(&self, q: &PostQuery) -> Result<usize, StoreError>;

    fn append_activity(&self, entry: NewActivity) -> Result<(), StoreError>;
    /// Newest first.
    fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityLog>, StoreError>;
}

/* ----------------------------
redb tables
---------------------------- */

type Rows = TableDefinition<'static, u64, &'static [u8]>;

const SOURCES: Rows = TableDefinition::new("sources");
const ARTICLES: Rows = TableDefinition::new("articles");
const POSTS: Rows = TableDefinition::new("posts");
const ACTIVITY: Rows = TableDefinition::new("activity");

pub const DEFAULT_ACTIVITY_RETENTION: usize = 5000;

const INTERRUPTED: &str = "interrupted before completion (recovered at startup)";

fn db_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Db(e.to_string())
}

/* ----------------------------
In-memory tables
---------------------------- */

#[derive(Debug, Clone, Default)]
struct NextIds {
    source: u64,
    article: u64,
    post: u64,
    activity: u64,
}

impl NextIds {
    fn bump(counter: &mut u64) -> u64 {
        *counter += 1;
        *counter
    }
}

#[derive(Debug, Default)]
struct Tables {
    next: NextIds,
    sources: BTreeMap<u64, Source>,
    articles: BTreeMap<u64, Article>,
    posts: BTreeMap<u64, Post>,
    /// Oldest first, at most `retention` entries.
    activity: VecDeque<ActivityLog>,
    url_index: HashMap<String, ArticleId>,
}

/// Rows touched by one `write` call; only these go to disk.
#[derive(Debug, Default)]
struct Changes {
    sources: BTreeSet<u64>,
    articles: BTreeSet<u64>,
    posts: BTreeSet<u64>,
    activity: BTreeSet<u64>,
    activity_dropped: Vec<u64>,
}

impl Changes {
    fn is_empty(&self) -> bool {
        self.sources.is_empty()
            && self.articles.is_empty()
            && self.posts.is_empty()
            && self.activity.is_empty()
            && self.activity_dropped.is_empty()
    }
}

impl Tables {
    fn rebuild_index(&mut self) {
        self.url_index = self
            .articles
            .values()
            .map(|a| (a.url.clone(), a.id))
            .collect();
    }

    fn resume_ids(&mut self) {
        self.next = NextIds {
            source: self.sources.keys().next_back().copied().unwrap_or(0),
            article: self.articles.keys().next_back().copied().unwrap_or(0),
            post: self.posts.keys().next_back().copied().unwrap_or(0),
            activity: self.activity.back().map_or(0, |a| a.id),
        };
    }

    fn push_activity(
        &mut self,
        entry: NewActivity,
        at: DateTime<Utc>,
        retention: usize,
        changes: &mut Changes,
    ) {
        let id = NextIds::bump(&mut self.next.activity);
        self.activity.push_back(ActivityLog {
            id,
            action: entry.action,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            details: entry.details,
            created_at: at,
        });
        changes.activity.insert(id);
        while self.activity.len() > retention {
            if let Some(old) = self.activity.pop_front() {
                changes.activity_dropped.push(old.id);
            }
        }
    }

    /// Work cut short by a crash: `processing` articles and `posting` posts
    /// go to `failed` so the normal retry paths pick them up again.
    fn recover_in_flight(&mut self, changes: &mut Changes) {
        for a in self.articles.values_mut() {
            if a.status == ArticleStatus::Processing {
                a.status = ArticleStatus::Failed;
                changes.articles.insert(a.id.0);
            }
        }
        for p in self.posts.values_mut() {
            if p.status == PostStatus::Posting {
                p.status = PostStatus::Failed;
                p.error_message = Some(INTERRUPTED.to_string());
                p.retry_count = p.retry_count.saturating_add(1);
                changes.posts.insert(p.id.0);
            }
        }
    }

    fn load(db: &Database) -> Result<Self, StoreError> {
        let rt = db.begin_read().map_err(db_err)?;
        let mut tables = Tables {
            sources: load_rows(&rt, SOURCES)?,
            articles: load_rows(&rt, ARTICLES)?,
            posts: load_rows(&rt, POSTS)?,
            activity: load_rows::<ActivityLog>(&rt, ACTIVITY)?.into_values().collect(),
            ..Tables::default()
        };
        tables.rebuild_index();
        tables.resume_ids();
        Ok(tables)
    }
}

fn load_rows<T: DeserializeOwned>(rt: &ReadTransaction, def: Rows) -> Result<BTreeMap<u64, T>, StoreError> {
    let table = rt.open_table(def).map_err(db_err)?;
    let mut rows = BTreeMap::new();
    for entry in table.iter().map_err(db_err)? {
        let (k, v) = entry.map_err(db_err)?;
        rows.insert(k.value(), serde_json::from_slice(v.value())?);
    }
    Ok(rows)
}

fn put_rows<T: Serialize>(
    wt: &WriteTransaction,
    def: Rows,
    ids: &BTreeSet<u64>,
    rows: &BTreeMap<u64, T>,
) -> Result<(), StoreError> {
    if ids.is_empty() {
        return Ok(());
    }
    let mut table = wt.open_table(def).map_err(db_err)?;
    for id in ids {
        if let Some(row) = rows.get(id) {
            let bytes = serde_json::to_vec(row)?;
            table.insert(*id, bytes.as_slice()).map_err(db_err)?;
        }
    }
    Ok(())
}

fn persist(db: &Database, t: &Tables, changes: &Changes) -> Result<(), StoreError> {
    let wt = db.begin_write().map_err(db_err)?;
    {
        put_rows(&wt, SOURCES, &changes.sources, &t.sources)?;
        put_rows(&wt, ARTICLES, &changes.articles, &t.articles)?;
        put_rows(&wt, POSTS, &changes.posts, &t.posts)?;

        let mut activity = wt.open_table(ACTIVITY).map_err(db_err)?;
        for id in &changes.activity_dropped {
            activity.remove(*id).map_err(db_err)?;
        }
        for entry in t.activity.iter().filter(|a| changes.activity.contains(&a.id)) {
            let bytes = serde_json::to_vec(entry)?;
            activity.insert(entry.id, bytes.as_slice()).map_err(db_err)?;
        }
    }
    wt.commit().map_err(db_err)?;
    Ok(())
}

/* ----------------------------
MemoryStore
---------------------------- */

pub struct MemoryStore {
    inner: Mutex<Tables>,
    db: Option<Database>,
    path: Option<PathBuf>,
    activity_retention: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Tables::default()),
            db: None,
            path: None,
            activity_retention: DEFAULT_ACTIVITY_RETENTION,
        }
    }
}

impl MemoryStore {
    /// Process-lifetime store, nothing touches the disk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Durable store backed by the redb file at `path` (created if missing).
    ///
    /// Rows left `processing`/`posting` by a previous run are marked `failed`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let db = Database::create(&path).map_err(db_err)?;
        // tables must exist before the first read transaction
        let wt = db.begin_write().map_err(db_err)?;
        for def in [SOURCES, ARTICLES, POSTS, ACTIVITY] {
            wt.open_table(def).map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;

        let mut tables = Tables::load(&db)?;
        let mut recovered = Changes::default();
        tables.recover_in_flight(&mut recovered);
        if !recovered.is_empty() {
            persist(&db, &tables, &recovered)?;
            info!(
                target: "store",
                articles = recovered.articles.len(),
                posts = recovered.posts.len(),
                "in-flight rows from previous run marked failed"
            );
        }
        info!(
            target: "store",
            path = %path.display(),
            sources = tables.sources.len(),
            articles = tables.articles.len(),
            posts = tables.posts.len(),
            "store opened"
        );
        Ok(Self {
            inner: Mutex::new(tables),
            db: Some(db),
            path: Some(path),
            activity_retention: DEFAULT_ACTIVITY_RETENTION,
        })
    }

    /// Keep at most `n` activity entries (at least one).
    pub fn with_activity_retention(mut self, n: usize) -> Self {
        self.activity_retention = n.max(1);
        if let Ok(mut t) = self.inner.lock() {
            let mut changes = Changes::default();
            while t.activity.len() > self.activity_retention {
                if let Some(old) = t.activity.pop_front() {
                    changes.activity_dropped.push(old.id);
                }
            }
            if let (Some(db), false) = (&self.db, changes.is_empty()) {
                if let Err(e) = persist(db, &t, &changes) {
                    error!(target: "store", error = %e, "activity trim not persisted");
                }
            }
        }
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T, StoreError> {
        let guard = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&guard))
    }

    /// Run `f` under the lock and write the rows it touched through to disk.
    /// If the commit fails the tables are reloaded from disk, so memory
    /// never runs ahead of what is stored.
    fn write<T>(&self, f: impl FnOnce(&mut Tables, &mut Changes) -> T) -> Result<T, StoreError> {
        let mut guard = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        let mut changes = Changes::default();
        let out = f(&mut guard, &mut changes);
        let Some(db) = &self.db else {
            return Ok(out);
        };
        if changes.is_empty() {
            return Ok(out);
        }
        if let Err(e) = persist(db, &guard, &changes) {
            error!(target: "store", error = %e, "commit failed, reloading tables");
            if let Ok(fresh) = Tables::load(db) {
                *guard = fresh;
            }
            return Err(e);
        }
        debug!(
            target: "store",
            articles = changes.articles.len(),
            posts = changes.posts.len(),
            "rows committed"
        );
        Ok(out)
    }
}

/// Runs `on_abandon` when dropped before `disarm`: a claimed row whose
/// future is cancelled or panics is put back into a retryable state.
pub(crate) struct AbandonGuard<F: FnOnce()> {
    on_abandon: Option<F>,
}

impl<F: FnOnce()> AbandonGuard<F> {
    pub(crate) fn new(on_abandon: F) -> Self {
        Self {
            on_abandon: Some(on_abandon),
        }
    }

    pub(crate) fn disarm(mut self) {
        self.on_abandon = None;
    }
}

impl<F: FnOnce()> Drop for AbandonGuard<F> {
    fn drop(&mut self) {
        if let Some(f) = self.on_abandon.take() {
            f();
        }
    }
}

fn sort_articles(v: &mut [Article], order: ArticleOrder) {
    match order {
        ArticleOrder::ScoreDesc => v.sort_by(|a, b| {
            b.relevance_score
                .total_cmp(&a.relevance_score)
                .then(b.published_at.cmp(&a.published_at))
                .then(a.id.cmp(&b.id))
        }),
        ArticleOrder::NewestFirst => v.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then(b.id.cmp(&a.id))
        }),
    }
}

impl CurationStore for MemoryStore {
    fn seed_sources(&self, seeds: &[SourceSeed]) -> Result<usize, StoreError> {
        self.write(|t, ch| {
            let mut known: HashSet<String> = t.sources.values().map(|s| s.url.clone()).collect();
            let now = Utc::now();
            let mut added = 0usize;
            for seed in seeds {
                let url = seed.url.trim();
                if url.is_empty() || !known.insert(url.to_string()) {
                    continue;
                }
                let id = NextIds::bump(&mut t.next.source);
                t.sources.insert(
                    id,
                    Source {
                        id: SourceId(id),
                        name: seed.name.trim().to_string(),
                        url: url.to_string(),
                        source_type: "rss".to_string(),
                        enabled: seed.enabled,
                        priority: seed.priority,
                        last_fetched: None,
                        fetch_count: 0,
                        error_count: 0,
                        last_error: None,
                        created_at: now,
                    },
                );
                ch.sources.insert(id);
                added += 1;
            }
            added
        })
    }

    fn sources(&self) -> Result<Vec<Source>, StoreError> {
        self.read(|t| {
            let mut v: Vec<Source> = t.sources.values().cloned().collect();
            v.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
            v
        })
    }

    fn enabled_sources(&self) -> Result<Vec<Source>, StoreError> {
        self.read(|t| {
            let mut v: Vec<Source> = t.sources.values().filter(|s| s.enabled).cloned().collect();
            v.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.id.cmp(&b.id)));
            v
        })
    }

    fn source(&self, id: SourceId) -> Result<Option<Source>, StoreError> {
        self.read(|t| t.sources.get(&id.0).cloned())
    }

    fn modify_source(
        &self,
        id: SourceId,
        f: &mut dyn FnMut(&mut Source),
    ) -> Result<Option<Source>, StoreError> {
        self.write(|t, ch| {
            let s = t.sources.get_mut(&id.0)?;
            let before = s.clone();
            f(s);
            if *s != before {
                ch.sources.insert(id.0);
            }
            Some(s.clone())
        })
    }

    fn has_article_url(&self, url: &str) -> Result<bool, StoreError> {
        self.read(|t| t.url_index.contains_key(url))
    }

    fn commit_source_batch(&self, batch: SourceBatch) -> Result<BatchCommit, StoreError> {
        self.write(|t, ch| {
            let mut commit = BatchCommit::default();
            for new in batch.articles {
                if t.url_index.contains_key(&new.url) {
                    commit.duplicates += 1;
                    continue;
                }
                let id = ArticleId(NextIds::bump(&mut t.next.article));
                t.url_index.insert(new.url.clone(), id);
                t.articles.insert(id.0, new.into_article(id));
                ch.articles.insert(id.0);
                commit.inserted.push(id);
            }
            if let Some(src) = t.sources.get_mut(&batch.source_id.0) {
                src.last_fetched = Some(batch.at);
                match &batch.outcome {
                    FetchOutcome::Fetched => {
                        src.fetch_count += 1;
                        src.last_error = None;
                    }
                    FetchOutcome::Failed(msg) => {
                        src.error_count += 1;
                        src.last_error = Some(msg.clone());
                    }
                }
                ch.sources.insert(batch.source_id.0);
            }
            commit
        })
    }

    fn article(&self, id: ArticleId) -> Result<Option<Article>, StoreError> {
        self.read(|t| t.articles.get(&id.0).cloned())
    }

    fn modify_article(
        &self,
        id: ArticleId,
        f: &mut dyn FnMut(&mut Article),
    ) -> Result<Option<Article>, StoreError> {
        self.write(|t, ch| {
            let a = t.articles.get_mut(&id.0)?;
            let before = a.clone();
            f(a);
            // the URL is the dedup key and never changes after insert
            a.url = before.url.clone();
            if *a != before {
                ch.articles.insert(id.0);
            }
            Some(a.clone())
        })
    }

    fn query_articles(&self, q: &ArticleQuery) -> Result<Vec<Article>, StoreError> {
        self.read(|t| {
            let mut v: Vec<Article> = t.articles.values().filter(|a| q.matches(a)).cloned().collect();
            sort_articles(&mut v, q.order);
            if let Some(n) = q.limit {
                v.truncate(n);
            }
            v
        })
    }

    fn count_articles(&self, q: &ArticleQuery) -> Result<usize, StoreError> {
        self.read(|t| {
            let n = t.articles.values().filter(|a| q.matches(a)).count();
            q.limit.map_or(n, |l| n.min(l))
        })
    }

    fn queue_posts(
        &self,
        article_id: ArticleId,
        posts: Vec<NewPost>,
    ) -> Result<QueueOutcome, StoreError> {
        self.write(|t, ch| {
            let Some(article) = t.articles.get_mut(&article_id.0) else {
                return QueueOutcome::ArticleNotFound;
            };
            if article.status != ArticleStatus::Approved {
                return QueueOutcome::WrongStatus(article.status);
            }
            article.status = ArticleStatus::Queued;
            ch.articles.insert(article_id.0);

            let now = Utc::now();
            let mut stored = Vec::with_capacity(posts.len());
            for p in posts {
                let id = PostId(NextIds::bump(&mut t.next.post));
                let post = Post {
                    id,
                    article_id,
                    platform: p.platform,
                    content: p.content,
                    hashtags: p.hashtags.join(" "),
                    media_url: p.media_url,
                    status: PostStatus::Pending,
                    scheduled_at: None,
                    posted_at: None,
                    platform_post_id: None,
                    platform_url: None,
                    error_message: None,
                    retry_count: 0,
                    created_at: now,
                };
                t.posts.insert(id.0, post.clone());
                ch.posts.insert(id.0);
                stored.push(post);
            }
            QueueOutcome::Queued(stored)
        })
    }

    fn post(&self, id: PostId) -> Result<Option<Post>, StoreError> {
        self.read(|t| t.posts.get(&id.0).cloned())
    }

    fn modify_post(
        &self,
        id: PostId,
        f: &mut dyn FnMut(&mut Post),
    ) -> Result<Option<Post>, StoreError> {
        self.write(|t, ch| {
            let p = t.posts.get_mut(&id.0)?;
            let before = p.clone();
            f(p);
            if *p != before {
                ch.posts.insert(id.0);
            }
            Some(p.clone())
        })
    }

    fn query_posts(&self, q: &PostQuery) -> Result<Vec<Post>, StoreError> {
        self.read(|t| {
            let iter = t.posts.values().rev().filter(|p| q.matches(p)).cloned();
            match q.limit {
                Some(n) => iter.take(n).collect(),
                None => iter.collect(),
            }
        })
    }

    fn count_posts(&self, q: &PostQuery) -> Result<usize, StoreError> {
        self.read(|t| {
            let n = t.posts.values().filter(|p| q.matches(p)).count();
            q.limit.map_or(n, |l| n.min(l))
        })
    }

    fn append_activity(&self, entry: NewActivity) -> Result<(), StoreError> {
        let retention = self.activity_retention;
        self.write(|t, ch| t.push_activity(entry, Utc::now(), retention, ch))
    }

    fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityLog>, StoreError> {
        self.read(|t| t.activity.iter().rev().take(limit).cloned().collect())
    }
}
