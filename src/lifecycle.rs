//! Operator-facing transitions: approve, reject, generate, publish.
//!
//! Every status change is a compare-and-set inside `CurationStore::modify_*`,
//! so concurrent callers (scheduler vs. operator) cannot both win.

use chrono::Utc;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{CurationError, CurationResult};
use crate::model::{
    Article, ArticleId, ArticleStatus, NewActivity, Post, PostId, PostStatus, Source, SourceId,
};
use crate::posts::PostGenerator;
use crate::publish::{PlatformStatus, PublishRequest, PublisherMux};
use crate::store::{AbandonGuard, ArticleQuery, CurationStore, QueueOutcome};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "curation_lifecycle_transitions_total",
            "Article status changes, labelled by target status."
        );
        describe_counter!("curation_posts_generated_total", "Posts staged for publishing.");
        describe_counter!(
            "curation_publish_total",
            "Publish attempts, labelled by platform and outcome."
        );
    });
}

/// Result of an idempotent article transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub article: Article,
    /// False when the article was already where the call would put it.
    pub changed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PublishReport {
    Posted(Post),
    Failed { post: Post, error: String },
    /// No credentials, or a manual-only platform. Nothing was changed.
    Unconfigured(PlatformStatus),
    AlreadyPosted(Post),
    /// Another caller is publishing this post right now.
    InFlight(Post),
}

pub struct LifecycleController {
    store: Arc<dyn CurationStore>,
    generator: Arc<PostGenerator>,
    publishers: PublisherMux,
}

impl LifecycleController {
    pub fn new(
        store: Arc<dyn CurationStore>,
        generator: Arc<PostGenerator>,
        publishers: PublisherMux,
    ) -> Self {
        ensure_metrics_described();
        Self {
            store,
            generator,
            publishers,
        }
    }

    pub fn publishers(&self) -> &PublisherMux {
        &self.publishers
    }

    /// fetched/processed → approved. Already approved, queued, posted or
    /// rejected articles are left alone.
    pub fn approve(&self, id: ArticleId) -> CurationResult<Transition> {
        use ArticleStatus::*;
        self.transition(id, Approved, &[Approved, Queued, Posted, Rejected], "approve_article")
    }

    /// fetched/processed → rejected; rejected is a no-op.
    pub fn reject(&self, id: ArticleId) -> CurationResult<Transition> {
        self.transition(
            id,
            ArticleStatus::Rejected,
            &[ArticleStatus::Rejected],
            "reject_article",
        )
    }

    fn transition(
        &self,
        id: ArticleId,
        to: ArticleStatus,
        no_op_from: &[ArticleStatus],
        action: &str,
    ) -> CurationResult<Transition> {
        let mut outcome: Result<bool, ArticleStatus> = Ok(false);
        let article = self
            .store
            .modify_article(id, &mut |a| {
                outcome = if no_op_from.contains(&a.status) {
                    Ok(false)
                } else if a.status.can_transition_to(to) {
                    a.status = to;
                    Ok(true)
                } else {
                    Err(a.status)
                };
            })?
            .ok_or_else(|| CurationError::not_found("article", id))?;

        let changed = outcome.map_err(|from| CurationError::InvalidTransition { from, to })?;
        if changed {
            counter!("curation_lifecycle_transitions_total", "to" => to.as_str()).increment(1);
            self.store
                .append_activity(NewActivity::new(action, "article").entity(id.0))?;
            info!(target: "lifecycle", article = %id, to = %to, "article transitioned");
        }
        Ok(Transition { article, changed })
    }

    /// Approve the best `limit` fetched/processed articles scoring at least `min_score`.
    pub fn approve_top(&self, min_score: f32, limit: usize) -> CurationResult<Vec<ArticleId>> {
        let candidates = self.store.query_articles(&ArticleQuery {
            statuses: vec![ArticleStatus::Fetched, ArticleStatus::Processed],
            min_score: Some(min_score),
            limit: Some(limit),
            ..ArticleQuery::default()
        })?;

        let mut approved = Vec::with_capacity(candidates.len());
        for a in candidates {
            match self.approve(a.id) {
                Ok(t) if t.changed => approved.push(a.id),
                Ok(_) => {}
                // picked up by a processing cycle since the query
                Err(e) if e.is_client_error() => {
                    warn!(target: "lifecycle", article = %a.id, error = %e, "approve_top skipped article");
                }
                Err(e) => return Err(e),
            }
        }

        self.store.append_activity(
            NewActivity::new("approve_top", "system")
                .details(format!("Approved: {}, min_score: {min_score}", approved.len())),
        )?;
        Ok(approved)
    }

    /// Render one post per platform and queue them with the article, atomically.
    pub fn generate_posts(&self, article_id: ArticleId) -> CurationResult<Vec<Post>> {
        let article = self
            .store
            .article(article_id)?
            .ok_or_else(|| CurationError::not_found("article", article_id))?;
        if article.status != ArticleStatus::Approved {
            return Err(CurationError::InvalidTransition {
                from: article.status,
                to: ArticleStatus::Queued,
            });
        }

        let drafts = self.generator.generate(&article);
        match self.store.queue_posts(article_id, drafts)? {
            QueueOutcome::Queued(posts) => {
                counter!("curation_posts_generated_total").increment(posts.len() as u64);
                counter!("curation_lifecycle_transitions_total", "to" => ArticleStatus::Queued.as_str())
                    .increment(1);
                self.store.append_activity(
                    NewActivity::new("generate_posts", "article")
                        .entity(article_id.0)
                        .details(format!("Posts: {}", posts.len())),
                )?;
                info!(target: "lifecycle", article = %article_id, posts = posts.len(), "posts generated");
                Ok(posts)
            }
            QueueOutcome::WrongStatus(from) => Err(CurationError::InvalidTransition {
                from,
                to: ArticleStatus::Queued,
            }),
            QueueOutcome::ArticleNotFound => Err(CurationError::not_found("article", article_id)),
        }
    }

    /// pending/failed → posting → posted | failed.
    pub async fn publish(&self, post_id: PostId) -> CurationResult<PublishReport> {
        let post = self.load_post(post_id)?;
        match post.status {
            PostStatus::Posted => return Ok(PublishReport::AlreadyPosted(post)),
            PostStatus::Posting => return Ok(PublishReport::InFlight(post)),
            PostStatus::Pending | PostStatus::Failed => {}
        }

        let publisher = self.publishers.publisher(post.platform);
        let status = publisher.status();
        if !status.is_ready() {
            return Ok(PublishReport::Unconfigured(status));
        }

        let mut claimed = false;
        let post = self
            .store
            .modify_post(post_id, &mut |p| {
                if matches!(p.status, PostStatus::Pending | PostStatus::Failed) {
                    p.status = PostStatus::Posting;
                    claimed = true;
                }
            })?
            .ok_or_else(|| CurationError::not_found("post", post_id))?;
        if !claimed {
            return Ok(match post.status {
                PostStatus::Posted => PublishReport::AlreadyPosted(post),
                _ => PublishReport::InFlight(post),
            });
        }

        let platform = post.platform;
        let store = &*self.store;
        let abandoned = AbandonGuard::new(move || release_abandoned(store, post_id));
        let result = publisher.publish(&PublishRequest::from(&post)).await;
        abandoned.disarm();

        match result {
            Ok(receipt) => {
                let now = Utc::now();
                let post = self
                    .store
                    .modify_post(post_id, &mut |p| {
                        p.status = PostStatus::Posted;
                        p.posted_at = Some(now);
                        p.platform_post_id = Some(receipt.platform_post_id.clone());
                        p.platform_url = receipt.platform_url.clone();
                        p.error_message = None;
                    })?
                    .ok_or_else(|| CurationError::not_found("post", post_id))?;
                self.article_posted(post.article_id)?;
                counter!("curation_publish_total", "platform" => platform.as_str(), "outcome" => "posted")
                    .increment(1);
                self.store.append_activity(
                    NewActivity::new("publish_post", "post")
                        .entity(post_id.0)
                        .details(format!("Published to {platform}")),
                )?;
                info!(target: "publish", post = %post_id, %platform, "post published");
                Ok(PublishReport::Posted(post))
            }
            Err(e) => {
                let error = e.to_string();
                let post = self
                    .store
                    .modify_post(post_id, &mut |p| {
                        // marked posted by hand in the meantime
                        if p.status != PostStatus::Posting {
                            return;
                        }
                        p.status = PostStatus::Failed;
                        p.error_message = Some(error.clone());
                        p.retry_count = p.retry_count.saturating_add(1);
                    })?
                    .ok_or_else(|| CurationError::not_found("post", post_id))?;
                counter!("curation_publish_total", "platform" => platform.as_str(), "outcome" => "failed")
                    .increment(1);
                warn!(target: "publish", post = %post_id, %platform, error = %error, "publish failed");
                Ok(PublishReport::Failed { post, error })
            }
        }
    }

    /// Record a post the operator published by hand (TikTok, or any platform).
    /// Also settles a post stuck in `posting` after an interrupted publish.
    pub fn mark_posted(&self, post_id: PostId) -> CurationResult<Post> {
        let now = Utc::now();
        let mut changed = false;
        let post = self
            .store
            .modify_post(post_id, &mut |p| {
                if p.status != PostStatus::Posted {
                    p.status = PostStatus::Posted;
                    p.posted_at = Some(now);
                    p.error_message = None;
                    changed = true;
                }
            })?
            .ok_or_else(|| CurationError::not_found("post", post_id))?;

        if changed {
            self.article_posted(post.article_id)?;
            counter!("curation_publish_total", "platform" => post.platform.as_str(), "outcome" => "manual")
                .increment(1);
            self.store.append_activity(
                NewActivity::new("mark_posted", "post")
                    .entity(post_id.0)
                    .details(format!("Posted manually to {}", post.platform)),
            )?;
        }
        Ok(post)
    }

    /// queued → posted on the first successful post of an article.
    fn article_posted(&self, article_id: ArticleId) -> CurationResult<()> {
        let mut moved = false;
        self.store.modify_article(article_id, &mut |a| {
            if a.status.can_transition_to(ArticleStatus::Posted) {
                a.status = ArticleStatus::Posted;
                moved = true;
            }
        })?;
        if moved {
            counter!("curation_lifecycle_transitions_total", "to" => ArticleStatus::Posted.as_str())
                .increment(1);
        }
        Ok(())
    }

    pub fn toggle_source(&self, id: SourceId) -> CurationResult<Source> {
        let source = self
            .store
            .modify_source(id, &mut |s| s.enabled = !s.enabled)?
            .ok_or_else(|| CurationError::not_found("source", id))?;
        self.store.append_activity(
            NewActivity::new("toggle_source", "source")
                .entity(id.0)
                .details(format!("enabled: {}", source.enabled)),
        )?;
        info!(target: "lifecycle", source = %source.name, enabled = source.enabled, "source toggled");
        Ok(source)
    }

    fn load_post(&self, id: PostId) -> CurationResult<Post> {
        self.store
            .post(id)?
            .ok_or_else(|| CurationError::not_found("post", id))
    }
}

/// The publish future was dropped or panicked before the platform answered.
/// Whether the platform received it is unknown; the post becomes retryable
/// and the operator can still settle it with `mark_posted`.
fn release_abandoned(store: &dyn CurationStore, id: PostId) {
    let res = store.modify_post(id, &mut |p| {
        if p.status == PostStatus::Posting {
            p.status = PostStatus::Failed;
            p.error_message = Some("publish interrupted before the platform answered".to_string());
            p.retry_count = p.retry_count.saturating_add(1);
        }
    });
    match res {
        Ok(_) => warn!(target: "publish", post = %id, "publish abandoned, post marked failed"),
        Err(e) => tracing::error!(target: "publish", post = %id, error = %e, "could not release abandoned post"),
    }
}
