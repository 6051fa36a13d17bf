//! Entities shared by every stage: sources, articles, posts and the activity log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! entity_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> u64 {
                id.0
            }
        }
    };
}

entity_id!(SourceId);
entity_id!(ArticleId);
entity_id!(PostId);

/* ----------------------------
Source
---------------------------- */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub name: String,
    pub url: String,
    pub source_type: String,
    pub enabled: bool,
    /// Lower runs first.
    pub priority: i32,
    pub last_fetched: Option<DateTime<Utc>>,
    pub fetch_count: u64,
    pub error_count: u64,
    #[serde(default)]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Seed definition, as read from `config/sources.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSeed {
    pub name: String,
    pub url: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_priority() -> i32 {
    1
}

fn default_enabled() -> bool {
    true
}

/* ----------------------------
Article
---------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    Fetched,
    Processing,
    Processed,
    Approved,
    Rejected,
    Queued,
    Posted,
    Failed,
}

impl ArticleStatus {
    pub const ALL: [ArticleStatus; 8] = [
        ArticleStatus::Fetched,
        ArticleStatus::Processing,
        ArticleStatus::Processed,
        ArticleStatus::Approved,
        ArticleStatus::Rejected,
        ArticleStatus::Queued,
        ArticleStatus::Posted,
        ArticleStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ArticleStatus::Fetched => "fetched",
            ArticleStatus::Processing => "processing",
            ArticleStatus::Processed => "processed",
            ArticleStatus::Approved => "approved",
            ArticleStatus::Rejected => "rejected",
            ArticleStatus::Queued => "queued",
            ArticleStatus::Posted => "posted",
            ArticleStatus::Failed => "failed",
        }
    }

    /// Edges of the article state graph. Re-applying the current status is
    /// not an edge; callers decide whether that is a no-op.
    pub fn can_transition_to(self, next: ArticleStatus) -> bool {
        use ArticleStatus::*;
        matches!(
            (self, next),
            (Fetched, Processing)
                | (Fetched, Approved)
                | (Fetched, Rejected)
                | (Processing, Processed)
                | (Processing, Failed)
                | (Processed, Approved)
                | (Processed, Rejected)
                | (Failed, Processing)
                | (Approved, Queued)
                | (Queued, Posted)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ArticleStatus::Rejected | ArticleStatus::Posted)
    }
}

impl fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ArticleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArticleStatus::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown article status `{s}`"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub url: String,
    pub title: String,
    pub content: String,
    pub summary: String,
    pub author: String,
    pub source_name: String,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub relevance_score: f32,
    /// Comma-joined category tags.
    pub categories: String,
    /// Comma-joined matched keywords.
    pub keywords: String,
    pub word_count: u32,
    pub status: ArticleStatus,
    /// Extraction claims so far; failed articles stop being retried at the cap.
    #[serde(default)]
    pub process_attempts: u32,
}

impl Article {
    pub fn category_list(&self) -> Vec<&str> {
        split_joined(&self.categories)
    }

    pub fn keyword_list(&self) -> Vec<&str> {
        split_joined(&self.keywords)
    }
}

/// An article staged by the ingestion pipeline; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewArticle {
    pub url: String,
    pub title: String,
    pub content: String,
    pub summary: String,
    pub author: String,
    pub source_name: String,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub relevance_score: f32,
    pub categories: String,
    pub keywords: String,
    pub word_count: u32,
}

impl NewArticle {
    pub(crate) fn into_article(self, id: ArticleId) -> Article {
        Article {
            id,
            url: self.url,
            title: self.title,
            content: self.content,
            summary: self.summary,
            author: self.author,
            source_name: self.source_name,
            image_url: self.image_url,
            published_at: self.published_at,
            fetched_at: self.fetched_at,
            relevance_score: self.relevance_score,
            categories: self.categories,
            keywords: self.keywords,
            word_count: self.word_count,
            status: ArticleStatus::Fetched,
            process_attempts: 0,
        }
    }
}

/* ----------------------------
Post
---------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    X,
    Facebook,
    Instagram,
    TikTok,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::X,
        Platform::Facebook,
        Platform::Instagram,
        Platform::TikTok,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::X => "x",
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
            Platform::TikTok => "tiktok",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Pending,
    Posting,
    Posted,
    Failed,
}

impl PostStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PostStatus::Pending => "pending",
            PostStatus::Posting => "posting",
            PostStatus::Posted => "posted",
            PostStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub article_id: ArticleId,
    pub platform: Platform,
    pub content: String,
    /// Space-joined hashtags as rendered into the content.
    pub hashtags: String,
    pub media_url: Option<String>,
    pub status: PostStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub posted_at: Option<DateTime<Utc>>,
    pub platform_post_id: Option<String>,
    pub platform_url: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn hashtag_list(&self) -> Vec<&str> {
        self.hashtags.split_whitespace().collect()
    }
}

/// A rendered post that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub platform: Platform,
    pub content: String,
    pub hashtags: Vec<String>,
    pub media_url: Option<String>,
}

/* ----------------------------
Activity log
---------------------------- */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLog {
    pub id: u64,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<u64>,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<u64>,
    pub details: String,
}

impl NewActivity {
    pub fn new(action: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: None,
            details: String::new(),
        }
    }

    pub fn entity(mut self, id: u64) -> Self {
        self.entity_id = Some(id);
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }
}

fn split_joined(s: &str) -> Vec<&str> {
    s.split(',')
        .map(str::trim)
        .filter(|x| !x.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_graph_is_allowed() {
        use ArticleStatus::*;
        let path = [Fetched, Processing, Processed, Approved, Queued, Posted];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?}", pair);
        }
        assert!(Fetched.can_transition_to(Rejected));
        assert!(Processed.can_transition_to(Rejected));
        assert!(Processing.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Processing));
    }

    #[test]
    fn illegal_jumps_are_rejected() {
        use ArticleStatus::*;
        assert!(!Fetched.can_transition_to(Posted));
        assert!(!Fetched.can_transition_to(Queued));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Posted.can_transition_to(Fetched));
        assert!(!Processing.can_transition_to(Approved));
        for st in ArticleStatus::ALL {
            assert!(!st.can_transition_to(st), "self edge on {st}");
        }
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Approved".parse::<ArticleStatus>(), Ok(ArticleStatus::Approved));
        assert!("nope".parse::<ArticleStatus>().is_err());
    }

    #[test]
    fn joined_lists_skip_blanks() {
        assert_eq!(split_joined("Politics, ,Conflict,"), vec!["Politics", "Conflict"]);
    }
}
