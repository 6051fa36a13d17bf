// src/ingest/types.rs
use chrono::{DateTime, Utc};

use crate::error::FetchError;
use crate::model::Source;

/// One validated feed entry, before scoring.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub url: String,
    /// Plain text, at most 1000 chars.
    pub summary: String,
    pub author: String,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, source: &Source) -> Result<Vec<FeedEntry>, FetchError>;
}
