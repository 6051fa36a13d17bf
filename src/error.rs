//! Error taxonomy. Per-item failures stay inside their cycle; only
//! `CurationError` reaches callers of the lifecycle and cycle entry points.

use thiserror::Error;

use crate::model::ArticleStatus;

/// A source could not be fetched or parsed. Isolated per source.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed returned HTTP {status}")]
    Status { status: u16 },

    #[error("feed parse error: {0}")]
    Parse(String),
}

/// A single feed entry was unusable. The entry is skipped and counted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryParseError {
    #[error("entry has no title")]
    MissingTitle,

    #[error("entry has no link")]
    MissingLink,

    #[error("entry link is not an http(s) URL: {0}")]
    BadLink(String),
}

/// An article body could not be retrieved. The article moves to `failed`.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("article request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("article returned HTTP {status}")]
    Status { status: u16 },
}

/// Publishing failed; recorded on the post.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publisher request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{platform} API error: {message}")]
    Api { platform: String, message: String },

    #[error("{0} requires a media URL")]
    MissingMedia(String),

    #[error("{0} does not support automated publishing")]
    Unsupported(String),

    #[error("{0} credentials are not configured")]
    NotConfigured(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store record encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("store database error: {0}")]
    Db(String),

    #[error("store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    Fetch,
    Process,
}

impl std::fmt::Display for CycleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleKind::Fetch => f.write_str("fetch"),
            CycleKind::Process => f.write_str("process"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CurationError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("cannot move article from {from} to {to}")]
    InvalidTransition {
        from: ArticleStatus,
        to: ArticleStatus,
    },

    #[error("a {0} cycle is already running")]
    CycleBusy(CycleKind),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CurationError {
    pub fn not_found(entity: &'static str, id: impl Into<u64>) -> Self {
        CurationError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// True for errors a client caused (unknown id, illegal transition).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CurationError::NotFound { .. }
                | CurationError::InvalidTransition { .. }
        )
    }
}

pub type CurationResult<T> = Result<T, CurationError>;
