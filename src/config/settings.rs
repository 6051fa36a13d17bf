// src/config/settings.rs
//! Runtime settings from the environment (`.env` is loaded by the binaries).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "JunubTimes/1.0 (News Aggregator)";
pub const DEFAULT_STORE_PATH: &str = "data/curation.redb";
pub const DEFAULT_MAX_PAGE_BYTES: usize = 2 * 1024 * 1024;

/// Publisher credentials. Absent values leave the platform unconfigured.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub x_access_token: Option<String>,
    pub meta_page_access_token: Option<String>,
    pub meta_page_id: Option<String>,
    pub meta_ig_business_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub fetch_interval: Duration,
    pub process_interval: Duration,
    pub http_timeout: Duration,
    pub user_agent: String,
    pub ingest_max_entries: usize,
    pub process_batch_size: usize,
    pub process_delay: Duration,
    pub max_content_chars: usize,
    /// Failed articles are retried until they have been claimed this often.
    pub max_process_attempts: u32,
    /// Article pages are cut at this many bytes before parsing.
    pub max_page_bytes: usize,
    /// `None` keeps the store in memory only.
    pub store_path: Option<PathBuf>,
    /// Activity log entries kept; older ones are dropped.
    pub activity_retention: usize,
    pub auto_approve: bool,
    pub auto_post: bool,
    pub credentials: Credentials,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Settings {
    /// Shared HTTP client: descriptive user-agent, bounded timeout, redirects followed.
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .timeout(self.http_timeout)
            .connect_timeout(self.http_timeout.min(Duration::from_secs(10)))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| {
            lookup(k)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let num = |k: &str, default: u64| -> u64 { parse_or(get(k), default) };

        let store_path = match lookup("CURATION_STORE_PATH") {
            // explicitly blank → memory only
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(PathBuf::from(v.trim())),
            None => Some(PathBuf::from(DEFAULT_STORE_PATH)),
        };

        Self {
            fetch_interval: minutes(num("FETCH_INTERVAL_MINUTES", 30)),
            process_interval: minutes(num("PROCESS_INTERVAL_MINUTES", 10)),
            http_timeout: Duration::from_secs(num("HTTP_TIMEOUT_SECS", 30).clamp(1, 300)),
            user_agent: get("HTTP_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            ingest_max_entries: num("INGEST_MAX_ENTRIES", 25).clamp(1, 500) as usize,
            process_batch_size: num("PROCESS_BATCH_SIZE", 10).clamp(1, 500) as usize,
            process_delay: Duration::from_millis(num("PROCESS_DELAY_MS", 1000)),
            max_content_chars: num("MAX_CONTENT_CHARS", 8000).max(100) as usize,
            max_process_attempts: num("PROCESS_MAX_ATTEMPTS", 3).clamp(1, 100) as u32,
            max_page_bytes: num("MAX_PAGE_BYTES", DEFAULT_MAX_PAGE_BYTES as u64)
                .clamp(16 * 1024, 64 * 1024 * 1024) as usize,
            store_path,
            activity_retention: num("ACTIVITY_RETENTION", 5000).clamp(100, 1_000_000) as usize,
            auto_approve: parse_flag(get("AUTO_APPROVE")),
            auto_post: parse_flag(get("AUTO_POST")),
            credentials: Credentials {
                x_access_token: get("X_ACCESS_TOKEN"),
                meta_page_access_token: get("META_PAGE_ACCESS_TOKEN"),
                meta_page_id: get("META_PAGE_ID"),
                meta_ig_business_id: get("META_IG_BUSINESS_ID"),
            },
        }
    }
}

/// Cycle intervals are capped at a week.
const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n.clamp(1, MAX_INTERVAL_MINUTES).saturating_mul(60))
}

fn parse_or<T: FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|s| s.parse::<T>().ok()).unwrap_or(default)
}

fn parse_flag(raw: Option<String>) -> bool {
    matches!(
        raw.unwrap_or_default().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
