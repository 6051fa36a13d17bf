//! Outbound publishers, one per platform, behind a single trait.
//!
//! A publisher without credentials stays constructible and reports
//! `NotConfigured`; the lifecycle checks status before calling `publish`.

pub mod facebook;
pub mod instagram;
pub mod manual;
pub mod x;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Credentials;
use crate::error::PublishError;
use crate::model::{Platform, Post};

pub use facebook::FacebookPublisher;
pub use instagram::InstagramPublisher;
pub use manual::ManualPublisher;
pub use x::XPublisher;

pub const GRAPH_API_BASE: &str = "https://graph.facebook.com";
pub const GRAPH_API_VERSION: &str = "v19.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformState {
    Ready,
    NotConfigured,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformStatus {
    pub platform: Platform,
    pub state: PlatformState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl PlatformStatus {
    pub fn new(platform: Platform, state: PlatformState) -> Self {
        Self {
            platform,
            state,
            note: None,
        }
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn is_ready(&self) -> bool {
        self.state == PlatformState::Ready
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub content: String,
    pub media_url: Option<String>,
}

impl From<&Post> for PublishRequest {
    fn from(p: &Post) -> Self {
        Self {
            content: p.content.clone(),
            media_url: p.media_url.clone().filter(|m| !m.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub platform_post_id: String,
    pub platform_url: Option<String>,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    fn platform(&self) -> Platform;
    fn status(&self) -> PlatformStatus;
    async fn publish(&self, req: &PublishRequest) -> Result<PublishReceipt, PublishError>;
}

/// Routes by platform; every platform always has a publisher.
#[derive(Clone)]
pub struct PublisherMux {
    by_platform: HashMap<Platform, Arc<dyn Publisher>>,
}

impl PublisherMux {
    pub fn from_credentials(creds: &Credentials, client: reqwest::Client) -> Self {
        let x = XPublisher::new(creds.x_access_token.clone(), client.clone());
        let fb = FacebookPublisher::new(
            creds.meta_page_id.clone(),
            creds.meta_page_access_token.clone(),
            client.clone(),
        );
        let ig = InstagramPublisher::new(
            creds.meta_ig_business_id.clone(),
            creds.meta_page_access_token.clone(),
            client,
        );
        Self::empty()
            .with_publisher(Arc::new(x))
            .with_publisher(Arc::new(fb))
            .with_publisher(Arc::new(ig))
    }

    /// Nothing configured; TikTok is manual either way.
    pub fn unconfigured() -> Self {
        Self::from_credentials(&Credentials::default(), reqwest::Client::new())
    }

    fn empty() -> Self {
        let mut by_platform: HashMap<Platform, Arc<dyn Publisher>> = HashMap::new();
        for p in Platform::ALL {
            by_platform.insert(p, Arc::new(ManualPublisher::new(p)));
        }
        Self { by_platform }
    }

    /// Replace the publisher for `p.platform()`.
    pub fn with_publisher(mut self, p: Arc<dyn Publisher>) -> Self {
        self.by_platform.insert(p.platform(), p);
        self
    }

    pub fn publisher(&self, platform: Platform) -> Arc<dyn Publisher> {
        match self.by_platform.get(&platform) {
            Some(p) => Arc::clone(p),
            None => Arc::new(ManualPublisher::new(platform)),
        }
    }

    pub fn platform_status(&self) -> Vec<PlatformStatus> {
        Platform::ALL
            .iter()
            .map(|p| self.publisher(*p).status())
            .collect()
    }
}

impl Default for PublisherMux {
    fn default() -> Self {
        Self::unconfigured()
    }
}

/* ----------------------------
Shared response handling
---------------------------- */

pub(crate) fn api_error(platform: Platform, message: impl Into<String>) -> PublishError {
    PublishError::Api {
        platform: platform.to_string(),
        message: message.into(),
    }
}

/// Non-2xx → `Api` error carrying the provider's message; 2xx → JSON body.
pub(crate) async fn json_or_api_error(
    platform: Platform,
    resp: reqwest::Response,
) -> Result<serde_json::Value, PublishError> {
    let status = resp.status();
    let body = resp.text().await?;
    let json: Option<serde_json::Value> = serde_json::from_str(&body).ok();
    if !status.is_success() {
        let detail = json
            .as_ref()
            .and_then(provider_message)
            .unwrap_or_else(|| crate::ingest::truncate_chars(body.trim(), 200));
        return Err(api_error(
            platform,
            format!("HTTP {}: {detail}", status.as_u16()),
        ));
    }
    json.ok_or_else(|| api_error(platform, "response is not JSON"))
}

/// Graph: `{"error":{"message"}}`; X: `{"detail"}` or `{"errors":[{"message"}]}`.
fn provider_message(v: &serde_json::Value) -> Option<String> {
    v.pointer("/error/message")
        .or_else(|| v.get("detail"))
        .or_else(|| v.pointer("/errors/0/message"))
        .or_else(|| v.get("title"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

pub(crate) fn string_field(v: &serde_json::Value, pointer: &str) -> Option<String> {
    v.pointer(pointer).and_then(|id| match id {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
