use async_trait::async_trait;
use reqwest::Client;

use super::{
    api_error, json_or_api_error, string_field, PlatformState, PlatformStatus, PublishReceipt,
    PublishRequest, Publisher,
};
use crate::error::PublishError;
use crate::model::Platform;

pub const X_API_BASE: &str = "https://api.twitter.com";

/// X (Twitter) v2 `POST /2/tweets` with a user-context bearer token.
pub struct XPublisher {
    token: Option<String>,
    client: Client,
    base_url: String,
}

impl XPublisher {
    pub fn new(token: Option<String>, client: Client) -> Self {
        Self {
            token: token.filter(|t| !t.trim().is_empty()),
            client,
            base_url: X_API_BASE.to_string(),
        }
    }

    /// Point at another API host (local stubs in tests).
    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base_url = base.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Publisher for XPublisher {
    fn platform(&self) -> Platform {
        Platform::X
    }

    fn status(&self) -> PlatformStatus {
        match self.token {
            Some(_) => PlatformStatus::new(Platform::X, PlatformState::Ready),
            None => PlatformStatus::new(Platform::X, PlatformState::NotConfigured)
                .note("Set X_ACCESS_TOKEN"),
        }
    }

    async fn publish(&self, req: &PublishRequest) -> Result<PublishReceipt, PublishError> {
        let Some(token) = &self.token else {
            return Err(PublishError::NotConfigured(Platform::X.to_string()));
        };

        let resp = self
            .client
            .post(format!("{}/2/tweets", self.base_url))
            .bearer_auth(token)
            .json(&serde_json::json!({ "text": req.content }))
            .send()
            .await?;
        let body = json_or_api_error(Platform::X, resp).await?;

        let id = string_field(&body, "/data/id")
            .ok_or_else(|| api_error(Platform::X, "no tweet id in response"))?;
        Ok(PublishReceipt {
            platform_url: Some(format!("https://x.com/i/web/status/{id}")),
            platform_post_id: id,
        })
    }
}
