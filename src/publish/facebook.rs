use async_trait::async_trait;
use reqwest::Client;

use super::{
    api_error, json_or_api_error, string_field, PlatformState, PlatformStatus, PublishReceipt,
    PublishRequest, Publisher, GRAPH_API_BASE, GRAPH_API_VERSION,
};
use crate::error::PublishError;
use crate::model::Platform;

/// Page feed post through the Graph API.
pub struct FacebookPublisher {
    page_id: Option<String>,
    token: Option<String>,
    client: Client,
    base_url: String,
}

impl FacebookPublisher {
    pub fn new(page_id: Option<String>, token: Option<String>, client: Client) -> Self {
        Self {
            page_id: page_id.filter(|v| !v.trim().is_empty()),
            token: token.filter(|v| !v.trim().is_empty()),
            client,
            base_url: GRAPH_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base_url = base.into().trim_end_matches('/').to_string();
        self
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        Some((self.page_id.as_deref()?, self.token.as_deref()?))
    }
}

#[async_trait]
impl Publisher for FacebookPublisher {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    fn status(&self) -> PlatformStatus {
        match self.credentials() {
            Some(_) => PlatformStatus::new(Platform::Facebook, PlatformState::Ready),
            None => PlatformStatus::new(Platform::Facebook, PlatformState::NotConfigured)
                .note("Set META_PAGE_ID and META_PAGE_ACCESS_TOKEN"),
        }
    }

    async fn publish(&self, req: &PublishRequest) -> Result<PublishReceipt, PublishError> {
        let Some((page, token)) = self.credentials() else {
            return Err(PublishError::NotConfigured(Platform::Facebook.to_string()));
        };

        let resp = self
            .client
            .post(format!("{}/{GRAPH_API_VERSION}/{page}/feed", self.base_url))
            .form(&[("message", req.content.as_str()), ("access_token", token)])
            .send()
            .await?;
        let body = json_or_api_error(Platform::Facebook, resp).await?;

        let id = string_field(&body, "/id")
            .ok_or_else(|| api_error(Platform::Facebook, "no post id in response"))?;
        Ok(PublishReceipt {
            platform_url: Some(format!("https://facebook.com/{id}")),
            platform_post_id: id,
        })
    }
}
