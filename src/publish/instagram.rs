use async_trait::async_trait;
use reqwest::Client;

use super::{
    api_error, json_or_api_error, string_field, PlatformState, PlatformStatus, PublishReceipt,
    PublishRequest, Publisher, GRAPH_API_BASE, GRAPH_API_VERSION,
};
use crate::error::PublishError;
use crate::model::Platform;

/// Two-step Graph publish: create a media container, then publish it.
/// Every post needs an image.
pub struct InstagramPublisher {
    business_id: Option<String>,
    token: Option<String>,
    client: Client,
    base_url: String,
}

impl InstagramPublisher {
    pub fn new(business_id: Option<String>, token: Option<String>, client: Client) -> Self {
        Self {
            business_id: business_id.filter(|v| !v.trim().is_empty()),
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
        Some((self.business_id.as_deref()?, self.token.as_deref()?))
    }
}

#[async_trait]
impl Publisher for InstagramPublisher {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn status(&self) -> PlatformStatus {
        let st = match self.credentials() {
            Some(_) => PlatformStatus::new(Platform::Instagram, PlatformState::Ready),
            None => PlatformStatus::new(Platform::Instagram, PlatformState::NotConfigured),
        };
        st.note("Requires image for each post")
    }

    async fn publish(&self, req: &PublishRequest) -> Result<PublishReceipt, PublishError> {
        let Some((ig, token)) = self.credentials() else {
            return Err(PublishError::NotConfigured(Platform::Instagram.to_string()));
        };
        let Some(image) = req.media_url.as_deref() else {
            return Err(PublishError::MissingMedia(Platform::Instagram.to_string()));
        };

        let container = self
            .client
            .post(format!("{}/{GRAPH_API_VERSION}/{ig}/media", self.base_url))
            .form(&[
                ("image_url", image),
                ("caption", req.content.as_str()),
                ("access_token", token),
            ])
            .send()
            .await?;
        let container = json_or_api_error(Platform::Instagram, container).await?;
        let creation_id = string_field(&container, "/id")
            .ok_or_else(|| api_error(Platform::Instagram, "no container id in response"))?;

        let published = self
            .client
            .post(format!("{}/{GRAPH_API_VERSION}/{ig}/media_publish", self.base_url))
            .form(&[("creation_id", creation_id.as_str()), ("access_token", token)])
            .send()
            .await?;
        let published = json_or_api_error(Platform::Instagram, published).await?;
        let id = string_field(&published, "/id")
            .ok_or_else(|| api_error(Platform::Instagram, "no media id in response"))?;

        tracing::debug!(target: "publish", creation_id = %creation_id, media_id = %id, "instagram media published");
        Ok(PublishReceipt {
            platform_post_id: id,
            platform_url: None,
        })
    }
}
