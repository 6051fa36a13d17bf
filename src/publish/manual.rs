use async_trait::async_trait;

use super::{PlatformState, PlatformStatus, PublishReceipt, PublishRequest, Publisher};
use crate::error::PublishError;
use crate::model::Platform;

/// Platforms without an automated path (TikTok). The operator copies the
/// content and records it with `mark_posted`.
pub struct ManualPublisher {
    platform: Platform,
}

impl ManualPublisher {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl Publisher for ManualPublisher {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn status(&self) -> PlatformStatus {
        match self.platform {
            Platform::TikTok => PlatformStatus::new(self.platform, PlatformState::Manual)
                .note("Copy content and post manually"),
            _ => PlatformStatus::new(self.platform, PlatformState::NotConfigured),
        }
    }

    async fn publish(&self, _req: &PublishRequest) -> Result<PublishReceipt, PublishError> {
        Err(PublishError::Unsupported(self.platform.to_string()))
    }
}
