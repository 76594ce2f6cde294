//! Provider contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use arabella_models::{
    AiProvider, JobId, ProviderCapabilities, ProviderHealth, ProviderStage, UserTier, VideoParams,
};

use crate::error::ProviderResult;

/// Everything a provider needs to start a generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub job_id: JobId,
    /// Fully resolved prompt (template base plus user text)
    pub prompt: String,
    pub params: VideoParams,
    pub template_id: String,
    /// Seed image for image-to-video back ends
    pub seed_image_url: Option<String>,
    pub user_tier: UserTier,
}

/// Outcome of starting a generation.
///
/// Fast back ends fill `video_url` right away; everyone else returns only
/// the handle and is polled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub provider_job_id: String,
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub duration_seconds: Option<u32>,
}

impl GenerationResult {
    /// Handle-only result.
    pub fn pending(provider_job_id: impl Into<String>) -> Self {
        Self {
            provider_job_id: provider_job_id.into(),
            ..Default::default()
        }
    }

    pub fn is_immediate(&self) -> bool {
        self.video_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

/// A single progress reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationProgress {
    pub percent: u8,
    pub stage: ProviderStage,
    pub message: String,
}

impl GenerationProgress {
    pub fn new(percent: u8, stage: ProviderStage, message: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100),
            stage,
            message: message.into(),
        }
    }
}

/// Uniform contract over video generation back ends.
#[async_trait]
pub trait VideoProvider: Send + Sync {
    /// Stable identifier, also the registry key.
    fn name(&self) -> AiProvider;

    async fn generate_video(&self, request: &GenerationRequest) -> ProviderResult<GenerationResult>;

    /// Idempotent read of an in-flight generation.
    async fn get_progress(&self, provider_job_id: &str) -> ProviderResult<GenerationProgress>;

    /// Best effort. Back ends without cancellation succeed without doing anything.
    async fn cancel_generation(&self, provider_job_id: &str) -> ProviderResult<()>;

    fn capabilities(&self) -> ProviderCapabilities;

    /// Liveness probe. Transport failures come back as an unhealthy snapshot.
    async fn health_check(&self) -> ProviderHealth;

    /// Providers that do not return the asset URL with progress expose it here.
    fn as_final_asset_url(&self) -> Option<&dyn FinalAssetUrl> {
        None
    }
}

/// Lookup of the finished asset for a completed provider job.
#[async_trait]
pub trait FinalAssetUrl: Send + Sync {
    async fn final_asset_url(&self, provider_job_id: &str) -> ProviderResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immediate_result() {
        let pending = GenerationResult::pending("op-1");
        assert!(!pending.is_immediate());

        let done = GenerationResult {
            video_url: Some("https://cdn/v.mp4".to_string()),
            ..pending.clone()
        };
        assert!(done.is_immediate());

        let empty = GenerationResult {
            video_url: Some(String::new()),
            ..pending
        };
        assert!(!empty.is_immediate());
    }
}
