//! Deterministic provider for development and tests.
//!
//! Without `simulate_time` every generation finishes immediately. With it,
//! progress advances with wall-clock time and completes after 30 seconds.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::info;
use uuid::Uuid;

use arabella_models::{
    AiProvider, AspectRatio, ProviderCapabilities, ProviderHealth, ProviderStage, QualityTier,
    Resolution,
};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{
    FinalAssetUrl, GenerationProgress, GenerationRequest, GenerationResult, VideoProvider,
};

const SIMULATED_RUNTIME: Duration = Duration::from_secs(30);
const CDN_BASE: &str = "https://cdn.arabella.app";

pub struct MockProvider {
    simulate_time: bool,
    started: Mutex<HashMap<String, Instant>>,
}

impl MockProvider {
    pub fn new(simulate_time: bool) -> Self {
        Self {
            simulate_time,
            started: Mutex::new(HashMap::new()),
        }
    }

    fn video_url(id: &str) -> String {
        format!("{}/videos/{}.mp4", CDN_BASE, id)
    }

    fn thumbnail_url(id: &str) -> String {
        format!("{}/thumbnails/{}.jpg", CDN_BASE, id)
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Stage for a simulated percentage.
fn stage_for(percent: u8) -> ProviderStage {
    match percent {
        100..=u8::MAX => ProviderStage::Completed,
        80..=99 => ProviderStage::Uploading,
        31..=79 => ProviderStage::DiffusingFrames,
        _ => ProviderStage::Processing,
    }
}

#[async_trait]
impl VideoProvider for MockProvider {
    fn name(&self) -> AiProvider {
        AiProvider::Mock
    }

    async fn generate_video(&self, request: &GenerationRequest) -> ProviderResult<GenerationResult> {
        let id = Uuid::new_v4().to_string();
        self.started.lock().await.insert(id.clone(), Instant::now());

        info!(
            job_id = %request.job_id,
            provider_job_id = %id,
            simulate_time = self.simulate_time,
            "Mock video generation started"
        );

        if self.simulate_time {
            return Ok(GenerationResult::pending(id));
        }

        Ok(GenerationResult {
            video_url: Some(Self::video_url(&id)),
            thumbnail_url: Some(Self::thumbnail_url(&id)),
            duration_seconds: Some(request.params.duration),
            provider_job_id: id,
        })
    }

    async fn get_progress(&self, provider_job_id: &str) -> ProviderResult<GenerationProgress> {
        let started = self
            .started
            .lock()
            .await
            .get(provider_job_id)
            .copied()
            .ok_or_else(|| ProviderError::not_found(provider_job_id))?;

        let ratio = started.elapsed().as_secs_f64() / SIMULATED_RUNTIME.as_secs_f64();
        let percent = (ratio * 100.0).min(100.0) as u8;

        Ok(GenerationProgress::new(
            percent,
            stage_for(percent),
            format!("Progress: {}%", percent),
        ))
    }

    async fn cancel_generation(&self, provider_job_id: &str) -> ProviderResult<()> {
        if self.started.lock().await.remove(provider_job_id).is_none() {
            return Err(ProviderError::not_found(provider_job_id));
        }
        info!(provider_job_id = %provider_job_id, "Mock generation cancelled");
        Ok(())
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            name: "Mock Provider".to_string(),
            max_duration: 60,
            max_resolution: Resolution::FullHd1080,
            supported_ratios: vec![
                AspectRatio::LANDSCAPE,
                AspectRatio::PORTRAIT,
                AspectRatio::SQUARE,
            ],
            estimated_time: 5,
            quality_tier: QualityTier::Standard,
            supports_styles: true,
            cost_per_second: 0.0,
        }
    }

    async fn health_check(&self) -> ProviderHealth {
        ProviderHealth::healthy(0)
    }

    fn as_final_asset_url(&self) -> Option<&dyn FinalAssetUrl> {
        Some(self)
    }
}

#[async_trait]
impl FinalAssetUrl for MockProvider {
    async fn final_asset_url(&self, provider_job_id: &str) -> ProviderResult<String> {
        if !self.started.lock().await.contains_key(provider_job_id) {
            return Err(ProviderError::not_found(provider_job_id));
        }
        Ok(Self::video_url(provider_job_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arabella_models::{JobId, UserTier, VideoParams};

    fn request() -> GenerationRequest {
        GenerationRequest {
            job_id: JobId::new(),
            prompt: "Neon city. Flying cars".to_string(),
            params: VideoParams::default(),
            template_id: "tpl".to_string(),
            seed_image_url: None,
            user_tier: UserTier::Free,
        }
    }

    #[tokio::test]
    async fn test_immediate_result() {
        let provider = MockProvider::new(false);
        let result = provider.generate_video(&request()).await.unwrap();

        assert!(result.is_immediate());
        assert_eq!(
            result.video_url.as_deref(),
            Some(format!("https://cdn.arabella.app/videos/{}.mp4", result.provider_job_id).as_str())
        );
        assert_eq!(result.duration_seconds, Some(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_progress() {
        let provider = MockProvider::new(true);
        let result = provider.generate_video(&request()).await.unwrap();
        assert!(!result.is_immediate());
        let id = result.provider_job_id;

        let p = provider.get_progress(&id).await.unwrap();
        assert_eq!(p.stage, ProviderStage::Processing);

        tokio::time::advance(Duration::from_secs(15)).await;
        let p = provider.get_progress(&id).await.unwrap();
        assert_eq!(p.percent, 50);
        assert_eq!(p.stage, ProviderStage::DiffusingFrames);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(
            provider.get_progress(&id).await.unwrap().stage,
            ProviderStage::Uploading
        );

        tokio::time::advance(Duration::from_secs(10)).await;
        let p = provider.get_progress(&id).await.unwrap();
        assert_eq!(p.percent, 100);
        assert_eq!(p.stage, ProviderStage::Completed);

        let url = provider
            .as_final_asset_url()
            .unwrap()
            .final_asset_url(&id)
            .await
            .unwrap();
        assert!(url.ends_with(&format!("{}.mp4", id)));
    }

    #[tokio::test]
    async fn test_unknown_handle() {
        let provider = MockProvider::default();
        assert!(matches!(
            provider.get_progress("nope").await,
            Err(ProviderError::NotFound(_))
        ));
        assert!(provider.cancel_generation("nope").await.is_err());
    }
}
