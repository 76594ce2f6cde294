//! Gemini VEO video generation.
//!
//! Generation is a long-running operation: `predictLongRunning` returns an
//! operation name, which is polled until `done`. The finished operation
//! carries the generated sample's video URI.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use arabella_models::{
    AiProvider, AspectRatio, ProviderCapabilities, ProviderHealth, ProviderStage, QualityTier,
    Resolution,
};

use crate::error::{ProviderError, ProviderResult};
use crate::http::{build_client, check_status, probe};
use crate::provider::{
    FinalAssetUrl, GenerationProgress, GenerationRequest, GenerationResult, VideoProvider,
};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "veo-3.0-generate-001";

/// Progress reported while an operation is running; the API exposes no percentage.
const IN_FLIGHT_PERCENT: u8 = 50;

#[derive(Debug, Clone)]
pub struct GeminiVeoConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub request_timeout: Duration,
    pub health_timeout: Duration,
}

impl GeminiVeoConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: Duration::from_secs(300),
            health_timeout: Duration::from_secs(5),
        }
    }
}

// -----------------------------------------------------------------------------
// Wire types
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct PredictRequest {
    instances: Vec<Instance>,
    parameters: Parameters,
}

#[derive(Debug, Serialize)]
struct Instance {
    prompt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Parameters {
    aspect_ratio: String,
    duration_seconds: u32,
    resolution: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    error: Option<OperationError>,
    response: Option<OperationResponse>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample {
    video: Option<VideoRef>,
}

#[derive(Debug, Deserialize)]
struct VideoRef {
    uri: Option<String>,
}

impl Operation {
    fn video_uri(&self) -> Option<&str> {
        self.response
            .as_ref()?
            .generate_video_response
            .as_ref()?
            .generated_samples
            .first()?
            .video
            .as_ref()?
            .uri
            .as_deref()
    }
}

// -----------------------------------------------------------------------------
// Provider
// -----------------------------------------------------------------------------

pub struct GeminiVeoProvider {
    http: Client,
    config: GeminiVeoConfig,
}

impl GeminiVeoProvider {
    pub fn new(config: GeminiVeoConfig) -> ProviderResult<Self> {
        if config.api_key.is_empty() {
            return Err(ProviderError::config("Gemini API key is empty"));
        }
        let http = build_client(config.request_timeout)?;
        Ok(Self { http, config })
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    /// Operation names are returned as full resource paths.
    fn operation_url(&self, operation: &str) -> String {
        format!("{}/{}", self.base(), operation.trim_start_matches('/'))
    }

    async fn fetch_operation(&self, operation: &str) -> ProviderResult<Operation> {
        let response = self
            .http
            .get(self.operation_url(operation))
            .header("x-goog-api-key", &self.config.api_key)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

fn veo_resolution(resolution: Resolution) -> &'static str {
    match resolution {
        Resolution::Hd720 => "720p",
        Resolution::FullHd1080 | Resolution::Uhd4k => "1080p",
    }
}

#[async_trait]
impl VideoProvider for GeminiVeoProvider {
    fn name(&self) -> AiProvider {
        AiProvider::GeminiVeo
    }

    async fn generate_video(&self, request: &GenerationRequest) -> ProviderResult<GenerationResult> {
        let url = format!("{}/models/{}:predictLongRunning", self.base(), self.config.model);
        let body = PredictRequest {
            instances: vec![Instance {
                prompt: request.prompt.clone(),
            }],
            parameters: Parameters {
                aspect_ratio: request.params.aspect_ratio.to_string(),
                duration_seconds: request.params.duration,
                resolution: veo_resolution(request.params.resolution).to_string(),
                negative_prompt: request.params.negative_prompt.clone(),
            },
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await?;
        let operation: Operation = check_status(response).await?.json().await?;

        if let Some(err) = operation.error {
            return Err(ProviderError::generation_failed(err.message));
        }

        info!(
            job_id = %request.job_id,
            operation = %operation.name,
            model = %self.config.model,
            "Started Gemini VEO generation"
        );

        Ok(GenerationResult {
            video_url: operation.video_uri().map(str::to_string),
            duration_seconds: operation.video_uri().map(|_| request.params.duration),
            provider_job_id: operation.name,
            thumbnail_url: None,
        })
    }

    async fn get_progress(&self, provider_job_id: &str) -> ProviderResult<GenerationProgress> {
        let operation = self.fetch_operation(provider_job_id).await?;
        debug!(operation = %operation.name, done = operation.done, "Polled Gemini operation");

        if let Some(err) = operation.error {
            return Ok(GenerationProgress::new(0, ProviderStage::Failed, err.message));
        }
        if operation.done {
            return Ok(GenerationProgress::new(
                100,
                ProviderStage::Completed,
                "Video generation completed",
            ));
        }
        Ok(GenerationProgress::new(
            IN_FLIGHT_PERCENT,
            ProviderStage::Processing,
            "Video generation in progress",
        ))
    }

    async fn cancel_generation(&self, provider_job_id: &str) -> ProviderResult<()> {
        let url = format!("{}:cancel", self.operation_url(provider_job_id));
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .send()
            .await?;
        check_status(response).await?;
        info!(operation = %provider_job_id, "Cancelled Gemini operation");
        Ok(())
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            name: "Gemini VEO".to_string(),
            max_duration: 120,
            max_resolution: Resolution::Uhd4k,
            supported_ratios: vec![
                AspectRatio::LANDSCAPE,
                AspectRatio::PORTRAIT,
                AspectRatio::SQUARE,
            ],
            estimated_time: 30,
            quality_tier: QualityTier::Premium,
            supports_styles: true,
            cost_per_second: 0.05,
        }
    }

    async fn health_check(&self) -> ProviderHealth {
        let request = self
            .http
            .get(format!("{}/models", self.base()))
            .header("x-goog-api-key", &self.config.api_key);
        probe(request, self.config.health_timeout, |s| s.is_success()).await
    }

    fn as_final_asset_url(&self) -> Option<&dyn FinalAssetUrl> {
        Some(self)
    }
}

#[async_trait]
impl FinalAssetUrl for GeminiVeoProvider {
    async fn final_asset_url(&self, provider_job_id: &str) -> ProviderResult<String> {
        let operation = self.fetch_operation(provider_job_id).await?;
        match operation.video_uri() {
            Some(uri) => Ok(uri.to_string()),
            None => {
                warn!(operation = %provider_job_id, "Finished operation has no video sample");
                Err(ProviderError::invalid_response(
                    "operation response has no generated video",
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arabella_models::{JobId, UserTier, VideoParams};
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OP: &str = "models/veo-3.0-generate-001/operations/op123";

    fn provider(server: &MockServer) -> GeminiVeoProvider {
        let config = GeminiVeoConfig {
            base_url: server.uri(),
            ..GeminiVeoConfig::new("test-key")
        };
        GeminiVeoProvider::new(config).unwrap()
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            job_id: JobId::new(),
            prompt: "Ocean waves. At sunset".to_string(),
            params: VideoParams::default(),
            template_id: "tpl".to_string(),
            seed_image_url: None,
            user_tier: UserTier::Pro,
        }
    }

    #[tokio::test]
    async fn test_generate_returns_operation_handle() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/veo-3.0-generate-001:predictLongRunning"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": OP })))
            .expect(1)
            .mount(&server)
            .await;

        let result = provider(&server).generate_video(&request()).await.unwrap();
        assert_eq!(result.provider_job_id, OP);
        assert!(!result.is_immediate());
    }

    #[tokio::test]
    async fn test_progress_and_final_asset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/{}", OP)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": OP,
                "done": true,
                "response": {
                    "generateVideoResponse": {
                        "generatedSamples": [{ "video": { "uri": "https://files/v.mp4" } }]
                    }
                }
            })))
            .mount(&server)
            .await;

        let p = provider(&server);
        let progress = p.get_progress(OP).await.unwrap();
        assert_eq!(progress.stage, ProviderStage::Completed);
        assert_eq!(progress.percent, 100);

        let lookup = p.as_final_asset_url().unwrap();
        assert_eq!(lookup.final_asset_url(OP).await.unwrap(), "https://files/v.mp4");
    }

    #[tokio::test]
    async fn test_operation_error_is_failed_stage() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/{}", OP)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": OP,
                "done": true,
                "error": { "code": 3, "message": "prompt blocked" }
            })))
            .mount(&server)
            .await;

        let progress = provider(&server).get_progress(OP).await.unwrap();
        assert_eq!(progress.stage, ProviderStage::Failed);
        assert_eq!(progress.message, "prompt blocked");
    }

    #[tokio::test]
    async fn test_rejected_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid duration"))
            .mount(&server)
            .await;

        let err = provider(&server).generate_video(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::GenerationFailed(_)));
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let config = GeminiVeoConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            health_timeout: Duration::from_millis(200),
            ..GeminiVeoConfig::new("k")
        };
        let health = GeminiVeoProvider::new(config).unwrap().health_check().await;
        assert!(!health.is_healthy);
    }
}
