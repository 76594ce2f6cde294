//! Wan AI video generation through DashScope async tasks.
//!
//! Submission returns a task id; the task is polled at `/tasks/{id}` until it
//! reports `SUCCEEDED`, `FAILED` or `CANCELED`. DashScope does not report a
//! percentage, so running tasks get an estimate from their submit time.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use arabella_models::{
    AiProvider, AspectRatio, ProviderCapabilities, ProviderHealth, ProviderStage, QualityTier,
    Resolution,
};

use crate::error::{ProviderError, ProviderResult};
use crate::http::{build_client, check_status, probe};
use crate::provider::{
    FinalAssetUrl, GenerationProgress, GenerationRequest, GenerationResult, VideoProvider,
};

pub const DEFAULT_BASE_URL: &str = "https://dashscope-intl.aliyuncs.com/api/v1";
pub const DEFAULT_VERSION: &str = "2.5";

const SYNTHESIS_PATH: &str = "/services/aigc/video-generation/video-synthesis";
const MAX_DURATION: u32 = 10;
/// Seconds of processing per second of output video
const SECS_PER_VIDEO_SEC: u32 = 20;

#[derive(Debug, Clone)]
pub struct WanAiConfig {
    pub api_key: String,
    pub base_url: String,
    /// Model family: `2.1`, `2.2` or `2.5`
    pub version: String,
    pub request_timeout: Duration,
    pub health_timeout: Duration,
}

impl WanAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            version: DEFAULT_VERSION.to_string(),
            request_timeout: Duration::from_secs(300),
            health_timeout: Duration::from_secs(5),
        }
    }

    /// Model name for the configured version.
    pub fn model(&self, image_to_video: bool) -> &'static str {
        match (self.version.as_str(), image_to_video) {
            ("2.5", false) => "wan2.5-t2v-preview",
            ("2.5", true) => "wan2.5-i2v-preview",
            ("2.2", false) => "wan2.2-t2v-plus",
            ("2.2", true) => "wan2.2-i2v-plus",
            (_, false) => "wanx2.1-t2v-turbo",
            (_, true) => "wanx2.1-i2v-turbo",
        }
    }
}

// -----------------------------------------------------------------------------
// Wire types
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct SynthesisRequest {
    model: String,
    input: SynthesisInput,
    parameters: SynthesisParameters,
}

#[derive(Debug, Serialize)]
struct SynthesisInput {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    img_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct SynthesisParameters {
    /// Text-to-video takes an explicit `W*H` size
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<String>,
    /// Image-to-video takes a resolution class instead
    #[serde(skip_serializing_if = "Option::is_none")]
    resolution: Option<String>,
    duration: u32,
    prompt_extend: bool,
}

#[derive(Debug, Deserialize)]
struct TaskResponse {
    output: TaskOutput,
}

#[derive(Debug, Deserialize)]
struct TaskOutput {
    task_id: String,
    task_status: TaskStatus,
    video_url: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

fn size_for(resolution: Resolution, ratio: AspectRatio) -> String {
    let short = match resolution {
        Resolution::Hd720 => 720,
        Resolution::FullHd1080 | Resolution::Uhd4k => 1080,
    };
    let (w, h) = if ratio.width >= ratio.height {
        (short * ratio.width / ratio.height.max(1), short)
    } else {
        (short, short * ratio.height / ratio.width.max(1))
    };
    format!("{}*{}", w, h)
}

fn resolution_class(resolution: Resolution) -> &'static str {
    match resolution {
        Resolution::Hd720 => "720P",
        Resolution::FullHd1080 | Resolution::Uhd4k => "1080P",
    }
}

// -----------------------------------------------------------------------------
// Provider
// -----------------------------------------------------------------------------

struct InFlight {
    submitted: Instant,
    expected: Duration,
}

pub struct WanAiProvider {
    http: Client,
    config: WanAiConfig,
    in_flight: Mutex<HashMap<String, InFlight>>,
}

impl WanAiProvider {
    pub fn new(config: WanAiConfig) -> ProviderResult<Self> {
        if config.api_key.is_empty() {
            return Err(ProviderError::config("Wan AI API key is empty"));
        }
        let http = build_client(config.request_timeout)?;
        Ok(Self {
            http,
            config,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    async fn fetch_task(&self, task_id: &str) -> ProviderResult<TaskOutput> {
        let response = self
            .http
            .get(format!("{}/tasks/{}", self.base(), task_id))
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;
        let task: TaskResponse = check_status(response).await?.json().await?;
        Ok(task.output)
    }

    /// Estimated percentage for a running task, 10..=90.
    async fn running_percent(&self, task_id: &str) -> u8 {
        let in_flight = self.in_flight.lock().await;
        match in_flight.get(task_id) {
            Some(task) => {
                let ratio = task.submitted.elapsed().as_secs_f64()
                    / task.expected.as_secs_f64().max(1.0);
                (10.0 + ratio * 80.0).min(90.0) as u8
            }
            // Submitted before a restart
            None => 50,
        }
    }
}

#[async_trait]
impl VideoProvider for WanAiProvider {
    fn name(&self) -> AiProvider {
        AiProvider::WanAi
    }

    async fn generate_video(&self, request: &GenerationRequest) -> ProviderResult<GenerationResult> {
        let image_to_video = request.seed_image_url.as_deref().is_some_and(|u| !u.is_empty());
        let duration = if request.params.duration <= 5 { 5 } else { MAX_DURATION };

        let body = SynthesisRequest {
            model: self.config.model(image_to_video).to_string(),
            input: SynthesisInput {
                prompt: request.prompt.clone(),
                negative_prompt: request.params.negative_prompt.clone(),
                img_url: request.seed_image_url.clone().filter(|_| image_to_video),
            },
            parameters: SynthesisParameters {
                size: (!image_to_video)
                    .then(|| size_for(request.params.resolution, request.params.aspect_ratio)),
                resolution: image_to_video
                    .then(|| resolution_class(request.params.resolution).to_string()),
                duration,
                prompt_extend: true,
            },
        };

        let response = self
            .http
            .post(format!("{}{}", self.base(), SYNTHESIS_PATH))
            .bearer_auth(&self.config.api_key)
            .header("X-DashScope-Async", "enable")
            .json(&body)
            .send()
            .await?;
        let task: TaskResponse = check_status(response).await?.json().await?;
        let task_id = task.output.task_id;

        self.in_flight.lock().await.insert(
            task_id.clone(),
            InFlight {
                submitted: Instant::now(),
                expected: Duration::from_secs(u64::from(duration * SECS_PER_VIDEO_SEC)),
            },
        );

        info!(
            job_id = %request.job_id,
            task_id = %task_id,
            model = %body.model,
            image_to_video,
            "Submitted Wan AI task"
        );

        Ok(GenerationResult::pending(task_id))
    }

    async fn get_progress(&self, provider_job_id: &str) -> ProviderResult<GenerationProgress> {
        let task = self.fetch_task(provider_job_id).await?;
        debug!(task_id = %provider_job_id, status = ?task.task_status, "Polled Wan AI task");

        let progress = match task.task_status {
            TaskStatus::Pending => {
                GenerationProgress::new(5, ProviderStage::Processing, "Waiting in provider queue")
            }
            TaskStatus::Running => GenerationProgress::new(
                self.running_percent(provider_job_id).await,
                ProviderStage::DiffusingFrames,
                "Generating video frames",
            ),
            TaskStatus::Succeeded => {
                self.in_flight.lock().await.remove(provider_job_id);
                GenerationProgress::new(100, ProviderStage::Completed, "Video generation completed")
            }
            TaskStatus::Failed | TaskStatus::Canceled => {
                self.in_flight.lock().await.remove(provider_job_id);
                let fallback = match task.task_status {
                    TaskStatus::Canceled => "Task was cancelled by the provider",
                    _ => "Task failed",
                };
                let message = task.message.unwrap_or_else(|| fallback.to_string());
                GenerationProgress::new(0, ProviderStage::Failed, message)
            }
            TaskStatus::Unknown => return Err(ProviderError::not_found(provider_job_id)),
        };
        Ok(progress)
    }

    async fn cancel_generation(&self, provider_job_id: &str) -> ProviderResult<()> {
        let response = self
            .http
            .post(format!("{}/tasks/{}/cancel", self.base(), provider_job_id))
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;
        check_status(response).await?;
        self.in_flight.lock().await.remove(provider_job_id);
        info!(task_id = %provider_job_id, "Cancelled Wan AI task");
        Ok(())
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            name: "Wan AI".to_string(),
            max_duration: MAX_DURATION,
            max_resolution: Resolution::FullHd1080,
            supported_ratios: vec![
                AspectRatio::LANDSCAPE,
                AspectRatio::PORTRAIT,
                AspectRatio::SQUARE,
                AspectRatio::CLASSIC,
            ],
            estimated_time: SECS_PER_VIDEO_SEC,
            quality_tier: QualityTier::Standard,
            supports_styles: false,
            cost_per_second: 0.02,
        }
    }

    async fn health_check(&self) -> ProviderHealth {
        // Any authenticated answer below 500 means the API is up
        let request = self
            .http
            .get(format!("{}/tasks/health-probe", self.base()))
            .bearer_auth(&self.config.api_key);
        probe(request, self.config.health_timeout, |s| {
            !s.is_server_error() && s != StatusCode::UNAUTHORIZED && s != StatusCode::FORBIDDEN
        })
        .await
    }

    fn as_final_asset_url(&self) -> Option<&dyn FinalAssetUrl> {
        Some(self)
    }
}

#[async_trait]
impl FinalAssetUrl for WanAiProvider {
    async fn final_asset_url(&self, provider_job_id: &str) -> ProviderResult<String> {
        let task = self.fetch_task(provider_job_id).await?;
        task.video_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ProviderError::invalid_response("task has no video_url"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arabella_models::{JobId, UserTier, VideoParams};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> WanAiProvider {
        let config = WanAiConfig {
            base_url: server.uri(),
            ..WanAiConfig::new("sk-test")
        };
        WanAiProvider::new(config).unwrap()
    }

    fn request(seed: Option<&str>) -> GenerationRequest {
        GenerationRequest {
            job_id: JobId::new(),
            prompt: "Cyberpunk city. Rain at night".to_string(),
            params: VideoParams {
                duration: 8,
                ..VideoParams::default()
            },
            template_id: "tpl".to_string(),
            seed_image_url: seed.map(str::to_string),
            user_tier: UserTier::Free,
        }
    }

    fn task(status: &str) -> serde_json::Value {
        json!({
            "request_id": "r1",
            "output": { "task_id": "task-1", "task_status": status }
        })
    }

    #[test]
    fn test_size_for() {
        assert_eq!(size_for(Resolution::FullHd1080, AspectRatio::LANDSCAPE), "1920*1080");
        assert_eq!(size_for(Resolution::Hd720, AspectRatio::PORTRAIT), "720*1280");
        assert_eq!(size_for(Resolution::Hd720, AspectRatio::SQUARE), "720*720");
    }

    #[tokio::test]
    async fn test_submit_text_to_video() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/aigc/video-generation/video-synthesis"))
            .and(header("X-DashScope-Async", "enable"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "wan2.5-t2v-preview",
                "parameters": { "size": "1920*1080", "duration": 10 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(task("PENDING")))
            .expect(1)
            .mount(&server)
            .await;

        let result = provider(&server).generate_video(&request(None)).await.unwrap();
        assert_eq!(result.provider_job_id, "task-1");
        assert!(!result.is_immediate());
    }

    #[tokio::test]
    async fn test_submit_image_to_video() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "model": "wan2.5-i2v-preview",
                "input": { "img_url": "https://img/seed.jpg" },
                "parameters": { "resolution": "1080P" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(task("PENDING")))
            .expect(1)
            .mount(&server)
            .await;

        provider(&server)
            .generate_video(&request(Some("https://img/seed.jpg")))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_progress_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tasks/task-run"))
            .respond_with(ResponseTemplate::new(200).set_body_json(task("RUNNING")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tasks/task-failed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "output": {
                    "task_id": "task-failed",
                    "task_status": "FAILED",
                    "code": "DataInspectionFailed",
                    "message": "Input data may contain inappropriate content."
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tasks/task-gone"))
            .respond_with(ResponseTemplate::new(200).set_body_json(task("UNKNOWN")))
            .mount(&server)
            .await;

        let p = provider(&server);

        let running = p.get_progress("task-run").await.unwrap();
        assert_eq!(running.stage, ProviderStage::DiffusingFrames);

        let failed = p.get_progress("task-failed").await.unwrap();
        assert_eq!(failed.stage, ProviderStage::Failed);
        assert!(failed.message.contains("inappropriate"));

        assert!(matches!(
            p.get_progress("task-gone").await,
            Err(ProviderError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_final_asset_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tasks/task-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "output": {
                    "task_id": "task-1",
                    "task_status": "SUCCEEDED",
                    "video_url": "https://dashscope-result/v.mp4"
                },
                "usage": { "video_duration": 5 }
            })))
            .mount(&server)
            .await;

        let p = provider(&server);
        let lookup = p.as_final_asset_url().unwrap();
        assert_eq!(
            lookup.final_asset_url("task-1").await.unwrap(),
            "https://dashscope-result/v.mp4"
        );
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = provider(&server).get_progress("task-1").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
