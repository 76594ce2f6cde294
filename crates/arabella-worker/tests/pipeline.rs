//! End-to-end worker tests over in-memory back ends and scripted providers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;

use arabella_models::{
    AiProvider, AspectRatio, JobId, JobStatus, ProviderCapabilities, ProviderHealth,
    ProviderStage, QualityTier, Resolution, Template, User, UserTier, VideoJob, VideoParams,
    WsMessage,
};
use arabella_providers::{
    FinalAssetUrl, GenerationProgress, GenerationRequest, GenerationResult, MockProvider,
    ProviderError, ProviderRegistry, ProviderResult, ProviderSelector, VideoProvider,
};
use arabella_queue::{JobQueue, MemoryJobQueue};
use arabella_store::{JobRepository, MemoryStore};
use arabella_worker::{
    EventBroadcaster, JobOutcome, VideoWorker, WorkerConfig, WorkerDeps,
};

#[derive(Default)]
struct RecordingBroadcaster {
    events: Mutex<Vec<(JobId, WsMessage)>>,
}

impl RecordingBroadcaster {
    fn types(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| m.event_type())
            .collect()
    }

    fn messages(&self) -> Vec<WsMessage> {
        self.events.lock().unwrap().iter().map(|(_, m)| m.clone()).collect()
    }
}

#[async_trait]
impl EventBroadcaster for RecordingBroadcaster {
    async fn broadcast_to_job(&self, job_id: &JobId, message: &WsMessage) {
        self.events.lock().unwrap().push((job_id.clone(), message.clone()));
    }

    async fn broadcast_to_user(&self, _user_id: &str, _message: &WsMessage) {}
}

#[derive(Clone, Copy)]
enum Step {
    Progress(u8, ProviderStage),
    Error,
}

/// Provider that always hands back a handle and replays a poll script.
///
/// Once the script runs out, `fallback` repeats forever.
struct ScriptedProvider {
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    reject: bool,
    generated: AtomicUsize,
    polls: AtomicUsize,
    cancels: AtomicUsize,
}

impl ScriptedProvider {
    fn new(script: Vec<Step>, fallback: Step) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            reject: false,
            generated: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
        }
    }

    fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::new(Vec::new(), Step::Error)
        }
    }
}

#[async_trait]
impl VideoProvider for ScriptedProvider {
    fn name(&self) -> AiProvider {
        AiProvider::Runway
    }

    async fn generate_video(&self, request: &GenerationRequest) -> ProviderResult<GenerationResult> {
        self.generated.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Err(ProviderError::generation_failed("prompt rejected"));
        }
        Ok(GenerationResult::pending(format!("task-{}", request.job_id)))
    }

    async fn get_progress(&self, _provider_job_id: &str) -> ProviderResult<GenerationProgress> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().unwrap().pop_front().unwrap_or(self.fallback);
        match step {
            Step::Progress(percent, stage) => Ok(GenerationProgress::new(
                percent,
                stage,
                format!("{} at {}%", stage, percent),
            )),
            Step::Error => Err(ProviderError::unavailable("connection reset")),
        }
    }

    async fn cancel_generation(&self, _provider_job_id: &str) -> ProviderResult<()> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            name: "Scripted".to_string(),
            max_duration: 60,
            max_resolution: Resolution::Uhd4k,
            supported_ratios: vec![AspectRatio::LANDSCAPE],
            estimated_time: 10,
            quality_tier: QualityTier::Standard,
            supports_styles: false,
            cost_per_second: 0.0,
        }
    }

    async fn health_check(&self) -> ProviderHealth {
        ProviderHealth::healthy(1)
    }

    fn as_final_asset_url(&self) -> Option<&dyn FinalAssetUrl> {
        Some(self)
    }
}

#[async_trait]
impl FinalAssetUrl for ScriptedProvider {
    async fn final_asset_url(&self, provider_job_id: &str) -> ProviderResult<String> {
        Ok(format!("https://cdn.test/{}.mp4", provider_job_id))
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    queue: Arc<MemoryJobQueue>,
    events: Arc<RecordingBroadcaster>,
    worker: Arc<VideoWorker>,
    user: User,
    template: Template,
}

async fn harness(provider: Arc<dyn VideoProvider>, config: WorkerConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let user = User::new("ada@example.com", "Ada").with_tier(UserTier::Pro).with_credits(10);
    let mut template = Template::new("Ocean", "nature", "Ocean waves");
    template.thumbnail_url = "https://cdn.test/ocean.jpg".to_string();
    store.insert_user(user.clone()).await;
    store.insert_template(template.clone()).await;

    let mut registry = ProviderRegistry::new();
    registry.register(provider);
    let selector = ProviderSelector::new(Arc::new(registry));

    let queue = Arc::new(MemoryJobQueue::default());
    let events = Arc::new(RecordingBroadcaster::default());
    let deps = WorkerDeps {
        queue: queue.clone(),
        jobs: store.clone(),
        users: store.clone(),
        templates: store.clone(),
        selector: Arc::new(selector),
        broadcaster: events.clone(),
    };

    Harness {
        store,
        queue,
        events,
        worker: Arc::new(VideoWorker::new(deps, config)),
        user,
        template,
    }
}

impl Harness {
    async fn enqueue(&self) -> VideoJob {
        let job = VideoJob::new(
            self.user.id.clone(),
            self.template.id.clone(),
            "Ocean waves. At sunset",
            VideoParams::default(),
            self.template.credit_cost,
        );
        self.store.create_job(&job).await.unwrap();
        self.queue.enqueue(&job).await.unwrap();
        job
    }

    async fn stored(&self, job: &VideoJob) -> VideoJob {
        self.store.get_job(&job.id).await.unwrap()
    }

    /// Dequeue and process one job inline.
    async fn process_next(&self) -> JobOutcome {
        let (_shutdown, rx) = watch::channel(false);
        let job = self.worker.next_job().await.expect("a queued job");
        self.worker.processor().process(job, rx).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_immediate_result_completes_job() {
    let h = harness(Arc::new(MockProvider::new(false)), WorkerConfig::default()).await;
    let job = h.enqueue().await;

    assert_eq!(h.process_next().await, JobOutcome::Completed);

    let stored = h.stored(&job).await;
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.progress, 100);
    assert_eq!(stored.provider, Some(AiProvider::Mock));
    assert_eq!(stored.duration_seconds, Some(15));
    assert!(stored.video_url.is_some());
    assert!(stored.thumbnail_url.is_some());

    let types = h.events.types();
    assert_eq!(types.iter().filter(|t| **t == "completed").count(), 1);
    assert!(!types.contains(&"progress_update"));
    assert!(!types.contains(&"failed"));

    let snapshot = h.queue.job_status(&job.id).await.unwrap().unwrap();
    assert_eq!(snapshot.status, JobStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_polled_job_broadcasts_progress_then_completion() {
    let provider = Arc::new(ScriptedProvider::new(
        vec![
            Step::Progress(10, ProviderStage::Processing),
            Step::Progress(45, ProviderStage::Processing),
            Step::Progress(80, ProviderStage::Processing),
            Step::Progress(100, ProviderStage::Completed),
        ],
        Step::Error,
    ));
    let h = harness(provider.clone(), WorkerConfig::default()).await;
    let job = h.enqueue().await;

    assert_eq!(h.process_next().await, JobOutcome::Completed);

    assert_eq!(
        h.events.types(),
        vec![
            "status_update",
            "progress_update",
            "progress_update",
            "progress_update",
            "completed"
        ]
    );
    let reported: Vec<u8> = h
        .events
        .messages()
        .into_iter()
        .filter_map(|m| match m {
            WsMessage::ProgressUpdate { progress, .. } => Some(progress),
            _ => None,
        })
        .collect();
    assert_eq!(reported, vec![10, 45, 80]);

    let stored = h.stored(&job).await;
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.progress, 100);
    assert_eq!(
        stored.video_url.as_deref(),
        Some(format!("https://cdn.test/task-{}.mp4", job.id).as_str())
    );
    assert_eq!(stored.provider_job_id, Some(format!("task-{}", job.id)));
    assert_eq!(provider.polls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_poll_errors_fail_job() {
    let provider = Arc::new(ScriptedProvider::new(Vec::new(), Step::Error));
    let h = harness(provider.clone(), WorkerConfig::default()).await;
    let job = h.enqueue().await;

    assert_eq!(h.process_next().await, JobOutcome::Failed);

    let stored = h.stored(&job).await;
    assert_eq!(stored.status, JobStatus::Failed);
    let message = stored.error_message.unwrap();
    assert!(message.contains("consecutive polling errors"), "{}", message);
    assert!(message.contains("after 5 attempts"), "{}", message);

    assert_eq!(provider.polls.load(Ordering::SeqCst), 5);
    assert!(!h.events.types().contains(&"completed"));
    assert_eq!(h.events.types().last(), Some(&"failed"));
}

#[tokio::test(start_paused = true)]
async fn test_one_success_resets_error_count() {
    let provider = Arc::new(ScriptedProvider::new(
        vec![
            Step::Error,
            Step::Error,
            Step::Error,
            Step::Error,
            Step::Progress(50, ProviderStage::DiffusingFrames),
            Step::Error,
            Step::Error,
            Step::Error,
            Step::Error,
            Step::Progress(100, ProviderStage::Completed),
        ],
        Step::Error,
    ));
    let h = harness(provider.clone(), WorkerConfig::default()).await;
    let job = h.enqueue().await;

    assert_eq!(h.process_next().await, JobOutcome::Completed);
    assert_eq!(provider.polls.load(Ordering::SeqCst), 10);
    assert_eq!(h.stored(&job).await.status, JobStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_provider_failure_stage_fails_job() {
    let provider = Arc::new(ScriptedProvider::new(
        vec![Step::Progress(30, ProviderStage::Uploading)],
        Step::Progress(0, ProviderStage::Failed),
    ));
    let h = harness(provider, WorkerConfig::default()).await;
    let job = h.enqueue().await;

    assert_eq!(h.process_next().await, JobOutcome::Failed);

    let stored = h.stored(&job).await;
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.error_message.as_deref(), Some("FAILED at 0%"));
    assert_eq!(stored.progress, 30);
}

#[tokio::test(start_paused = true)]
async fn test_generation_error_fails_without_retry() {
    let provider = Arc::new(ScriptedProvider::rejecting());
    let h = harness(provider.clone(), WorkerConfig::default()).await;
    let job = h.enqueue().await;

    assert_eq!(h.process_next().await, JobOutcome::Failed);

    let stored = h.stored(&job).await;
    assert!(stored
        .error_message
        .unwrap()
        .starts_with("Video generation failed:"));
    assert_eq!(stored.provider, Some(AiProvider::Runway));
    assert_eq!(provider.generated.load(Ordering::SeqCst), 1);
    assert_eq!(h.events.types(), vec!["status_update", "failed"]);
}

#[tokio::test(start_paused = true)]
async fn test_poll_budget_exhaustion_times_out() {
    let provider = Arc::new(ScriptedProvider::new(
        Vec::new(),
        Step::Progress(20, ProviderStage::Processing),
    ));
    let config = WorkerConfig {
        max_poll_attempts: 3,
        ..Default::default()
    };
    let h = harness(provider.clone(), config).await;
    let job = h.enqueue().await;

    assert_eq!(h.process_next().await, JobOutcome::Failed);

    let stored = h.stored(&job).await;
    assert_eq!(
        stored.error_message.as_deref(),
        Some("Video generation timeout after 15 seconds")
    );
    assert_eq!(provider.polls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_polling_wins() {
    let provider = Arc::new(ScriptedProvider::new(
        Vec::new(),
        Step::Progress(10, ProviderStage::Processing),
    ));
    let h = harness(provider.clone(), WorkerConfig::default()).await;
    let job = h.enqueue().await;

    let (_shutdown, rx) = watch::channel(false);
    let queued = h.worker.next_job().await.unwrap();
    let processor = h.worker.processor().clone();
    let task = tokio::spawn(async move { processor.process(queued, rx).await });

    // First poll lands at 5s
    tokio::time::sleep(Duration::from_secs(7)).await;
    let mut current = h.stored(&job).await;
    assert_eq!(current.status, JobStatus::Processing);
    current.cancel().unwrap();
    h.store.update_job(&current).await.unwrap();

    let outcome = task.await.unwrap();
    assert_eq!(outcome, JobOutcome::Superseded(JobStatus::Cancelled));

    let stored = h.stored(&job).await;
    assert_eq!(stored.status, JobStatus::Cancelled);
    assert!(stored.video_url.is_none());
    assert_eq!(provider.cancels.load(Ordering::SeqCst), 1);
    assert!(!h.events.types().contains(&"completed"));
    assert_eq!(
        h.events.types().iter().filter(|t| **t == "progress_update").count(),
        1
    );
}

#[tokio::test]
async fn test_cancelled_queued_job_is_skipped() {
    let provider = Arc::new(ScriptedProvider::new(Vec::new(), Step::Error));
    let h = harness(provider.clone(), WorkerConfig::default()).await;
    let mut job = h.enqueue().await;

    job.cancel().unwrap();
    h.store.update_job(&job).await.unwrap();

    assert!(h.worker.next_job().await.is_none());
    assert_eq!(provider.generated.load(Ordering::SeqCst), 0);
    assert_eq!(h.queue.depth().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_run_processes_queue_in_order() {
    let h = harness(Arc::new(MockProvider::new(false)), WorkerConfig::default()).await;
    let first = h.enqueue().await;
    let second = h.enqueue().await;

    let worker = h.worker.clone();
    let runner = tokio::spawn(async move { worker.run().await });

    tokio::time::sleep(Duration::from_secs(5)).await;
    h.worker.shutdown();
    runner.await.unwrap().unwrap();

    let a = h.stored(&first).await;
    let b = h.stored(&second).await;
    assert_eq!(a.status, JobStatus::Completed);
    assert_eq!(b.status, JobStatus::Completed);
    assert!(a.started_at <= b.started_at);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_in_flight_polling() {
    let provider = Arc::new(ScriptedProvider::new(
        Vec::new(),
        Step::Progress(10, ProviderStage::Processing),
    ));
    let h = harness(provider, WorkerConfig::default()).await;
    let job = h.enqueue().await;

    let worker = h.worker.clone();
    let runner = tokio::spawn(async move { worker.run().await });

    tokio::time::sleep(Duration::from_secs(8)).await;
    let stop_requested = Instant::now();
    h.worker.shutdown();
    runner.await.unwrap().unwrap();

    assert!(stop_requested.elapsed() < Duration::from_secs(1));
    let stored = h.stored(&job).await;
    assert_eq!(stored.status, JobStatus::Processing);
    assert_eq!(stored.progress, 10);
}
