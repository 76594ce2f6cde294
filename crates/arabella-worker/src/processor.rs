//! Per-job state machine.
//!
//! A job moves `pending -> processing`, gets a provider bound and persisted,
//! is dispatched, and then either completes immediately or is polled until
//! the provider reports a terminal stage. Every status change is persisted,
//! projected to the queue's status cache and broadcast, in that order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{warn, Instrument};

use arabella_models::{JobStatus, ProviderStage, VideoJob, WsMessage};
use arabella_providers::{
    GenerationProgress, GenerationRequest, ProviderResult, ProviderSelector, SelectionCriteria,
    VideoProvider,
};
use arabella_queue::JobQueue;
use arabella_store::{JobRepository, StoreError, TemplateRepository, UserRepository};

use crate::broadcaster::EventBroadcaster;
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::retry::{PollErrors, PollVerdict};

/// Everything the worker talks to.
#[derive(Clone)]
pub struct WorkerDeps {
    pub queue: Arc<dyn JobQueue>,
    pub jobs: Arc<dyn JobRepository>,
    pub users: Arc<dyn UserRepository>,
    pub templates: Arc<dyn TemplateRepository>,
    pub selector: Arc<ProviderSelector>,
    pub broadcaster: Arc<dyn EventBroadcaster>,
}

/// How a job task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
    /// Shutdown was requested while the job was in flight
    Interrupted,
    /// The stored job reached a terminal status through another writer
    Superseded(JobStatus),
}

/// Result of one progress poll.
enum PollStatus {
    Running(GenerationProgress),
    /// Final asset URL, or `None` when the provider cannot report one
    Succeeded(Option<String>),
    Failed(String),
}

fn describe_budget(budget: Duration) -> String {
    let secs = budget.as_secs();
    if secs >= 60 {
        format!("{} minutes", secs / 60)
    } else {
        format!("{} seconds", secs)
    }
}

#[derive(Clone)]
pub struct JobProcessor {
    deps: WorkerDeps,
    config: WorkerConfig,
}

impl JobProcessor {
    pub fn new(deps: WorkerDeps, config: WorkerConfig) -> Self {
        Self { deps, config }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub(crate) fn deps(&self) -> &WorkerDeps {
        &self.deps
    }

    /// Drive `job` to a terminal status, or until shutdown is signalled.
    pub async fn process(&self, mut job: VideoJob, mut shutdown: watch::Receiver<bool>) -> JobOutcome {
        let mut logger = JobLogger::new(&job.id, "video_generation");
        let span = logger.create_span();

        async move {
            let started = Instant::now();
            metrics::record_job_started();

            let outcome = match self.run(&mut job, &mut logger, &mut shutdown).await {
                Ok(outcome) => outcome,
                Err(e) => match e.superseded_by() {
                    Some(status) => {
                        logger.log_warning(&format!("Job became {} elsewhere, stopping", status));
                        self.cancel_remote(&job, &logger).await;
                        JobOutcome::Superseded(status)
                    }
                    None => self.abort(&mut job, &logger, e).await,
                },
            };

            match outcome {
                JobOutcome::Completed => metrics::record_job_completed(job.provider, started.elapsed()),
                JobOutcome::Failed => metrics::record_job_failed(job.provider),
                JobOutcome::Interrupted | JobOutcome::Superseded(_) => {}
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        job: &mut VideoJob,
        logger: &mut JobLogger,
        shutdown: &mut watch::Receiver<bool>,
    ) -> WorkerResult<JobOutcome> {
        logger.log_start(&format!(
            "template={} duration={}s resolution={}",
            job.template_id, job.params.duration, job.params.resolution
        ));

        job.start_processing()?;
        self.publish(job, WsMessage::status_update(job)).await?;

        let template = match self.deps.templates.get_template(&job.template_id).await {
            Ok(template) => template,
            Err(e) => return self.fail(job, logger, format!("Failed to get template: {}", e)).await,
        };
        let user = match self.deps.users.get_user(&job.user_id).await {
            Ok(user) => user,
            Err(e) => return self.fail(job, logger, format!("Failed to get user: {}", e)).await,
        };

        let criteria = SelectionCriteria::for_job(job, user.tier);
        let provider = match self.deps.selector.select(&criteria).await {
            Ok(provider) => provider,
            Err(e) => {
                return self
                    .fail(job, logger, format!("Failed to select provider: {}", e))
                    .await
            }
        };

        // Binding is durable before the provider is called
        job.bind_provider(provider.name())?;
        *logger = logger.clone().with_provider(provider.name());
        self.persist(job).await?;

        let request = GenerationRequest {
            job_id: job.id.clone(),
            prompt: job.prompt.clone(),
            params: job.params.clone(),
            template_id: job.template_id.clone(),
            seed_image_url: Some(template.thumbnail_url).filter(|url| !url.is_empty()),
            user_tier: user.tier,
        };

        let result = match provider.generate_video(&request).await {
            Ok(result) => result,
            Err(e) => return self.fail(job, logger, format!("Video generation failed: {}", e)).await,
        };
        job.set_provider_job_id(result.provider_job_id.clone())?;

        if let Some(url) = result.video_url.clone().filter(|url| !url.is_empty()) {
            let duration = self.resolve_duration(result.duration_seconds, job);
            let thumbnail = result.thumbnail_url.clone().filter(|url| !url.is_empty());
            return self.complete(job, logger, url, thumbnail, duration).await;
        }

        self.persist(job).await?;
        logger.log_progress(
            job.progress,
            &format!("polling provider job {}", result.provider_job_id),
        );
        self.poll(job, logger, provider.as_ref(), &result.provider_job_id, shutdown)
            .await
    }

    async fn poll(
        &self,
        job: &mut VideoJob,
        logger: &JobLogger,
        provider: &dyn VideoProvider,
        handle: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) -> WorkerResult<JobOutcome> {
        let period = self.config.poll_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut errors = PollErrors::new(self.config.max_consecutive_errors);
        let mut attempts = 0u32;

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        logger.log_warning("Shutdown requested, leaving job in flight");
                        return Ok(JobOutcome::Interrupted);
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            attempts += 1;
            if attempts > self.config.max_poll_attempts {
                let message = format!(
                    "Video generation timeout after {}",
                    describe_budget(self.config.poll_budget())
                );
                return self.fail(job, logger, message).await;
            }

            let status = match self.poll_once(provider, handle).await {
                Ok(status) => {
                    errors.reset();
                    status
                }
                Err(e) => {
                    metrics::record_poll_error(provider.name());
                    match errors.record() {
                        PollVerdict::GiveUp => {
                            let message = format!(
                                "Too many consecutive polling errors: failed to get progress after {} attempts: {}",
                                errors.streak(),
                                e
                            );
                            return self.fail(job, logger, message).await;
                        }
                        PollVerdict::Log => logger.log_warning(&format!(
                            "Progress poll failed ({} in a row): {}",
                            errors.streak(),
                            e
                        )),
                        PollVerdict::Quiet => {}
                    }
                    continue;
                }
            };

            match status {
                PollStatus::Succeeded(Some(url)) => {
                    let duration = self.resolve_duration(None, job);
                    return self.complete(job, logger, url, None, duration).await;
                }
                PollStatus::Succeeded(None) => {
                    return self
                        .fail(job, logger, "Provider reported completion without a video URL")
                        .await;
                }
                PollStatus::Failed(message) => return self.fail(job, logger, message).await,
                PollStatus::Running(progress) => {
                    let status = progress.stage.job_status().unwrap_or(job.status);
                    job.update_progress(progress.percent, status)?;
                    logger.log_progress(job.progress, &progress.message);

                    let event = WsMessage::progress_update(job, progress.message);
                    match self.publish(job, event).await {
                        Ok(()) => {}
                        Err(WorkerError::Store(e)) => {
                            logger.log_warning(&format!("Failed to persist progress: {}", e))
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }

    /// One progress read; a final URL lookup failure counts as a poll error.
    async fn poll_once(&self, provider: &dyn VideoProvider, handle: &str) -> ProviderResult<PollStatus> {
        let progress = provider.get_progress(handle).await?;
        match progress.stage {
            ProviderStage::Completed => match provider.as_final_asset_url() {
                Some(lookup) => Ok(PollStatus::Succeeded(Some(lookup.final_asset_url(handle).await?))),
                None => Ok(PollStatus::Succeeded(None)),
            },
            ProviderStage::Failed if progress.message.is_empty() => {
                Ok(PollStatus::Failed("Video generation failed".to_string()))
            }
            ProviderStage::Failed => Ok(PollStatus::Failed(progress.message)),
            _ => Ok(PollStatus::Running(progress)),
        }
    }

    fn resolve_duration(&self, reported: Option<u32>, job: &VideoJob) -> u32 {
        reported
            .filter(|d| *d > 0)
            .or(Some(job.params.duration).filter(|d| *d > 0))
            .unwrap_or(self.config.default_duration_secs)
    }

    async fn complete(
        &self,
        job: &mut VideoJob,
        logger: &JobLogger,
        video_url: String,
        thumbnail_url: Option<String>,
        duration: u32,
    ) -> WorkerResult<JobOutcome> {
        job.complete(video_url, thumbnail_url, duration)?;
        self.publish(job, WsMessage::completed(job)).await?;
        logger.log_completion(job.video_url.as_deref().unwrap_or_default());
        Ok(JobOutcome::Completed)
    }

    async fn fail(
        &self,
        job: &mut VideoJob,
        logger: &JobLogger,
        message: impl Into<String>,
    ) -> WorkerResult<JobOutcome> {
        let message = message.into();
        logger.log_error(&message);
        job.fail(message)?;
        self.publish(job, WsMessage::failed(job)).await?;
        Ok(JobOutcome::Failed)
    }

    /// Last resort for infrastructure errors: record the failure if the job
    /// is still live.
    async fn abort(&self, job: &mut VideoJob, logger: &JobLogger, error: WorkerError) -> JobOutcome {
        logger.log_error(&format!("Processing aborted: {}", error));
        if job.is_terminal() {
            return JobOutcome::Failed;
        }
        match self.fail(job, logger, format!("Worker error: {}", error)).await {
            Ok(outcome) => outcome,
            Err(e) => match e.superseded_by() {
                Some(status) => JobOutcome::Superseded(status),
                None => {
                    logger.log_error(&format!("Could not record failure: {}", e));
                    JobOutcome::Failed
                }
            },
        }
    }

    /// Best-effort cancel of the remote generation for a job that was
    /// finished elsewhere.
    async fn cancel_remote(&self, job: &VideoJob, logger: &JobLogger) {
        if job.is_terminal() {
            return;
        }
        let (Some(name), Some(handle)) = (job.provider, job.provider_job_id.as_deref()) else {
            return;
        };
        let Some(provider) = self.deps.selector.registry().get(name) else {
            return;
        };
        if let Err(e) = provider.cancel_generation(handle).await {
            logger.log_warning(&format!("Provider cancel failed: {}", e));
        }
    }

    /// Persist, project, broadcast.
    async fn publish(&self, job: &VideoJob, event: WsMessage) -> WorkerResult<()> {
        self.persist(job).await?;
        if let Err(e) = self
            .deps
            .queue
            .update_job_status(&job.id, job.status, job.progress)
            .await
        {
            warn!(job_id = %job.id, error = %e, "Failed to update status projection");
        }
        self.deps.broadcaster.broadcast_to_job(&job.id, &event).await;
        Ok(())
    }

    async fn persist(&self, job: &VideoJob) -> WorkerResult<()> {
        self.deps.jobs.update_job(job).await.map_err(|e| match e {
            StoreError::JobAlreadyTerminal(status) => WorkerError::JobAlreadyTerminal(status),
            other => other.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_budget() {
        assert_eq!(describe_budget(Duration::from_secs(1800)), "30 minutes");
        assert_eq!(describe_budget(Duration::from_secs(15)), "15 seconds");
    }
}
