//! Generation intake and cancellation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use validator::Validate;

use arabella_models::{JobId, JobStatus, VideoJob, VideoParamsOverride, WsMessage};
use arabella_queue::JobQueue;
use arabella_store::{JobFilter, JobRepository, TemplateRepository, UserRepository};
use arabella_worker::EventBroadcaster;

use crate::error::{ApiError, ApiResult};
use crate::metrics;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

/// Body of `POST /api/v1/videos/generate`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GenerateVideoRequest {
    #[validate(length(min = 1, message = "template_id is required"))]
    pub template_id: String,
    #[validate(length(min = 10, max = 2000, message = "prompt must be 10-2000 characters"))]
    pub prompt: String,
    #[serde(default)]
    pub params: Option<VideoParamsOverride>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Seconds until the video should be ready
    pub estimated_time: u64,
    /// Jobs ahead of this one
    pub queue_position: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobPage {
    pub jobs: Vec<VideoJob>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u64,
}

/// Lightweight status for polling clients.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Clamp listing parameters: page defaults to 1, page size to 20 (max 100).
fn normalize_page(page: Option<u32>, page_size: Option<u32>) -> (u32, u32) {
    let page = page.filter(|p| *p >= 1).unwrap_or(1);
    let page_size = page_size
        .filter(|s| (1..=MAX_PAGE_SIZE).contains(s))
        .unwrap_or(DEFAULT_PAGE_SIZE);
    (page, page_size)
}

/// Creates, reads and cancels jobs on behalf of users.
#[derive(Clone)]
pub struct GenerationService {
    jobs: Arc<dyn JobRepository>,
    users: Arc<dyn UserRepository>,
    templates: Arc<dyn TemplateRepository>,
    queue: Arc<dyn JobQueue>,
    broadcaster: Arc<dyn EventBroadcaster>,
    wait_per_position: Duration,
}

impl GenerationService {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        users: Arc<dyn UserRepository>,
        templates: Arc<dyn TemplateRepository>,
        queue: Arc<dyn JobQueue>,
        broadcaster: Arc<dyn EventBroadcaster>,
    ) -> Self {
        Self {
            jobs,
            users,
            templates,
            queue,
            broadcaster,
            wait_per_position: Duration::from_secs(30),
        }
    }

    pub fn with_wait_per_position(mut self, wait: Duration) -> Self {
        self.wait_per_position = wait;
        self
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    /// Validate, charge and enqueue a new job.
    pub async fn generate(
        &self,
        user_id: &str,
        request: GenerateVideoRequest,
    ) -> ApiResult<GenerationResponse> {
        request.validate()?;

        let user = self.users.get_user(user_id).await?;
        let template = self.templates.get_template(&request.template_id).await?;

        if !template.is_active {
            return Err(ApiError::TemplateNotActive);
        }
        if template.is_premium && !user.is_premium() {
            return Err(ApiError::TemplatePremiumOnly);
        }
        if !user.has_sufficient_credits(template.credit_cost) {
            return Err(ApiError::InsufficientCredits {
                needed: template.credit_cost,
                available: user.credits,
            });
        }

        let params = template
            .default_params
            .merged_with(&request.params.unwrap_or_default());
        let mut job = VideoJob::new(
            &user.id,
            &template.id,
            template.resolve_prompt(&request.prompt),
            params,
            template.credit_cost,
        )
        .with_preferred_provider(template.preferred_provider);

        // Atomic check-and-debit; a concurrent request may have drained the balance.
        self.users
            .debit_credits(&user.id, template.credit_cost)
            .await?;

        if let Err(e) = self.jobs.create_job(&job).await {
            error!(job_id = %job.id, "Failed to persist job: {}", e);
            self.refund(&user.id, template.credit_cost).await;
            return Err(e.into());
        }

        if let Err(e) = self.templates.increment_usage(&template.id).await {
            warn!(template_id = %template.id, "Failed to increment template usage: {}", e);
        }

        if let Err(e) = self.queue.enqueue(&job).await {
            error!(job_id = %job.id, "Failed to enqueue job: {}", e);
            if job.fail("Failed to enqueue job").is_ok() {
                if let Err(update_err) = self.jobs.update_job(&job).await {
                    warn!(job_id = %job.id, "Failed to mark job failed: {}", update_err);
                }
            }
            self.refund(&user.id, template.credit_cost).await;
            return Err(e.into());
        }

        if let Err(e) = self
            .queue
            .update_job_status(&job.id, job.status, job.progress)
            .await
        {
            warn!(job_id = %job.id, "Failed to write status projection: {}", e);
        }

        let queue_position = match self.queue.queue_position(&job.id).await {
            Ok(position) => position.unwrap_or(0),
            Err(e) => {
                warn!(job_id = %job.id, "Failed to read queue position: {}", e);
                0
            }
        };
        let estimated_time = u64::from(template.estimated_time_secs)
            + queue_position * self.wait_per_position.as_secs();

        metrics::record_job_enqueued(&template.id);
        info!(
            job_id = %job.id,
            user_id = %user.id,
            template_id = %template.id,
            credits = template.credit_cost,
            queue_position,
            "Video generation job enqueued"
        );

        Ok(GenerationResponse {
            job_id: job.id,
            status: job.status,
            estimated_time,
            queue_position,
        })
    }

    /// Cancel a pending or processing job and refund its credits.
    pub async fn cancel(&self, user_id: &str, job_id: &JobId) -> ApiResult<VideoJob> {
        let job = self.owned_job(user_id, job_id).await?;
        if !job.can_be_cancelled() {
            return Err(ApiError::JobCannotBeCancelled(job.status));
        }

        // Re-checked against the stored status
        let job = self.jobs.cancel_job(job_id).await?;

        match self.queue.remove_job(job_id).await {
            Ok(true) => info!(job_id = %job_id, "Removed cancelled job from queue"),
            Ok(false) => {}
            Err(e) => warn!(job_id = %job_id, "Failed to remove job from queue: {}", e),
        }

        if job.credits_charged > 0 {
            self.refund(user_id, job.credits_charged).await;
        }

        if let Err(e) = self
            .queue
            .update_job_status(job_id, job.status, job.progress)
            .await
        {
            warn!(job_id = %job_id, "Failed to write status projection: {}", e);
        }

        self.broadcaster
            .broadcast_to_job(job_id, &WsMessage::cancelled(job_id))
            .await;

        metrics::record_job_cancelled();
        info!(
            job_id = %job_id,
            user_id = %user_id,
            refunded = job.credits_charged,
            "Job cancelled"
        );
        Ok(job)
    }

    pub async fn job(&self, user_id: &str, job_id: &JobId) -> ApiResult<VideoJob> {
        self.owned_job(user_id, job_id).await
    }

    /// Newest first, optionally filtered by status.
    pub async fn jobs_for_user(
        &self,
        user_id: &str,
        status: Option<JobStatus>,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> ApiResult<JobPage> {
        let (page, page_size) = normalize_page(page, page_size);
        let filter = JobFilter {
            user_id: Some(user_id.to_string()),
            status,
        };
        let offset = ((page - 1) as usize) * page_size as usize;
        let (jobs, total) = self
            .jobs
            .list_jobs(&filter, offset, page_size as usize)
            .await?;

        Ok(JobPage {
            jobs,
            total,
            page,
            page_size,
            total_pages: total.div_ceil(u64::from(page_size)),
        })
    }

    /// Status for polling clients.
    ///
    /// The queue projection is used when it is newer than the stored job.
    pub async fn queue_status(&self, user_id: &str, job_id: &JobId) -> ApiResult<JobStatusView> {
        let job = self.owned_job(user_id, job_id).await?;

        let mut view = JobStatusView {
            job_id: job.id.clone(),
            status: job.status,
            progress: job.progress,
            queue_position: None,
            error_message: job.error_message.clone(),
            updated_at: job.updated_at,
        };

        match self.queue.job_status(job_id).await {
            Ok(Some(snapshot))
                if snapshot.updated_at > job.updated_at.timestamp() && !job.is_terminal() =>
            {
                view.status = snapshot.status;
                view.progress = snapshot.progress.max(job.progress);
                if let Some(at) = DateTime::from_timestamp(snapshot.updated_at, 0) {
                    view.updated_at = at;
                }
            }
            Ok(_) => {}
            Err(e) => warn!(job_id = %job_id, "Failed to read status projection: {}", e),
        }

        if view.status == JobStatus::Pending {
            match self.queue.queue_position(job_id).await {
                Ok(position) => view.queue_position = position,
                Err(e) => warn!(job_id = %job_id, "Failed to read queue position: {}", e),
            }
        }

        Ok(view)
    }

    async fn owned_job(&self, user_id: &str, job_id: &JobId) -> ApiResult<VideoJob> {
        let job = self.jobs.get_job(job_id).await?;
        if job.user_id != user_id {
            warn!(job_id = %job_id, user_id = %user_id, "Rejected access to another user's job");
            return Err(ApiError::forbidden("You do not have access to this job"));
        }
        Ok(job)
    }

    async fn refund(&self, user_id: &str, amount: u32) {
        match self.users.refund_credits(user_id, amount).await {
            Ok(balance) => info!(user_id = %user_id, amount, balance, "Credits refunded"),
            Err(e) => error!(user_id = %user_id, amount, "Failed to refund credits: {}", e),
        }
    }
}
