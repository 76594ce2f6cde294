//! Repository contracts.

use async_trait::async_trait;

use arabella_models::{JobId, JobStatus, Template, User, VideoJob};

use crate::error::StoreResult;

/// Filter for job listings.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub user_id: Option<String>,
    pub status: Option<JobStatus>,
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create_job(&self, job: &VideoJob) -> StoreResult<()>;

    async fn get_job(&self, job_id: &JobId) -> StoreResult<VideoJob>;

    /// Replace the stored job.
    ///
    /// Fails with `JobAlreadyTerminal` when the stored copy is already
    /// completed, failed or cancelled, so the first terminal write wins.
    async fn update_job(&self, job: &VideoJob) -> StoreResult<()>;

    /// Move the stored job to `cancelled` if it is still pending or processing.
    ///
    /// The check and the transition happen on the stored copy, so a stage the
    /// worker wrote after the caller's last read is respected. Returns the
    /// cancelled job, or `NotCancellable` with the stored status.
    async fn cancel_job(&self, job_id: &JobId) -> StoreResult<VideoJob>;

    /// Newest first. Returns the page and the total match count.
    async fn list_jobs(
        &self,
        filter: &JobFilter,
        offset: usize,
        limit: usize,
    ) -> StoreResult<(Vec<VideoJob>, u64)>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user(&self, user_id: &str) -> StoreResult<User>;

    /// Atomically subtract `amount` if the balance covers it.
    ///
    /// Returns the remaining balance.
    async fn debit_credits(&self, user_id: &str, amount: u32) -> StoreResult<u32>;

    /// Add `amount` back. Returns the new balance.
    async fn refund_credits(&self, user_id: &str, amount: u32) -> StoreResult<u32>;
}

#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn get_template(&self, template_id: &str) -> StoreResult<Template>;

    async fn increment_usage(&self, template_id: &str) -> StoreResult<()>;
}
