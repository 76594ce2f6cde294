//! Queue contract shared by all back ends.

use async_trait::async_trait;

use arabella_models::{JobId, JobStatus, JobStatusSnapshot, VideoJob};

use crate::error::QueueResult;

/// FIFO job queue with a side-band status projection.
///
/// Payload and queue entry are written and removed together. The status
/// projection is independent and expires on its own.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Persist the payload and append the job to the queue.
    ///
    /// Returns an error unless both writes succeeded.
    async fn enqueue(&self, job: &VideoJob) -> QueueResult<()>;

    /// Pop the oldest job. `None` when the queue is empty or the payload expired.
    async fn dequeue(&self) -> QueueResult<Option<VideoJob>>;

    /// 0-based rank, `None` when the job is not queued.
    async fn queue_position(&self, job_id: &JobId) -> QueueResult<Option<u64>>;

    /// Write the short-lived status projection.
    async fn update_job_status(
        &self,
        job_id: &JobId,
        status: JobStatus,
        progress: u8,
    ) -> QueueResult<()>;

    /// Read the status projection, if still present.
    async fn job_status(&self, job_id: &JobId) -> QueueResult<Option<JobStatusSnapshot>>;

    /// Drop a queued job and its payload. Returns whether it was queued.
    async fn remove_job(&self, job_id: &JobId) -> QueueResult<bool>;

    /// Number of queued jobs.
    async fn depth(&self) -> QueueResult<u64>;

    /// First `count` job ids in dequeue order.
    async fn peek(&self, count: usize) -> QueueResult<Vec<JobId>>;
}
