//! Queue error types.

use std::fmt::Display;

use arabella_models::JobId;
use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue backend unreachable: {0}")]
    ConnectionFailed(String),

    #[error("Failed to enqueue job {job_id}: {reason}")]
    EnqueueFailed { job_id: JobId, reason: String },

    #[error("Failed to pop next job: {0}")]
    DequeueFailed(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Payload or status entry that does not decode.
    #[error("Malformed queue entry: {0}")]
    Codec(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn enqueue_failed(job_id: &JobId, reason: impl Display) -> Self {
        Self::EnqueueFailed {
            job_id: job_id.clone(),
            reason: reason.to_string(),
        }
    }

    pub fn dequeue_failed(reason: impl Display) -> Self {
        Self::DequeueFailed(reason.to_string())
    }
}
