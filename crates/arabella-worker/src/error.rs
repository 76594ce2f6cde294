//! Worker error types.

use thiserror::Error;

use arabella_models::{JobStatus, TransitionError};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Another writer (usually a user cancel) finished the job first
    #[error("Job is already {0}")]
    JobAlreadyTerminal(JobStatus),

    #[error("Invalid job transition: {0}")]
    Transition(#[from] TransitionError),

    #[error("Store error: {0}")]
    Store(#[from] arabella_store::StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] arabella_queue::QueueError),

    #[error("Provider error: {0}")]
    Provider(#[from] arabella_providers::ProviderError),
}

impl WorkerError {
    /// Terminal status that ended processing, when the job was finished by
    /// someone else.
    pub fn superseded_by(&self) -> Option<JobStatus> {
        match self {
            WorkerError::JobAlreadyTerminal(status)
            | WorkerError::Transition(TransitionError::AlreadyTerminal(status)) => Some(*status),
            _ => None,
        }
    }
}
