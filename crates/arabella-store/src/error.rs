//! Store error types.

use thiserror::Error;

use arabella_models::JobStatus;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Insufficient credits: need {needed}, have {available}")]
    InsufficientCredits { needed: u32, available: u32 },

    /// The stored job already reached a terminal status
    #[error("Job is already {0}")]
    JobAlreadyTerminal(JobStatus),

    #[error("Job cannot be cancelled while {0}")]
    NotCancellable(JobStatus),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Backend(_))
    }
}
