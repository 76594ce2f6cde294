//! Cached job status projection.
//!
//! A short-lived snapshot stored next to the queue so "where is my job"
//! can be answered without reading the system of record. It may be
//! stale or absent and is never authoritative.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::JobStatus;

/// Status projection stored as `{status, progress, updated_at}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusSnapshot {
    pub status: JobStatus,
    pub progress: u8,
    /// Unix timestamp (seconds)
    pub updated_at: i64,
}

impl JobStatusSnapshot {
    pub fn new(status: JobStatus, progress: u8) -> Self {
        Self {
            status,
            progress,
            updated_at: Utc::now().timestamp(),
        }
    }

    /// Age of the snapshot in seconds.
    pub fn age_secs(&self) -> i64 {
        (Utc::now().timestamp() - self.updated_at).max(0)
    }
}
