//! Video generation job and its lifecycle.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::{AiProvider, VideoParams};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the queue
    #[default]
    Pending,
    /// Picked up by the worker, provider dispatch in flight
    Processing,
    /// Provider is rendering frames
    Diffusing,
    /// Provider is uploading the finished asset
    Uploading,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Diffusing => "diffusing",
            JobStatus::Uploading => "uploading",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = JobStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "diffusing" => Ok(JobStatus::Diffusing),
            "uploading" => Ok(JobStatus::Uploading),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(JobStatusParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown job status: {0}")]
pub struct JobStatusParseError(String);

/// Rejected lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("job is already {0}")]
    AlreadyTerminal(JobStatus),

    #[error("job cannot be cancelled while {0}")]
    NotCancellable(JobStatus),

    #[error("invalid transition from {from} to {to}")]
    Invalid { from: JobStatus, to: JobStatus },
}

/// A video generation job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VideoJob {
    pub id: JobId,
    pub user_id: String,
    pub template_id: String,

    /// Resolved prompt (template base prompt + user text)
    pub prompt: String,
    pub params: VideoParams,

    #[serde(default)]
    pub status: JobStatus,

    /// Progress (0-100)
    #[serde(default)]
    pub progress: u8,

    /// Provider the worker bound this job to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<AiProvider>,

    /// Provider requested by the template, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_provider: Option<AiProvider>,

    /// Opaque provider-assigned handle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_job_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,

    /// Realized duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u32>,

    /// Credits debited at creation time
    pub credits_charged: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Set on any terminal transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl VideoJob {
    /// Create a new pending job.
    pub fn new(
        user_id: impl Into<String>,
        template_id: impl Into<String>,
        prompt: impl Into<String>,
        params: VideoParams,
        credits_charged: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            user_id: user_id.into(),
            template_id: template_id.into(),
            prompt: prompt.into(),
            params,
            status: JobStatus::Pending,
            progress: 0,
            provider: None,
            preferred_provider: None,
            provider_job_id: None,
            video_url: None,
            thumbnail_url: None,
            duration_seconds: None,
            credits_charged,
            error_message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_preferred_provider(mut self, provider: Option<AiProvider>) -> Self {
        self.preferred_provider = provider;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn can_be_cancelled(&self) -> bool {
        self.status.is_cancellable()
    }

    fn ensure_live(&self) -> Result<(), TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::AlreadyTerminal(self.status));
        }
        Ok(())
    }

    /// Move a pending job into `processing`.
    pub fn start_processing(&mut self) -> Result<(), TransitionError> {
        self.ensure_live()?;
        if self.status != JobStatus::Pending {
            return Err(TransitionError::Invalid {
                from: self.status,
                to: JobStatus::Processing,
            });
        }
        let now = Utc::now();
        self.status = JobStatus::Processing;
        self.started_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Bind the provider selected for this job.
    pub fn bind_provider(&mut self, provider: AiProvider) -> Result<(), TransitionError> {
        self.ensure_live()?;
        self.provider = Some(provider);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn set_provider_job_id(&mut self, handle: impl Into<String>) -> Result<(), TransitionError> {
        self.ensure_live()?;
        self.provider_job_id = Some(handle.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record intermediate progress.
    ///
    /// Progress never moves backwards; a lower reading keeps the current value.
    pub fn update_progress(&mut self, percent: u8, status: JobStatus) -> Result<(), TransitionError> {
        self.ensure_live()?;
        if status.is_terminal() || status == JobStatus::Pending {
            return Err(TransitionError::Invalid {
                from: self.status,
                to: status,
            });
        }
        self.progress = self.progress.max(percent.min(100));
        self.status = status;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark job as completed.
    pub fn complete(
        &mut self,
        video_url: impl Into<String>,
        thumbnail_url: Option<String>,
        duration_seconds: u32,
    ) -> Result<(), TransitionError> {
        self.ensure_live()?;
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.video_url = Some(video_url.into());
        self.thumbnail_url = thumbnail_url;
        self.duration_seconds = Some(duration_seconds);
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Mark job as failed.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.ensure_live()?;
        let now = Utc::now();
        self.status = JobStatus::Failed;
        self.error_message = Some(error.into());
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Mark job as cancelled. Only `pending` and `processing` jobs qualify.
    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        if !self.can_be_cancelled() {
            return Err(TransitionError::NotCancellable(self.status));
        }
        let now = Utc::now();
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> VideoJob {
        VideoJob::new("user123", "tpl-1", "Neon city. A drone shot", VideoParams::default(), 2)
    }

    #[test]
    fn test_job_creation() {
        let job = job();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(job.credits_charged, 2);
        assert!(job.can_be_cancelled());
    }

    #[test]
    fn test_job_state_transitions() {
        let mut job = job();
        job.start_processing().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.started_at.is_some());

        job.update_progress(40, JobStatus::Diffusing).unwrap();
        job.complete("https://cdn/v.mp4", None, 15).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut job = job();
        job.start_processing().unwrap();
        job.update_progress(60, JobStatus::Diffusing).unwrap();
        job.update_progress(30, JobStatus::Uploading).unwrap();
        assert_eq!(job.progress, 60);
        assert_eq!(job.status, JobStatus::Uploading);

        job.update_progress(250, JobStatus::Uploading).unwrap();
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut job = job();
        job.start_processing().unwrap();
        job.fail("provider exploded").unwrap();

        assert_eq!(
            job.complete("https://cdn/v.mp4", None, 15),
            Err(TransitionError::AlreadyTerminal(JobStatus::Failed))
        );
        assert!(job.update_progress(50, JobStatus::Processing).is_err());
        assert!(job.bind_provider(AiProvider::Mock).is_err());
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.video_url.is_none());
    }

    #[test]
    fn test_cancel_rules() {
        let mut pending = job();
        pending.cancel().unwrap();
        assert_eq!(pending.status, JobStatus::Cancelled);

        let mut done = job();
        done.start_processing().unwrap();
        done.complete("https://cdn/v.mp4", None, 15).unwrap();
        assert_eq!(
            done.cancel(),
            Err(TransitionError::NotCancellable(JobStatus::Completed))
        );
    }

    #[test]
    fn test_status_wire_strings() {
        assert_eq!(serde_json::to_string(&JobStatus::Diffusing).unwrap(), "\"diffusing\"");
        assert_eq!("CANCELLED".parse::<JobStatus>().unwrap(), JobStatus::Cancelled);
    }
}
