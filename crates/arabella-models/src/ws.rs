//! Real-time message types.
//!
//! Server messages travel as an envelope `{"type": ..., "payload": {...}}`.
//! Clients send control messages shaped `{"type", "action", "data"}`.

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{JobId, JobStatus, VideoJob};

/// Server-to-client message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum WsMessage {
    /// Coarse status change
    StatusUpdate { status: JobStatus, progress: u8 },

    /// Intermediate progress reported while polling a provider
    ProgressUpdate {
        status: JobStatus,
        progress: u8,
        message: String,
    },

    /// Job finished with an asset
    Completed {
        status: JobStatus,
        progress: u8,
        video_url: String,
        #[serde(default)]
        thumbnail_url: String,
    },

    /// Job failed terminally
    Failed {
        status: JobStatus,
        error_message: String,
    },

    /// Job cancelled by its owner
    Cancelled { job_id: JobId, status: JobStatus },

    /// Acknowledges a `subscribe_job` action
    Subscribed { job_id: JobId },

    /// Reply to a `ping` action (unix seconds)
    Pong { timestamp: i64 },

    /// Malformed or unsupported control message
    Error { message: String },
}

impl WsMessage {
    /// Create a status update message.
    pub fn status_update(job: &VideoJob) -> Self {
        WsMessage::StatusUpdate {
            status: job.status,
            progress: job.progress,
        }
    }

    /// Create a progress update message.
    pub fn progress_update(job: &VideoJob, message: impl Into<String>) -> Self {
        WsMessage::ProgressUpdate {
            status: job.status,
            progress: job.progress,
            message: message.into(),
        }
    }

    /// Create a completed message from a finished job.
    pub fn completed(job: &VideoJob) -> Self {
        WsMessage::Completed {
            status: job.status,
            progress: job.progress,
            video_url: job.video_url.clone().unwrap_or_default(),
            thumbnail_url: job.thumbnail_url.clone().unwrap_or_default(),
        }
    }

    /// Create a failed message from a failed job.
    pub fn failed(job: &VideoJob) -> Self {
        WsMessage::Failed {
            status: job.status,
            error_message: job.error_message.clone().unwrap_or_default(),
        }
    }

    pub fn cancelled(job_id: &JobId) -> Self {
        WsMessage::Cancelled {
            job_id: job_id.clone(),
            status: JobStatus::Cancelled,
        }
    }

    pub fn subscribed(job_id: &JobId) -> Self {
        WsMessage::Subscribed {
            job_id: job_id.clone(),
        }
    }

    pub fn pong() -> Self {
        WsMessage::Pong {
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        WsMessage::Error {
            message: message.into(),
        }
    }

    /// Wire name of the message type.
    pub fn event_type(&self) -> &'static str {
        match self {
            WsMessage::StatusUpdate { .. } => "status_update",
            WsMessage::ProgressUpdate { .. } => "progress_update",
            WsMessage::Completed { .. } => "completed",
            WsMessage::Failed { .. } => "failed",
            WsMessage::Cancelled { .. } => "cancelled",
            WsMessage::Subscribed { .. } => "subscribed",
            WsMessage::Pong { .. } => "pong",
            WsMessage::Error { .. } => "error",
        }
    }
}

/// Client-to-server control message.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientMessage {
    #[serde(rename = "type", default)]
    pub message_type: String,
    pub action: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Parsed client action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    SubscribeJob(JobId),
    Ping,
    Unknown(String),
}

impl ClientMessage {
    /// Interpret the `action` and `data` fields.
    pub fn action(&self) -> ClientAction {
        match self.action.as_str() {
            "subscribe_job" => match self.data.get("job_id").and_then(|v| v.as_str()) {
                Some(id) if !id.is_empty() => ClientAction::SubscribeJob(JobId::from_string(id)),
                _ => ClientAction::Unknown("subscribe_job without job_id".to_string()),
            },
            "ping" => ClientAction::Ping,
            other => ClientAction::Unknown(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VideoParams;

    #[test]
    fn test_envelope_serialization() {
        let mut job = VideoJob::new("u", "t", "p", VideoParams::default(), 1);
        job.start_processing().unwrap();
        job.update_progress(45, JobStatus::Diffusing).unwrap();

        let json = serde_json::to_value(WsMessage::progress_update(&job, "Rendering")).unwrap();
        assert_eq!(json["type"], "progress_update");
        assert_eq!(json["payload"]["status"], "diffusing");
        assert_eq!(json["payload"]["progress"], 45);
        assert_eq!(json["payload"]["message"], "Rendering");
    }

    #[test]
    fn test_completed_defaults_empty_thumbnail() {
        let mut job = VideoJob::new("u", "t", "p", VideoParams::default(), 1);
        job.complete("https://cdn/v.mp4", None, 15).unwrap();

        let json = serde_json::to_value(WsMessage::completed(&job)).unwrap();
        assert_eq!(json["type"], "completed");
        assert_eq!(json["payload"]["progress"], 100);
        assert_eq!(json["payload"]["thumbnail_url"], "");
    }

    #[test]
    fn test_client_actions() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"control","action":"subscribe_job","data":{"job_id":"abc"}}"#,
        )
        .unwrap();
        assert_eq!(msg.action(), ClientAction::SubscribeJob(JobId::from_string("abc")));

        let ping: ClientMessage = serde_json::from_str(r#"{"action":"ping"}"#).unwrap();
        assert_eq!(ping.action(), ClientAction::Ping);

        let bad: ClientMessage =
            serde_json::from_str(r#"{"action":"subscribe_job","data":{}}"#).unwrap();
        assert!(matches!(bad.action(), ClientAction::Unknown(_)));
    }
}
