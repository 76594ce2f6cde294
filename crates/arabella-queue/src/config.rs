//! Queue configuration.

use std::time::Duration;

/// Storage back end for the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackend {
    Redis,
    /// Single-process queue, lost on restart
    Memory,
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Prefix for all queue keys
    pub key_prefix: String,
    /// Job payload TTL, must outlive the worst-case generation time
    pub payload_ttl: Duration,
    /// Status projection TTL
    pub status_ttl: Duration,
    pub backend: QueueBackend,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "arabella:jobs".to_string(),
            payload_ttl: Duration::from_secs(24 * 3600),
            status_ttl: Duration::from_secs(300),
            backend: QueueBackend::Redis,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            key_prefix: std::env::var("QUEUE_KEY_PREFIX")
                .unwrap_or_else(|_| "arabella:jobs".to_string()),
            payload_ttl: Duration::from_secs(
                std::env::var("QUEUE_PAYLOAD_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(24 * 3600),
            ),
            status_ttl: Duration::from_secs(
                std::env::var("QUEUE_STATUS_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            backend: match std::env::var("QUEUE_BACKEND")
                .map(|v| v.to_lowercase())
                .as_deref()
            {
                Ok("memory") => QueueBackend::Memory,
                _ => QueueBackend::Redis,
            },
        }
    }
}
