//! Worker configuration.

use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Interval of the outer dequeue loop; at most one job per tick
    pub tick_interval: Duration,
    /// Interval between provider progress polls
    pub poll_interval: Duration,
    /// Polls before a job is failed as timed out
    pub max_poll_attempts: u32,
    /// Consecutive poll errors before a job is failed
    pub max_consecutive_errors: u32,
    /// Duration recorded when neither the provider nor the job carries one
    pub default_duration_secs: u32,
    /// Graceful shutdown timeout for in-flight jobs
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(2000),
            poll_interval: Duration::from_millis(5000),
            max_poll_attempts: 360, // 30 minutes at the default interval
            max_consecutive_errors: 5,
            default_duration_secs: 15,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            tick_interval: Duration::from_millis(
                std::env::var("WORKER_TICK_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2000),
            ),
            poll_interval: Duration::from_millis(
                std::env::var("WORKER_POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5000),
            ),
            max_poll_attempts: std::env::var("WORKER_MAX_POLL_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(360),
            max_consecutive_errors: std::env::var("WORKER_MAX_CONSECUTIVE_ERRORS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            default_duration_secs: std::env::var("WORKER_DEFAULT_DURATION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(15),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Total polling budget, used in the timeout message.
    pub fn poll_budget(&self) -> Duration {
        self.poll_interval * self.max_poll_attempts
    }
}
