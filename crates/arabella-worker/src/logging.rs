//! Structured job logging.
//!
//! Every line carries the job id, the bound provider (once known) and the
//! operation, so a job's history can be filtered out of the worker stream.

use tracing::{error, info, warn, Span};

use arabella_models::{AiProvider, JobId};

/// Job logger for structured logging with consistent fields.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: String,
    provider: Option<AiProvider>,
}

impl JobLogger {
    pub fn new(job_id: &JobId, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
            provider: None,
        }
    }

    /// Attach the provider the job was bound to.
    pub fn with_provider(mut self, provider: AiProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    fn provider_label(&self) -> &'static str {
        self.provider.map(|p| p.as_str()).unwrap_or("unbound")
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            provider = self.provider_label(),
            "Generation started: {}", message
        );
    }

    pub fn log_progress(&self, percent: u8, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            provider = self.provider_label(),
            percent,
            "Generation progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = %self.operation,
            provider = self.provider_label(),
            "Generation warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = %self.operation,
            provider = self.provider_label(),
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            provider = self.provider_label(),
            "Video ready: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn provider(&self) -> Option<AiProvider> {
        self.provider
    }

    /// Span wrapping the whole job task.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = %self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, "video_generation");

        assert_eq!(logger.job_id(), job_id.to_string());
        assert_eq!(logger.operation(), "video_generation");
        assert_eq!(logger.provider(), None);
    }

    #[test]
    fn test_job_logger_with_provider() {
        let logger = JobLogger::new(&JobId::from_string("j-1"), "poll").with_provider(AiProvider::WanAi);
        assert_eq!(logger.provider(), Some(AiProvider::WanAi));
        assert_eq!(logger.provider_label(), "wan_ai");
    }
}
