//! Worker metrics.
//!
//! Recorded through the `metrics` facade; the binary installs the exporter.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

use arabella_models::AiProvider;

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_STARTED_TOTAL: &str = "arabella_worker_jobs_started_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "arabella_worker_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "arabella_worker_jobs_failed_total";
    pub const JOBS_IN_FLIGHT: &str = "arabella_worker_jobs_in_flight";
    pub const POLL_ERRORS_TOTAL: &str = "arabella_worker_poll_errors_total";
    pub const GENERATION_DURATION_SECONDS: &str = "arabella_worker_generation_duration_seconds";
}

fn provider_label(provider: Option<AiProvider>) -> String {
    provider.map(|p| p.as_str()).unwrap_or("none").to_string()
}

pub fn record_job_started() {
    counter!(names::JOBS_STARTED_TOTAL).increment(1);
}

pub fn record_job_completed(provider: Option<AiProvider>, elapsed: Duration) {
    let labels = [("provider", provider_label(provider))];
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
    histogram!(names::GENERATION_DURATION_SECONDS, &labels).record(elapsed.as_secs_f64());
}

pub fn record_job_failed(provider: Option<AiProvider>) {
    let labels = [("provider", provider_label(provider))];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_poll_error(provider: AiProvider) {
    let labels = [("provider", provider.as_str().to_string())];
    counter!(names::POLL_ERRORS_TOTAL, &labels).increment(1);
}

pub fn set_jobs_in_flight(count: usize) {
    gauge!(names::JOBS_IN_FLIGHT).set(count as f64);
}
