//! Outer dequeue loop.

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use arabella_models::VideoJob;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::metrics;
use crate::processor::{JobOutcome, JobProcessor, WorkerDeps};

/// Dequeues one job per tick and runs each on its own task.
pub struct VideoWorker {
    processor: JobProcessor,
    shutdown: watch::Sender<bool>,
}

impl VideoWorker {
    pub fn new(deps: WorkerDeps, config: WorkerConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            processor: JobProcessor::new(deps, config),
            shutdown,
        }
    }

    pub fn processor(&self) -> &JobProcessor {
        &self.processor
    }

    fn config(&self) -> &WorkerConfig {
        self.processor.config()
    }

    /// Run until shutdown is signalled, then wait for in-flight jobs.
    pub async fn run(&self) -> WorkerResult<()> {
        let config = self.config().clone();
        info!(
            tick_ms = config.tick_interval.as_millis() as u64,
            poll_ms = config.poll_interval.as_millis() as u64,
            "Starting video worker"
        );

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut ticker = interval(config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tasks: JoinSet<JobOutcome> = JoinSet::new();

        while !*shutdown_rx.borrow() {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping worker");
                        break;
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    match joined {
                        Ok(outcome) => debug!(?outcome, "Job task finished"),
                        Err(e) => error!("Job task panicked: {}", e),
                    }
                    metrics::set_jobs_in_flight(tasks.len());
                }
                _ = ticker.tick() => {
                    if let Some(job) = self.next_job().await {
                        let processor = self.processor.clone();
                        let job_shutdown = self.shutdown.subscribe();
                        tasks.spawn(async move { processor.process(job, job_shutdown).await });
                        metrics::set_jobs_in_flight(tasks.len());
                    }
                }
            }
        }

        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "Waiting for in-flight jobs to stop...");
            let drained = tokio::time::timeout(config.shutdown_timeout, async {
                while tasks.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                warn!(
                    timeout_secs = config.shutdown_timeout.as_secs(),
                    "In-flight jobs did not stop in time, aborting"
                );
                tasks.abort_all();
            }
        }
        metrics::set_jobs_in_flight(0);

        info!("Video worker stopped");
        Ok(())
    }

    /// Pop the next job that still needs processing.
    ///
    /// The repository copy is authoritative; jobs cancelled while queued
    /// are skipped.
    pub async fn next_job(&self) -> Option<VideoJob> {
        let deps = self.processor.deps();
        let job = match deps.queue.dequeue().await {
            Ok(Some(job)) => job,
            Ok(None) => return None,
            Err(e) => {
                error!("Failed to dequeue job: {}", e);
                return None;
            }
        };

        match deps.jobs.get_job(&job.id).await {
            Ok(stored) if stored.is_terminal() => {
                info!(job_id = %stored.id, status = %stored.status, "Skipping finished job");
                None
            }
            Ok(stored) => Some(stored),
            Err(e) if e.is_not_found() => {
                warn!(job_id = %job.id, "Dequeued job has no stored record, dropping it");
                None
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Could not reload job, using queued payload");
                Some(job)
            }
        }
    }

    /// Signal shutdown to the loop and every in-flight job.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}
