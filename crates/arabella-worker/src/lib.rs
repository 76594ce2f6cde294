//! Video generation worker.
//!
//! This crate provides:
//! - The per-job state machine: provider selection, dispatch and polling
//! - The outer dequeue loop with cooperative shutdown
//! - The `EventBroadcaster` seam the real-time hub plugs into
//! - Structured job logging and worker metrics

pub mod broadcaster;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod processor;
pub mod retry;
pub mod worker;

pub use broadcaster::{EventBroadcaster, NoopBroadcaster};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use processor::{JobOutcome, JobProcessor, WorkerDeps};
pub use retry::{PollErrors, PollVerdict};
pub use worker::VideoWorker;
