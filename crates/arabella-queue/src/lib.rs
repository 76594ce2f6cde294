//! Job queue for video generation.
//!
//! This crate provides:
//! - A FIFO hand-off between request intake and the worker
//! - A short-lived status projection per job
//! - Redis (sorted set + payload keys) and in-memory back ends

pub mod config;
pub mod error;
pub mod memory;
pub mod queue;
pub mod redis_queue;

use std::sync::Arc;

pub use config::{QueueBackend, QueueConfig};
pub use error::{QueueError, QueueResult};
pub use memory::MemoryJobQueue;
pub use queue::JobQueue;
pub use redis_queue::{QueueKeys, RedisJobQueue};

/// Build the queue back end selected by `config.backend`.
pub fn connect(config: QueueConfig) -> QueueResult<Arc<dyn JobQueue>> {
    match config.backend {
        QueueBackend::Redis => Ok(Arc::new(RedisJobQueue::new(config)?)),
        QueueBackend::Memory => Ok(Arc::new(MemoryJobQueue::new(config.status_ttl))),
    }
}
