//! In-process job queue.
//!
//! Same contract as the Redis queue, ordered by an insertion sequence so
//! FIFO holds even for jobs enqueued within the same clock tick.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use arabella_models::{JobId, JobStatus, JobStatusSnapshot, VideoJob};

use crate::error::QueueResult;
use crate::queue::JobQueue;

#[derive(Default)]
struct MemoryState {
    next_seq: u64,
    order: BTreeMap<u64, JobId>,
    seq_by_job: HashMap<JobId, u64>,
    payloads: HashMap<JobId, VideoJob>,
    statuses: HashMap<JobId, (JobStatusSnapshot, Instant)>,
    /// Next time expired projections are swept on write
    next_sweep: Option<Instant>,
}

impl MemoryState {
    /// Drop projections past their expiry, at most once per TTL.
    fn sweep_statuses(&mut self, now: Instant, ttl: Duration) {
        if self.next_sweep.is_some_and(|at| now < at) {
            return;
        }
        self.statuses.retain(|_, (_, expires)| *expires > now);
        self.next_sweep = Some(now + ttl);
    }
}

pub struct MemoryJobQueue {
    state: Mutex<MemoryState>,
    status_ttl: Duration,
}

impl MemoryJobQueue {
    pub fn new(status_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            status_ttl,
        }
    }
}

#[cfg(test)]
impl MemoryJobQueue {
    async fn retained_statuses(&self) -> usize {
        self.state.lock().await.statuses.len()
    }
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: &VideoJob) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        if let Some(old_seq) = state.seq_by_job.remove(&job.id) {
            state.order.remove(&old_seq);
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.order.insert(seq, job.id.clone());
        state.seq_by_job.insert(job.id.clone(), seq);
        state.payloads.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn dequeue(&self) -> QueueResult<Option<VideoJob>> {
        let mut state = self.state.lock().await;
        let Some((_, job_id)) = state.order.pop_first() else {
            return Ok(None);
        };
        state.seq_by_job.remove(&job_id);
        Ok(state.payloads.remove(&job_id))
    }

    async fn queue_position(&self, job_id: &JobId) -> QueueResult<Option<u64>> {
        let state = self.state.lock().await;
        Ok(state
            .seq_by_job
            .get(job_id)
            .map(|seq| state.order.range(..*seq).count() as u64))
    }

    async fn update_job_status(
        &self,
        job_id: &JobId,
        status: JobStatus,
        progress: u8,
    ) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.sweep_statuses(now, self.status_ttl);
        let expires = now + self.status_ttl;
        state.statuses.insert(
            job_id.clone(),
            (JobStatusSnapshot::new(status, progress), expires),
        );
        Ok(())
    }

    async fn job_status(&self, job_id: &JobId) -> QueueResult<Option<JobStatusSnapshot>> {
        let mut state = self.state.lock().await;
        match state.statuses.get(job_id) {
            Some((snapshot, expires)) if *expires > Instant::now() => Ok(Some(snapshot.clone())),
            Some(_) => {
                state.statuses.remove(job_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn remove_job(&self, job_id: &JobId) -> QueueResult<bool> {
        let mut state = self.state.lock().await;
        state.payloads.remove(job_id);
        match state.seq_by_job.remove(job_id) {
            Some(seq) => {
                state.order.remove(&seq);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn depth(&self) -> QueueResult<u64> {
        Ok(self.state.lock().await.order.len() as u64)
    }

    async fn peek(&self, count: usize) -> QueueResult<Vec<JobId>> {
        let state = self.state.lock().await;
        Ok(state.order.values().take(count).cloned().collect())
    }
}
