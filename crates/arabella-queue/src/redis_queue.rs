//! Redis-backed job queue.
//!
//! Layout:
//! - `<prefix>:queue` sorted set of job ids scored by enqueue time (µs)
//! - `<prefix>:data:<id>` serialized job payload with a long TTL
//! - `<prefix>:status:<id>` status projection with a short TTL

use async_trait::async_trait;
use chrono::Utc;
use redis::{AsyncCommands, Script};
use tracing::{debug, info, warn};

use arabella_models::{JobId, JobStatus, JobStatusSnapshot, VideoJob};

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::queue::JobQueue;

/// Pops the lowest-scored id and takes its payload in one server-side step.
///
/// KEYS[1] is the queue key, ARGV[1] the payload key prefix. Replies nil when
/// the queue is empty, otherwise `[id, payload-or-nil]`.
const DEQUEUE_SCRIPT: &str = r#"
local popped = redis.call('ZPOPMIN', KEYS[1], 1)
if #popped == 0 then
    return nil
end
local data_key = ARGV[1] .. popped[1]
local payload = redis.call('GET', data_key)
redis.call('DEL', data_key)
return {popped[1], payload}
"#;

/// Key names derived from the configured prefix.
#[derive(Debug, Clone)]
pub struct QueueKeys {
    prefix: String,
}

impl QueueKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn queue(&self) -> String {
        format!("{}:queue", self.prefix)
    }

    pub fn data(&self, job_id: &JobId) -> String {
        format!("{}{}", self.data_prefix(), job_id)
    }

    /// Prefix of every payload key; the dequeue script appends the id.
    pub fn data_prefix(&self) -> String {
        format!("{}:data:", self.prefix)
    }

    pub fn status(&self, job_id: &JobId) -> String {
        format!("{}:status:{}", self.prefix, job_id)
    }
}

/// Job queue client.
pub struct RedisJobQueue {
    client: redis::Client,
    config: QueueConfig,
    keys: QueueKeys,
}

impl RedisJobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;
        let keys = QueueKeys::new(config.key_prefix.clone());
        Ok(Self {
            client,
            config,
            keys,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn keys(&self) -> &QueueKeys {
        &self.keys
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: &VideoJob) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        let payload = serde_json::to_string(job)?;
        let score = Utc::now().timestamp_micros() as f64;

        // Payload and queue entry land in one MULTI/EXEC
        redis::pipe()
            .atomic()
            .set_ex(
                self.keys.data(&job.id),
                &payload,
                self.config.payload_ttl.as_secs(),
            )
            .ignore()
            .zadd(self.keys.queue(), job.id.as_str(), score)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| QueueError::enqueue_failed(&job.id, e))?;

        info!(job_id = %job.id, user_id = %job.user_id, "Enqueued video job");
        Ok(())
    }

    async fn dequeue(&self) -> QueueResult<Option<VideoJob>> {
        let mut conn = self.connection().await?;

        let popped: Option<(String, Option<String>)> = Script::new(DEQUEUE_SCRIPT)
            .key(self.keys.queue())
            .arg(self.keys.data_prefix())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| QueueError::dequeue_failed(e))?;

        let Some((raw_id, payload)) = popped else {
            return Ok(None);
        };
        let job_id = JobId::from_string(raw_id);

        let Some(payload) = payload else {
            warn!(job_id = %job_id, "Queued job payload missing or expired, skipping");
            return Ok(None);
        };

        match serde_json::from_str::<VideoJob>(&payload) {
            Ok(job) => {
                debug!(job_id = %job.id, "Dequeued video job");
                Ok(Some(job))
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Dropping unreadable job payload");
                Ok(None)
            }
        }
    }

    async fn queue_position(&self, job_id: &JobId) -> QueueResult<Option<u64>> {
        let mut conn = self.connection().await?;
        let rank: Option<u64> = conn.zrank(self.keys.queue(), job_id.as_str()).await?;
        Ok(rank)
    }

    async fn update_job_status(
        &self,
        job_id: &JobId,
        status: JobStatus,
        progress: u8,
    ) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let snapshot = JobStatusSnapshot::new(status, progress);
        let payload = serde_json::to_string(&snapshot)?;
        conn.set_ex::<_, _, ()>(
            self.keys.status(job_id),
            payload,
            self.config.status_ttl.as_secs(),
        )
        .await?;
        Ok(())
    }

    async fn job_status(&self, job_id: &JobId) -> QueueResult<Option<JobStatusSnapshot>> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn.get(self.keys.status(job_id)).await?;
        match payload {
            Some(p) => Ok(Some(serde_json::from_str(&p)?)),
            None => Ok(None),
        }
    }

    async fn remove_job(&self, job_id: &JobId) -> QueueResult<bool> {
        let mut conn = self.connection().await?;
        let (removed,): (u64,) = redis::pipe()
            .atomic()
            .zrem(self.keys.queue(), job_id.as_str())
            .del(self.keys.data(job_id))
            .ignore()
            .query_async(&mut conn)
            .await?;
        if removed > 0 {
            debug!(job_id = %job_id, "Removed job from queue");
        }
        Ok(removed > 0)
    }

    async fn depth(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.zcard(self.keys.queue()).await?;
        Ok(len)
    }

    async fn peek(&self, count: usize) -> QueueResult<Vec<JobId>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        let ids: Vec<String> = conn
            .zrange(self.keys.queue(), 0, count as isize - 1)
            .await?;
        Ok(ids.into_iter().map(JobId::from_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let keys = QueueKeys::new("arabella:jobs");
        let id = JobId::from_string("abc");
        assert_eq!(keys.queue(), "arabella:jobs:queue");
        assert_eq!(keys.data(&id), "arabella:jobs:data:abc");
        assert_eq!(keys.status(&id), "arabella:jobs:status:abc");
        assert_eq!(keys.data(&id), format!("{}abc", keys.data_prefix()));
    }

    #[test]
    fn test_invalid_url_is_connection_error() {
        let config = QueueConfig {
            redis_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            RedisJobQueue::new(config),
            Err(QueueError::ConnectionFailed(_))
        ));
    }
}
