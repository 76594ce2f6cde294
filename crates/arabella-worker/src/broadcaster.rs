//! Outbound event seam.

use async_trait::async_trait;

use arabella_models::{JobId, WsMessage};

/// Delivers job events to connected clients.
///
/// Implementations must not block on slow consumers.
#[async_trait]
pub trait EventBroadcaster: Send + Sync {
    async fn broadcast_to_job(&self, job_id: &JobId, message: &WsMessage);

    async fn broadcast_to_user(&self, user_id: &str, message: &WsMessage);
}

/// Drops every event. For running the worker without a hub.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBroadcaster;

#[async_trait]
impl EventBroadcaster for NoopBroadcaster {
    async fn broadcast_to_job(&self, _job_id: &JobId, _message: &WsMessage) {}

    async fn broadcast_to_user(&self, _user_id: &str, _message: &WsMessage) {}
}
