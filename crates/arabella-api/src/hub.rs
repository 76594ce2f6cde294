//! Real-time hub.
//!
//! Tracks connected clients in three indices (all clients, by user, by
//! subscribed job) behind one reader/writer lock. Registration and removal
//! go through a single control loop so structural changes are serialized;
//! broadcasts only take the read lock and never wait on a slow client.
//! A client whose buffer is full is treated as dead and removed.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use arabella_models::{JobId, WsMessage};
use arabella_worker::EventBroadcaster;

use crate::metrics;

/// Outbound buffer per client.
pub const CLIENT_BUFFER_SIZE: usize = 256;

pub type ClientId = Uuid;

struct Client {
    user_id: String,
    job_id: Option<JobId>,
    tx: mpsc::Sender<String>,
}

#[derive(Default)]
struct Indices {
    clients: HashMap<ClientId, Client>,
    by_user: HashMap<String, HashSet<ClientId>>,
    by_job: HashMap<JobId, HashSet<ClientId>>,
}

impl Indices {
    fn insert(&mut self, id: ClientId, client: Client) {
        self.by_user
            .entry(client.user_id.clone())
            .or_default()
            .insert(id);
        if let Some(job_id) = &client.job_id {
            self.by_job.entry(job_id.clone()).or_default().insert(id);
        }
        self.clients.insert(id, client);
    }

    /// Dropping the client closes its outbound channel.
    fn remove(&mut self, id: &ClientId) -> bool {
        let Some(client) = self.clients.remove(id) else {
            return false;
        };
        remove_from(&mut self.by_user, &client.user_id, id);
        if let Some(job_id) = &client.job_id {
            remove_from(&mut self.by_job, job_id, id);
        }
        true
    }

    fn senders<'a>(
        &'a self,
        ids: Option<&'a HashSet<ClientId>>,
    ) -> impl Iterator<Item = (ClientId, &'a mpsc::Sender<String>)> + 'a {
        ids.into_iter()
            .flatten()
            .filter_map(move |id| self.clients.get(id).map(|c| (*id, &c.tx)))
    }
}

fn remove_from<K>(index: &mut HashMap<K, HashSet<ClientId>>, key: &K, id: &ClientId)
where
    K: std::hash::Hash + Eq,
{
    if let Some(ids) = index.get_mut(key) {
        ids.remove(id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

enum Control {
    Register {
        id: ClientId,
        client: Client,
        ack: oneshot::Sender<()>,
    },
    Unregister { id: ClientId, dropped: bool },
}

/// Handle to the hub. Cheap to clone.
#[derive(Clone)]
pub struct Hub {
    indices: Arc<RwLock<Indices>>,
    control: mpsc::UnboundedSender<Control>,
    buffer_size: usize,
    dropped: Arc<AtomicU64>,
}

/// Applies registrations and removals. Must be spawned for the hub to work.
pub struct HubControlLoop {
    indices: Arc<RwLock<Indices>>,
    rx: mpsc::UnboundedReceiver<Control>,
    dropped: Arc<AtomicU64>,
}

impl Hub {
    pub fn new() -> (Self, HubControlLoop) {
        Self::with_buffer_size(CLIENT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(buffer_size: usize) -> (Self, HubControlLoop) {
        let indices = Arc::new(RwLock::new(Indices::default()));
        let (control, rx) = mpsc::unbounded_channel();
        let dropped = Arc::new(AtomicU64::new(0));
        let hub = Self {
            indices: Arc::clone(&indices),
            control,
            buffer_size: buffer_size.max(1),
            dropped: Arc::clone(&dropped),
        };
        (
            hub,
            HubControlLoop {
                indices,
                rx,
                dropped,
            },
        )
    }

    /// Register a client, optionally already subscribed to a job.
    ///
    /// Returns once the client is visible to broadcasts. The receiver yields
    /// serialized envelopes and closes when the client is unregistered.
    pub async fn register(
        &self,
        user_id: impl Into<String>,
        job_id: Option<JobId>,
    ) -> (ClientId, mpsc::Receiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.buffer_size);
        let (ack, acked) = oneshot::channel();
        let client = Client {
            user_id: user_id.into(),
            job_id,
            tx,
        };
        if self
            .control
            .send(Control::Register { id, client, ack })
            .is_err()
        {
            error!(client_id = %id, "Hub control loop is not running");
        }
        // A dropped ack means the loop is gone; the receiver will just stay empty.
        let _ = acked.await;
        (id, rx)
    }

    pub fn unregister(&self, id: ClientId) {
        let _ = self.control.send(Control::Unregister { id, dropped: false });
    }

    /// Clients removed because their buffer was full or closed.
    pub fn dropped_clients(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Move a client to another job. Returns false for an unknown client.
    pub async fn subscribe(&self, id: ClientId, job_id: JobId) -> bool {
        let mut indices = self.indices.write().await;
        let Some(client) = indices.clients.get_mut(&id) else {
            return false;
        };
        let previous = client.job_id.replace(job_id.clone());
        if let Some(previous) = previous {
            remove_from(&mut indices.by_job, &previous, &id);
        }
        indices.by_job.entry(job_id.clone()).or_default().insert(id);
        debug!(client_id = %id, job_id = %job_id, "Client subscribed to job");
        true
    }

    pub async fn broadcast_to_job(&self, job_id: &JobId, message: &WsMessage) {
        let Some(payload) = encode(message) else {
            return;
        };
        let dead = {
            let indices = self.indices.read().await;
            self.fan_out(indices.senders(indices.by_job.get(job_id)), &payload, message)
        };
        self.drop_clients(dead);
    }

    pub async fn broadcast_to_user(&self, user_id: &str, message: &WsMessage) {
        let Some(payload) = encode(message) else {
            return;
        };
        let dead = {
            let indices = self.indices.read().await;
            self.fan_out(indices.senders(indices.by_user.get(user_id)), &payload, message)
        };
        self.drop_clients(dead);
    }

    /// Send a reply to one client.
    pub async fn send_to_client(&self, id: ClientId, message: &WsMessage) -> bool {
        let Some(payload) = encode(message) else {
            return false;
        };
        let dead = {
            let indices = self.indices.read().await;
            let sender = indices.clients.get(&id).map(|c| (id, &c.tx));
            self.fan_out(sender.into_iter(), &payload, message)
        };
        let delivered = dead.is_empty();
        self.drop_clients(dead);
        delivered && self.indices.read().await.clients.contains_key(&id)
    }

    pub async fn active_connections(&self) -> usize {
        self.indices.read().await.clients.len()
    }

    pub async fn user_connections(&self, user_id: &str) -> usize {
        self.indices
            .read()
            .await
            .by_user
            .get(user_id)
            .map_or(0, HashSet::len)
    }

    pub async fn job_subscribers(&self, job_id: &JobId) -> usize {
        self.indices
            .read()
            .await
            .by_job
            .get(job_id)
            .map_or(0, HashSet::len)
    }

    /// Push to every sender without blocking. Returns the clients to drop.
    fn fan_out<'a>(
        &self,
        senders: impl Iterator<Item = (ClientId, &'a mpsc::Sender<String>)>,
        payload: &str,
        message: &WsMessage,
    ) -> Vec<ClientId> {
        let mut sent = 0;
        let mut dead = Vec::new();
        for (id, tx) in senders {
            match tx.try_send(payload.to_string()) {
                Ok(()) => sent += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(client_id = %id, "Client buffer full");
                    dead.push(id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(id),
            }
        }
        if sent > 0 {
            metrics::record_hub_events_sent(message.event_type(), sent);
        }
        dead
    }

    fn drop_clients(&self, dead: Vec<ClientId>) {
        // A slow client can be reported by several broadcasts before the
        // loop removes it; only the removal is counted.
        for id in dead {
            let _ = self.control.send(Control::Unregister { id, dropped: true });
        }
    }
}

fn encode(message: &WsMessage) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(payload) => Some(payload),
        Err(e) => {
            error!(event = message.event_type(), "Failed to encode event: {}", e);
            None
        }
    }
}

impl HubControlLoop {
    /// Run until every `Hub` handle is dropped.
    pub async fn run(mut self) {
        info!("Hub control loop started");
        while let Some(control) = self.rx.recv().await {
            let mut indices = self.indices.write().await;
            match control {
                Control::Register { id, client, ack } => {
                    debug!(client_id = %id, user_id = %client.user_id, "Client registered");
                    indices.insert(id, client);
                    let _ = ack.send(());
                }
                Control::Unregister { id, dropped } => {
                    if indices.remove(&id) {
                        if dropped {
                            warn!(client_id = %id, "Dropped slow or closed client");
                            self.dropped.fetch_add(1, Ordering::Relaxed);
                            metrics::record_hub_client_dropped();
                        } else {
                            debug!(client_id = %id, "Client unregistered");
                        }
                    }
                }
            }
            metrics::set_hub_clients(indices.clients.len());
        }
        info!("Hub control loop stopped");
    }
}

#[async_trait]
impl EventBroadcaster for Hub {
    async fn broadcast_to_job(&self, job_id: &JobId, message: &WsMessage) {
        Hub::broadcast_to_job(self, job_id, message).await;
    }

    async fn broadcast_to_user(&self, user_id: &str, message: &WsMessage) {
        Hub::broadcast_to_user(self, user_id, message).await;
    }
}
