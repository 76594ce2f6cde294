//! WebSocket endpoint for real-time job events.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::time::{interval_at, timeout, Instant};
use tracing::{debug, info, warn};

use arabella_models::{ClientAction, ClientMessage, JobId, WsMessage};

use crate::auth::GatewayUser;
use crate::error::{ApiError, ApiResult};
use crate::hub::{ClientId, Hub};
use crate::metrics;
use crate::services::GenerationService;
use crate::state::AppState;

/// Global counter for active WebSocket connections.
static ACTIVE_WS_CONNECTIONS: AtomicI64 = AtomicI64::new(0);

const WS_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
/// Silence allowed before the connection is considered gone.
const WS_READ_TIMEOUT: Duration = Duration::from_secs(60);
/// Must stay below the read timeout so pongs keep the connection alive.
const WS_PING_INTERVAL: Duration = Duration::from_secs(54);
const WS_MAX_MESSAGE_SIZE: usize = 512;

/// Query parameters for `GET /ws`.
#[derive(Debug, Default, Deserialize)]
pub struct WsConnectQuery {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
}

/// Upgrade to the real-time channel.
///
/// Identity comes from the gateway header, falling back to `user_id`.
pub async fn ws_connect(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WsConnectQuery>,
) -> ApiResult<impl IntoResponse> {
    let user_id = GatewayUser::from_headers(&headers)
        .map(|u| u.user_id)
        .or_else(|| query.user_id.filter(|u| !u.trim().is_empty()))
        .ok_or_else(|| ApiError::unauthorized("Missing user identity"))?;

    let job_id = match query.job_id.filter(|j| !j.is_empty()) {
        Some(raw) => {
            let job_id = JobId::from_string(raw);
            state.generation.job(&user_id, &job_id).await?;
            Some(job_id)
        }
        None => None,
    };

    let count = ACTIVE_WS_CONNECTIONS.fetch_add(1, Ordering::SeqCst) + 1;
    metrics::set_ws_active_connections(count);
    metrics::record_ws_connection();

    let hub = state.hub.clone();
    let generation = state.generation.clone();
    Ok(ws
        .max_message_size(WS_MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| async move {
            handle_socket(socket, hub, generation, user_id, job_id).await;
            let count = ACTIVE_WS_CONNECTIONS.fetch_sub(1, Ordering::SeqCst) - 1;
            metrics::set_ws_active_connections(count);
        }))
}

async fn handle_socket(
    socket: WebSocket,
    hub: Hub,
    generation: GenerationService,
    user_id: String,
    job_id: Option<JobId>,
) {
    let (mut sender, mut receiver) = socket.split();
    let (client_id, mut outbound) = hub.register(user_id.clone(), job_id).await;
    info!(client_id = %client_id, user_id = %user_id, "WebSocket client connected");

    // Writer: drains the hub buffer and keeps the connection alive with pings.
    let writer = tokio::spawn(async move {
        let mut ping = interval_at(Instant::now() + WS_PING_INTERVAL, WS_PING_INTERVAL);
        loop {
            let frame = tokio::select! {
                next = outbound.recv() => match next {
                    Some(text) => Message::Text(text),
                    None => {
                        // Unregistered by the hub
                        let _ = timeout(WS_WRITE_TIMEOUT, sender.send(Message::Close(None))).await;
                        break;
                    }
                },
                _ = ping.tick() => Message::Ping(Vec::new()),
            };
            match timeout(WS_WRITE_TIMEOUT, sender.send(frame)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!("WebSocket write failed: {}", e);
                    break;
                }
                Err(_) => {
                    warn!("WebSocket write timed out");
                    break;
                }
            }
        }
    });

    loop {
        let frame = match timeout(WS_READ_TIMEOUT, receiver.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => {
                debug!(client_id = %client_id, "WebSocket read error: {}", e);
                break;
            }
            Ok(None) => break,
            Err(_) => {
                info!(client_id = %client_id, "WebSocket client timed out");
                break;
            }
        };

        match frame {
            Message::Text(text) => {
                handle_client_message(&hub, &generation, client_id, &user_id, &text).await;
            }
            Message::Close(_) => break,
            // Pings, pongs and binary frames only refresh the read deadline
            _ => {}
        }
    }

    hub.unregister(client_id);
    writer.abort();
    info!(client_id = %client_id, user_id = %user_id, "WebSocket client disconnected");
}

async fn handle_client_message(
    hub: &Hub,
    generation: &GenerationService,
    client_id: ClientId,
    user_id: &str,
    text: &str,
) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!(client_id = %client_id, "Failed to parse client message: {}", e);
            hub.send_to_client(client_id, &WsMessage::error("Invalid message"))
                .await;
            return;
        }
    };
    metrics::record_ws_message_received(&message.action);

    let reply = match message.action() {
        ClientAction::SubscribeJob(job_id) => match generation.job(user_id, &job_id).await {
            Ok(_) => {
                hub.subscribe(client_id, job_id.clone()).await;
                WsMessage::subscribed(&job_id)
            }
            Err(e) => {
                warn!(client_id = %client_id, job_id = %job_id, "Subscription rejected: {}", e);
                WsMessage::error(format!("Cannot subscribe to job {}", job_id))
            }
        },
        ClientAction::Ping => WsMessage::pong(),
        ClientAction::Unknown(action) => {
            warn!(client_id = %client_id, action = %action, "Unknown client action");
            WsMessage::error(format!("Unknown action: {}", action))
        }
    };

    hub.send_to_client(client_id, &reply).await;
}
