//! Health check handlers.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use arabella_providers::HealthPolicy;

use crate::metrics;
use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
    /// Per-provider health, keyed by wire name
    pub providers: BTreeMap<String, ProviderStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_depth: Option<u64>,
    pub ws_clients: usize,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub queue: CheckStatus,
    pub providers: CheckStatus,
}

#[derive(Serialize)]
pub struct ProviderStatus {
    pub healthy: bool,
    pub response_time_ms: u64,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl CheckStatus {
    fn ok(latency_ms: u64) -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
            latency_ms: Some(latency_ms),
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(msg.into()),
            latency_ms: None,
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Readiness check endpoint (readiness probe).
/// Checks the queue back end and provider health.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    use std::time::Instant;

    // Check queue (via depth)
    let mut queue_depth = None;
    let queue_check = {
        let start = Instant::now();
        match state.queue.depth().await {
            Ok(depth) => {
                metrics::set_queue_length(depth);
                queue_depth = Some(depth);
                CheckStatus::ok(start.elapsed().as_millis() as u64)
            }
            Err(e) => CheckStatus::error(e.to_string()),
        }
    };

    // Check providers (fresh probe of each)
    let start = Instant::now();
    state.selector.refresh_health().await;
    let health = state.selector.cached_health().await;
    let providers: BTreeMap<String, ProviderStatus> = health
        .iter()
        .map(|(name, h)| {
            (
                name.to_string(),
                ProviderStatus {
                    healthy: h.is_healthy,
                    response_time_ms: h.response_time_ms,
                },
            )
        })
        .collect();
    let any_healthy = providers.values().any(|p| p.healthy);
    let providers_check = if state.selector.registry().is_empty() {
        CheckStatus::error("No providers registered")
    } else if !any_healthy && state.selector.policy() == HealthPolicy::PreferHealthy {
        CheckStatus::error("No healthy providers")
    } else {
        CheckStatus::ok(start.elapsed().as_millis() as u64)
    };

    let all_ok = queue_check.is_ok() && providers_check.is_ok();

    let response = ReadinessResponse {
        status: if all_ok { "ready" } else { "degraded" }.to_string(),
        checks: ReadinessChecks {
            queue: queue_check,
            providers: providers_check,
        },
        providers,
        queue_depth,
        ws_clients: state.hub.active_connections().await,
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
