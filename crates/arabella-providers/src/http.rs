//! Shared HTTP plumbing for remote providers.

use std::time::{Duration, Instant};

use arabella_models::ProviderHealth;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};

pub(crate) fn build_client(timeout: Duration) -> ProviderResult<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Duration::from_secs(90))
        .user_agent(concat!("arabella-providers/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(ProviderError::Http)
}

/// Pass through success replies, classify the rest.
pub(crate) async fn check_status(response: Response) -> ProviderResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::from_status(status, body))
}

/// Time a probe request. Transport errors and statuses rejected by `accept`
/// are unhealthy.
pub(crate) async fn probe(
    request: RequestBuilder,
    timeout: Duration,
    accept: fn(StatusCode) -> bool,
) -> ProviderHealth {
    let start = Instant::now();
    let result = request.timeout(timeout).send().await;
    let elapsed = start.elapsed().as_millis() as u64;

    match result {
        Ok(resp) if accept(resp.status()) => ProviderHealth::healthy(elapsed),
        Ok(resp) => {
            debug!(status = %resp.status(), "Health probe rejected");
            ProviderHealth::unhealthy(elapsed)
        }
        Err(e) => {
            debug!(error = %e, "Health probe failed");
            ProviderHealth::unhealthy(elapsed)
        }
    }
}
