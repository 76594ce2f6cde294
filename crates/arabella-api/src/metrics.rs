//! Prometheus metrics for the API server and real-time hub.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "arabella_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "arabella_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "arabella_http_requests_in_flight";

    // WebSocket / hub metrics
    pub const WS_CONNECTIONS_TOTAL: &str = "arabella_ws_connections_total";
    pub const WS_CONNECTIONS_ACTIVE: &str = "arabella_ws_connections_active";
    pub const WS_MESSAGES_RECEIVED: &str = "arabella_ws_messages_received_total";
    pub const HUB_CLIENTS: &str = "arabella_hub_clients";
    pub const HUB_EVENTS_SENT: &str = "arabella_hub_events_sent_total";
    pub const HUB_CLIENTS_DROPPED: &str = "arabella_hub_clients_dropped_total";

    // Queue metrics
    pub const QUEUE_LENGTH: &str = "arabella_queue_length";
    pub const JOBS_ENQUEUED_TOTAL: &str = "arabella_jobs_enqueued_total";
    pub const JOBS_CANCELLED_TOTAL: &str = "arabella_jobs_cancelled_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record WebSocket connection.
pub fn record_ws_connection() {
    counter!(names::WS_CONNECTIONS_TOTAL).increment(1);
}

/// Update active WebSocket connections gauge.
pub fn set_ws_active_connections(count: i64) {
    gauge!(names::WS_CONNECTIONS_ACTIVE).set(count as f64);
}

/// Record a control message from a client.
pub fn record_ws_message_received(action: &str) {
    let labels = [("action", action.to_string())];
    counter!(names::WS_MESSAGES_RECEIVED, &labels).increment(1);
}

/// Update registered hub clients gauge.
pub fn set_hub_clients(count: usize) {
    gauge!(names::HUB_CLIENTS).set(count as f64);
}

/// Record events pushed to client buffers.
pub fn record_hub_events_sent(event_type: &str, recipients: usize) {
    let labels = [("type", event_type.to_string())];
    counter!(names::HUB_EVENTS_SENT, &labels).increment(recipients as u64);
}

/// Record a client dropped because its buffer was full or closed.
pub fn record_hub_client_dropped() {
    counter!(names::HUB_CLIENTS_DROPPED).increment(1);
}

/// Update queue length gauge.
pub fn set_queue_length(length: u64) {
    gauge!(names::QUEUE_LENGTH).set(length as f64);
}

/// Record job enqueued.
pub fn record_job_enqueued(template_id: &str) {
    let labels = [("template", template_id.to_string())];
    counter!(names::JOBS_ENQUEUED_TOTAL, &labels).increment(1);
}

pub fn record_job_cancelled() {
    counter!(names::JOBS_CANCELLED_TOTAL).increment(1);
}

static ID_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}|[0-9]+)$")
        .expect("valid id pattern")
});

/// Sanitize path for metrics labels (replace ids with placeholders).
fn sanitize_path(path: &str) -> String {
    let mut previous = "";
    let mut segments = Vec::new();
    for segment in path.split('/') {
        let is_job_id = previous == "videos" && !segment.is_empty() && segment != "generate";
        if is_job_id || ID_SEGMENT.is_match(segment) {
            segments.push(":id");
        } else {
            segments.push(segment);
        }
        previous = segment;
    }
    segments.join("/")
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/v1/videos/job-abc/cancel"),
            "/api/v1/videos/:id/cancel"
        );
        assert_eq!(
            sanitize_path("/api/v1/videos/generate"),
            "/api/v1/videos/generate"
        );
        assert_eq!(
            sanitize_path("/api/v1/things/550e8400-e29b-41d4-a716-446655440000"),
            "/api/v1/things/:id"
        );
        assert_eq!(sanitize_path("/health"), "/health");
    }
}
