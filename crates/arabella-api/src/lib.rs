//! Axum HTTP/WebSocket API server.
//!
//! This crate provides:
//! - Video generation intake, lookup and cancellation over REST
//! - The real-time hub and its WebSocket endpoint
//! - Health, readiness and Prometheus metrics endpoints
//! - The composition root that wires queue, store, providers and worker

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
pub mod ws;

pub use auth::GatewayUser;
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use hub::{ClientId, Hub, HubControlLoop};
pub use routes::create_router;
pub use services::{GenerateVideoRequest, GenerationResponse, GenerationService, JobPage};
pub use state::AppState;
