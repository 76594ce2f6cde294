//! Shared data models for the Arabella video generation pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Video jobs and their lifecycle
//! - Generation parameters (resolution, aspect ratio, duration)
//! - Users, tiers and templates
//! - Provider descriptors, health snapshots and progress stages
//! - Real-time event envelopes and client control messages

pub mod job;
pub mod job_status;
pub mod params;
pub mod provider;
pub mod template;
pub mod user;
pub mod ws;

// Re-export common types
pub use job::{JobId, JobStatus, TransitionError, VideoJob};
pub use job_status::JobStatusSnapshot;
pub use params::{
    AspectRatio, AspectRatioParseError, Resolution, ResolutionParseError, VideoParams,
    VideoParamsOverride,
};
pub use provider::{
    AiProvider, AiProviderParseError, ProviderCapabilities, ProviderHealth, ProviderStage,
    QualityTier,
};
pub use template::Template;
pub use user::{User, UserTier};
pub use ws::{ClientAction, ClientMessage, WsMessage};
