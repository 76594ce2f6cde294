//! AI video generation providers.
//!
//! This crate provides:
//! - The `VideoProvider` contract and the optional `FinalAssetUrl` capability
//! - A deterministic `MockProvider` plus HTTP clients for Gemini VEO and Wan AI
//! - `ProviderRegistry`, built once at startup from `ProvidersConfig`
//! - `ProviderSelector`, which picks a provider per job

pub mod config;
pub mod error;
pub mod gemini;
mod http;
pub mod mock;
pub mod provider;
pub mod registry;
pub mod selector;
pub mod wan;

pub use config::ProvidersConfig;
pub use error::{ProviderError, ProviderResult};
pub use gemini::{GeminiVeoConfig, GeminiVeoProvider};
pub use mock::MockProvider;
pub use provider::{
    FinalAssetUrl, GenerationProgress, GenerationRequest, GenerationResult, VideoProvider,
};
pub use registry::ProviderRegistry;
pub use selector::{HealthPolicy, ProviderSelector, SelectionCriteria};
pub use wan::{WanAiConfig, WanAiProvider};
