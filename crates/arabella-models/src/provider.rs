//! Provider descriptors, health snapshots and progress stages.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::{AspectRatio, JobStatus, Resolution};

/// Known video generation back ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AiProvider {
    GeminiVeo,
    OpenaiSora,
    Runway,
    PikaLabs,
    WanAi,
    /// Deterministic test double
    Mock,
}

impl AiProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiProvider::GeminiVeo => "gemini_veo",
            AiProvider::OpenaiSora => "openai_sora",
            AiProvider::Runway => "runway",
            AiProvider::PikaLabs => "pika_labs",
            AiProvider::WanAi => "wan_ai",
            AiProvider::Mock => "mock",
        }
    }
}

impl fmt::Display for AiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AiProvider {
    type Err = AiProviderParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini_veo" => Ok(AiProvider::GeminiVeo),
            "openai_sora" => Ok(AiProvider::OpenaiSora),
            "runway" => Ok(AiProvider::Runway),
            "pika_labs" => Ok(AiProvider::PikaLabs),
            "wan_ai" => Ok(AiProvider::WanAi),
            "mock" => Ok(AiProvider::Mock),
            _ => Err(AiProviderParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown AI provider: {0}")]
pub struct AiProviderParseError(String);

/// Output quality class of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Budget,
    Standard,
    Premium,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Budget => "budget",
            QualityTier::Standard => "standard",
            QualityTier::Premium => "premium",
        }
    }
}

/// Static per-provider descriptor. Never mutated at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProviderCapabilities {
    /// Display name
    pub name: String,
    /// Maximum duration in seconds
    pub max_duration: u32,
    pub max_resolution: Resolution,
    pub supported_ratios: Vec<AspectRatio>,
    /// Average seconds of wall time per second of video
    pub estimated_time: u32,
    pub quality_tier: QualityTier,
    pub supports_styles: bool,
    pub cost_per_second: f64,
}

impl ProviderCapabilities {
    pub fn supports_ratio(&self, ratio: AspectRatio) -> bool {
        self.supported_ratios.contains(&ratio)
    }
}

/// Point-in-time provider health. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProviderHealth {
    pub is_healthy: bool,
    pub queue_depth: u32,
    pub response_time_ms: u64,
    pub error_rate: f64,
    pub last_checked: DateTime<Utc>,
}

impl ProviderHealth {
    pub fn healthy(response_time_ms: u64) -> Self {
        Self {
            is_healthy: true,
            queue_depth: 0,
            response_time_ms,
            error_rate: 0.0,
            last_checked: Utc::now(),
        }
    }

    pub fn unhealthy(response_time_ms: u64) -> Self {
        Self {
            is_healthy: false,
            queue_depth: 0,
            response_time_ms,
            error_rate: 1.0,
            last_checked: Utc::now(),
        }
    }

    /// Whether the snapshot is younger than `max_age_secs`.
    pub fn is_fresh(&self, max_age_secs: i64) -> bool {
        (Utc::now() - self.last_checked).num_seconds() < max_age_secs
    }
}

/// Coarse stage reported by a provider while polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderStage {
    Processing,
    DiffusingFrames,
    Uploading,
    Completed,
    Failed,
}

impl ProviderStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderStage::Processing => "PROCESSING",
            ProviderStage::DiffusingFrames => "DIFFUSING_FRAMES",
            ProviderStage::Uploading => "UPLOADING",
            ProviderStage::Completed => "COMPLETED",
            ProviderStage::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProviderStage::Completed | ProviderStage::Failed)
    }

    /// Job status for a non-terminal stage.
    pub fn job_status(&self) -> Option<JobStatus> {
        match self {
            ProviderStage::Processing => Some(JobStatus::Processing),
            ProviderStage::DiffusingFrames => Some(JobStatus::Diffusing),
            ProviderStage::Uploading => Some(JobStatus::Uploading),
            ProviderStage::Completed | ProviderStage::Failed => None,
        }
    }
}

impl fmt::Display for ProviderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
