//! Pre-built video templates.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AiProvider, User, VideoParams};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    /// Also used as the seed image for image-to-video providers
    #[serde(default)]
    pub thumbnail_url: String,
    pub base_prompt: String,
    pub default_params: VideoParams,
    pub credit_cost: u32,
    /// Typical end-to-end generation time in seconds
    pub estimated_time_secs: u32,
    pub is_premium: bool,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_provider: Option<AiProvider>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub usage_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Template {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        base_prompt: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            category: category.into(),
            description: String::new(),
            thumbnail_url: String::new(),
            base_prompt: base_prompt.into(),
            default_params: VideoParams::default(),
            credit_cost: 1,
            estimated_time_secs: 60,
            is_premium: false,
            is_active: true,
            preferred_provider: None,
            tags: Vec::new(),
            usage_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Compose the prompt sent to providers.
    pub fn resolve_prompt(&self, user_prompt: &str) -> String {
        format!("{}. {}", self.base_prompt, user_prompt)
    }

    pub fn can_be_used_by(&self, user: &User) -> bool {
        if !self.is_active {
            return false;
        }
        if self.is_premium && !user.is_premium() {
            return false;
        }
        user.has_sufficient_credits(self.credit_cost)
    }

    pub fn increment_usage(&mut self) {
        self.usage_count += 1;
        self.updated_at = Utc::now();
    }
}
