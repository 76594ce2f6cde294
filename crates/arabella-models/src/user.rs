//! Platform users.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Default credits granted to a new account.
pub const DEFAULT_FREE_CREDITS: u32 = 5;

/// Subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserTier {
    #[default]
    Free,
    Premium,
    Pro,
}

impl UserTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserTier::Free => "free",
            UserTier::Premium => "premium",
            UserTier::Pro => "pro",
        }
    }

    pub fn is_paid(&self) -> bool {
        !matches!(self, UserTier::Free)
    }
}

impl fmt::Display for UserTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub credits: u32,
    #[serde(default)]
    pub tier: UserTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a free-tier user with the default credit grant.
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.into(),
            name: name.into(),
            credits: DEFAULT_FREE_CREDITS,
            tier: UserTier::Free,
            subscription_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_tier(mut self, tier: UserTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_credits(mut self, credits: u32) -> Self {
        self.credits = credits;
        self
    }

    /// Paid tier with an unexpired (or open-ended) subscription.
    pub fn is_premium(&self) -> bool {
        if !self.tier.is_paid() {
            return false;
        }
        match self.subscription_expires_at {
            Some(expires) => expires > Utc::now(),
            None => true,
        }
    }

    pub fn has_sufficient_credits(&self, amount: u32) -> bool {
        self.credits >= amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_user_defaults() {
        let user = User::new("a@b.c", "Ada");
        assert_eq!(user.credits, DEFAULT_FREE_CREDITS);
        assert_eq!(user.tier, UserTier::Free);
        assert!(!user.is_premium());
    }

    #[test]
    fn test_expired_subscription_is_not_premium() {
        let mut user = User::new("a@b.c", "Ada").with_tier(UserTier::Pro);
        assert!(user.is_premium());

        user.subscription_expires_at = Some(Utc::now() - Duration::days(1));
        assert!(!user.is_premium());
    }
}
