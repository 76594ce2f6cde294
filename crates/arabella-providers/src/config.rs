//! Provider configuration and registry wiring.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use arabella_models::AiProvider;

use crate::error::ProviderResult;
use crate::gemini::{self, GeminiVeoConfig, GeminiVeoProvider};
use crate::mock::MockProvider;
use crate::registry::ProviderRegistry;
use crate::selector::{HealthPolicy, ProviderSelector};
use crate::wan::{self, WanAiConfig, WanAiProvider};

#[derive(Debug, Clone)]
pub struct ProvidersConfig {
    pub use_mock: bool,
    /// Mock reports time-based progress instead of finishing immediately
    pub mock_simulate_time: bool,
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub wanai_api_key: Option<String>,
    pub wanai_version: String,
    pub wanai_base_url: String,
    /// Provider that receives the +1000 selection bonus
    pub priority_provider: Option<AiProvider>,
    pub allow_unhealthy: bool,
    pub health_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            use_mock: true,
            mock_simulate_time: false,
            gemini_api_key: None,
            gemini_base_url: gemini::DEFAULT_BASE_URL.to_string(),
            gemini_model: gemini::DEFAULT_MODEL.to_string(),
            wanai_api_key: None,
            wanai_version: wan::DEFAULT_VERSION.to_string(),
            wanai_base_url: wan::DEFAULT_BASE_URL.to_string(),
            priority_provider: Some(AiProvider::WanAi),
            allow_unhealthy: true,
            health_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(300),
        }
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn env_secret(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl ProvidersConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            use_mock: env_flag("USE_MOCK_PROVIDER", defaults.use_mock),
            mock_simulate_time: env_flag("MOCK_SIMULATE_TIME", defaults.mock_simulate_time),
            gemini_api_key: env_secret("GEMINI_API_KEY"),
            gemini_base_url: std::env::var("GEMINI_BASE_URL").unwrap_or(defaults.gemini_base_url),
            gemini_model: std::env::var("GEMINI_VEO_MODEL").unwrap_or(defaults.gemini_model),
            wanai_api_key: env_secret("WANAI_API_KEY"),
            wanai_version: std::env::var("WANAI_VERSION").unwrap_or(defaults.wanai_version),
            wanai_base_url: std::env::var("WANAI_BASE_URL").unwrap_or(defaults.wanai_base_url),
            priority_provider: match std::env::var("PRIORITY_PROVIDER") {
                Ok(v) if v.is_empty() || v.eq_ignore_ascii_case("none") => None,
                Ok(v) => match v.parse() {
                    Ok(p) => Some(p),
                    Err(_) => {
                        warn!(value = %v, "Unknown PRIORITY_PROVIDER, using default");
                        defaults.priority_provider
                    }
                },
                Err(_) => defaults.priority_provider,
            },
            allow_unhealthy: env_flag("ALLOW_UNHEALTHY_PROVIDERS", defaults.allow_unhealthy),
            health_timeout: Duration::from_secs(
                std::env::var("PROVIDER_HEALTH_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            request_timeout: Duration::from_secs(
                std::env::var("PROVIDER_REQUEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
        }
    }

    /// Build the registry from whatever is configured.
    pub fn build_registry(&self) -> ProviderResult<ProviderRegistry> {
        let mut registry = ProviderRegistry::new();

        if let Some(key) = &self.wanai_api_key {
            let config = WanAiConfig {
                api_key: key.clone(),
                base_url: self.wanai_base_url.clone(),
                version: self.wanai_version.clone(),
                request_timeout: self.request_timeout,
                health_timeout: self.health_timeout,
            };
            registry.register(Arc::new(WanAiProvider::new(config)?));
        }

        if let Some(key) = &self.gemini_api_key {
            let config = GeminiVeoConfig {
                api_key: key.clone(),
                base_url: self.gemini_base_url.clone(),
                model: self.gemini_model.clone(),
                request_timeout: self.request_timeout,
                health_timeout: self.health_timeout,
            };
            registry.register(Arc::new(GeminiVeoProvider::new(config)?));
        }

        if self.use_mock {
            registry.register(Arc::new(MockProvider::new(self.mock_simulate_time)));
        }

        if registry.is_empty() {
            warn!("No AI providers configured; every generation will fail");
        } else {
            info!(providers = ?registry.names(), "Provider registry ready");
        }
        Ok(registry)
    }

    /// Selector over `registry` with this config's policy.
    pub fn build_selector(&self, registry: Arc<ProviderRegistry>) -> ProviderSelector {
        ProviderSelector::new(registry)
            .with_priority_provider(self.priority_provider)
            .with_health_policy(HealthPolicy::from_allow_unhealthy(self.allow_unhealthy))
            .with_health_timeout(self.health_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_is_mock_only() {
        let registry = ProvidersConfig::default().build_registry().unwrap();
        assert_eq!(registry.names(), vec![AiProvider::Mock]);
    }

    #[test]
    fn test_registry_with_keys() {
        let config = ProvidersConfig {
            use_mock: false,
            gemini_api_key: Some("g".into()),
            wanai_api_key: Some("w".into()),
            ..Default::default()
        };
        let registry = config.build_registry().unwrap();
        assert_eq!(
            registry.names(),
            vec![AiProvider::WanAi, AiProvider::GeminiVeo]
        );
    }

    #[test]
    fn test_selector_policy_from_config() {
        let config = ProvidersConfig {
            allow_unhealthy: false,
            ..Default::default()
        };
        let selector = config.build_selector(Arc::new(ProviderRegistry::new()));
        assert_eq!(selector.policy(), HealthPolicy::PreferHealthy);
    }
}
