//! Provider selection policy.
//!
//! A preferred provider that is registered always wins. Otherwise providers
//! are filtered by resolution and duration, then scored:
//!
//! | Rule                               | Points              |
//! |------------------------------------|---------------------|
//! | designated priority provider       | +1000               |
//! | deterministic mock                 | -500                |
//! | premium quality, paying user       | +30                 |
//! | standard quality                   | +20                 |
//! | budget quality                     | +10                 |
//! | speed                              | 100 - secs per sec  |

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use arabella_models::{
    AiProvider, AspectRatio, ProviderCapabilities, ProviderHealth, QualityTier, Resolution,
    UserTier, VideoJob,
};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::VideoProvider;
use crate::registry::ProviderRegistry;

/// What a job needs from a provider.
#[derive(Debug, Clone)]
pub struct SelectionCriteria {
    pub user_tier: UserTier,
    pub preferred_provider: Option<AiProvider>,
    pub required_resolution: Resolution,
    pub required_duration: u32,
    pub aspect_ratio: AspectRatio,
}

impl SelectionCriteria {
    pub fn for_job(job: &VideoJob, user_tier: UserTier) -> Self {
        Self {
            user_tier,
            preferred_provider: job.preferred_provider,
            required_resolution: job.params.resolution,
            required_duration: job.params.duration,
            aspect_ratio: job.params.aspect_ratio,
        }
    }
}

/// How health snapshots affect eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthPolicy {
    /// Unhealthy providers are logged and stay eligible
    #[default]
    Advisory,
    /// Unhealthy non-preferred providers are skipped when another is registered
    PreferHealthy,
}

impl HealthPolicy {
    pub fn from_allow_unhealthy(allow: bool) -> Self {
        if allow {
            HealthPolicy::Advisory
        } else {
            HealthPolicy::PreferHealthy
        }
    }
}

pub struct ProviderSelector {
    registry: Arc<ProviderRegistry>,
    priority_provider: Option<AiProvider>,
    policy: HealthPolicy,
    health_timeout: Duration,
    health_cache: RwLock<HashMap<AiProvider, ProviderHealth>>,
}

impl ProviderSelector {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            priority_provider: Some(AiProvider::WanAi),
            policy: HealthPolicy::default(),
            health_timeout: Duration::from_secs(5),
            health_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_priority_provider(mut self, provider: Option<AiProvider>) -> Self {
        self.priority_provider = provider;
        self
    }

    pub fn with_health_policy(mut self, policy: HealthPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn policy(&self) -> HealthPolicy {
        self.policy
    }

    /// Pick the provider for a job.
    pub async fn select(
        &self,
        criteria: &SelectionCriteria,
    ) -> ProviderResult<Arc<dyn VideoProvider>> {
        if let Some(preferred) = criteria.preferred_provider {
            if let Some(provider) = self.registry.get(preferred) {
                let health = self.check_health(provider.as_ref()).await;
                if !health.is_healthy {
                    warn!(provider = %preferred, "Preferred provider unhealthy, using it anyway");
                }
                info!(provider = %preferred, healthy = health.is_healthy, "Selected preferred provider");
                return Ok(provider);
            }
            debug!(provider = %preferred, "Preferred provider not registered");
        }

        if self.registry.is_empty() {
            return Err(ProviderError::unavailable("no providers registered"));
        }
        let multiple = self.registry.len() > 1;

        let mut best: Option<(i64, Arc<dyn VideoProvider>)> = None;
        for provider in self.registry.all() {
            let name = provider.name();
            let caps = provider.capabilities();

            if !caps.max_resolution.covers(criteria.required_resolution) {
                debug!(provider = %name, max = %caps.max_resolution, "Resolution not supported");
                continue;
            }
            if caps.max_duration < criteria.required_duration {
                debug!(provider = %name, max = caps.max_duration, "Duration not supported");
                continue;
            }
            if !caps.supports_ratio(criteria.aspect_ratio) {
                debug!(provider = %name, ratio = %criteria.aspect_ratio, "Aspect ratio not listed");
            }

            let health = self.check_health(provider.as_ref()).await;
            if !health.is_healthy {
                match self.policy {
                    HealthPolicy::PreferHealthy if multiple => {
                        warn!(provider = %name, "Skipping unhealthy provider");
                        continue;
                    }
                    _ => warn!(provider = %name, "Provider unhealthy, keeping it eligible"),
                }
            }

            let score = score_provider(name, &caps, criteria.user_tier, self.priority_provider);
            debug!(provider = %name, score, "Scored provider");
            if best.as_ref().map_or(true, |(s, _)| score > *s) {
                best = Some((score, Arc::clone(provider)));
            }
        }

        match best {
            Some((score, provider)) => {
                info!(provider = %provider.name(), score, "Selected provider");
                Ok(provider)
            }
            None => Err(ProviderError::unavailable(format!(
                "no provider supports {} for {}s",
                criteria.required_resolution, criteria.required_duration
            ))),
        }
    }

    /// Providers currently reporting healthy.
    pub async fn available_providers(&self) -> Vec<Arc<dyn VideoProvider>> {
        let mut available = Vec::new();
        for provider in self.registry.all() {
            if self.check_health(provider.as_ref()).await.is_healthy {
                available.push(Arc::clone(provider));
            }
        }
        available
    }

    /// Re-probe every provider and refresh the cache.
    pub async fn refresh_health(&self) {
        for provider in self.registry.all() {
            self.check_health(provider.as_ref()).await;
        }
    }

    /// Last recorded health per provider.
    pub async fn cached_health(&self) -> HashMap<AiProvider, ProviderHealth> {
        self.health_cache.read().await.clone()
    }

    async fn check_health(&self, provider: &dyn VideoProvider) -> ProviderHealth {
        let start = Instant::now();
        let health = match tokio::time::timeout(self.health_timeout, provider.health_check()).await
        {
            Ok(health) => health,
            Err(_) => {
                warn!(provider = %provider.name(), "Health check timed out");
                ProviderHealth::unhealthy(start.elapsed().as_millis() as u64)
            }
        };
        self.health_cache
            .write()
            .await
            .insert(provider.name(), health.clone());
        health
    }
}

fn score_provider(
    name: AiProvider,
    caps: &ProviderCapabilities,
    tier: UserTier,
    priority: Option<AiProvider>,
) -> i64 {
    let mut score: i64 = 0;

    if priority == Some(name) {
        score += 1000;
    }
    if name == AiProvider::Mock {
        score -= 500;
    }

    score += match caps.quality_tier {
        QualityTier::Premium if tier != UserTier::Free => 30,
        QualityTier::Premium => 0,
        QualityTier::Standard => 20,
        QualityTier::Budget => 10,
    };

    score + 100 - i64::from(caps.estimated_time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{GenerationProgress, GenerationRequest, GenerationResult};
    use async_trait::async_trait;
    use mockall::mock;

    mock! {
        pub Backend {}

        #[async_trait]
        impl VideoProvider for Backend {
            fn name(&self) -> AiProvider;
            async fn generate_video(&self, request: &GenerationRequest) -> ProviderResult<GenerationResult>;
            async fn get_progress(&self, provider_job_id: &str) -> ProviderResult<GenerationProgress>;
            async fn cancel_generation(&self, provider_job_id: &str) -> ProviderResult<()>;
            fn capabilities(&self) -> ProviderCapabilities;
            async fn health_check(&self) -> ProviderHealth;
        }
    }

    struct Fixture {
        name: AiProvider,
        max_duration: u32,
        max_resolution: Resolution,
        tier: QualityTier,
        estimated_time: u32,
        healthy: bool,
    }

    fn backend(spec: Fixture) -> Arc<dyn VideoProvider> {
        let caps = ProviderCapabilities {
            name: spec.name.to_string(),
            max_duration: spec.max_duration,
            max_resolution: spec.max_resolution,
            supported_ratios: vec![AspectRatio::LANDSCAPE],
            estimated_time: spec.estimated_time,
            quality_tier: spec.tier,
            supports_styles: false,
            cost_per_second: 0.0,
        };
        let health = if spec.healthy {
            ProviderHealth::healthy(10)
        } else {
            ProviderHealth::unhealthy(10)
        };

        let mut mock = MockBackend::new();
        mock.expect_name().return_const(spec.name);
        mock.expect_capabilities().returning(move || caps.clone());
        mock.expect_health_check().returning(move || health.clone());
        Arc::new(mock)
    }

    fn wan(healthy: bool) -> Arc<dyn VideoProvider> {
        backend(Fixture {
            name: AiProvider::WanAi,
            max_duration: 10,
            max_resolution: Resolution::FullHd1080,
            tier: QualityTier::Standard,
            estimated_time: 20,
            healthy,
        })
    }

    fn gemini(healthy: bool) -> Arc<dyn VideoProvider> {
        backend(Fixture {
            name: AiProvider::GeminiVeo,
            max_duration: 120,
            max_resolution: Resolution::Uhd4k,
            tier: QualityTier::Premium,
            estimated_time: 30,
            healthy,
        })
    }

    fn mock_double() -> Arc<dyn VideoProvider> {
        backend(Fixture {
            name: AiProvider::Mock,
            max_duration: 60,
            max_resolution: Resolution::FullHd1080,
            tier: QualityTier::Standard,
            estimated_time: 5,
            healthy: true,
        })
    }

    fn selector(providers: Vec<Arc<dyn VideoProvider>>) -> ProviderSelector {
        let mut registry = ProviderRegistry::new();
        for p in providers {
            registry.register(p);
        }
        ProviderSelector::new(Arc::new(registry))
    }

    fn criteria(duration: u32, resolution: Resolution) -> SelectionCriteria {
        SelectionCriteria {
            user_tier: UserTier::Pro,
            preferred_provider: None,
            required_resolution: resolution,
            required_duration: duration,
            aspect_ratio: AspectRatio::LANDSCAPE,
        }
    }

    #[tokio::test]
    async fn test_priority_provider_wins_when_eligible() {
        let s = selector(vec![gemini(true), wan(true), mock_double()]);
        let chosen = s.select(&criteria(5, Resolution::FullHd1080)).await.unwrap();
        assert_eq!(chosen.name(), AiProvider::WanAi);
    }

    #[tokio::test]
    async fn test_short_max_duration_never_selected() {
        let s = selector(vec![wan(true), gemini(true)]);
        for duration in [11, 15, 60] {
            let chosen = s
                .select(&criteria(duration, Resolution::Hd720))
                .await
                .unwrap();
            assert_eq!(chosen.name(), AiProvider::GeminiVeo);
        }

        let only_wan = selector(vec![wan(true)]);
        assert!(matches!(
            only_wan.select(&criteria(15, Resolution::Hd720)).await,
            Err(ProviderError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_resolution_filter() {
        let s = selector(vec![wan(true), gemini(true)]);
        let chosen = s.select(&criteria(5, Resolution::Uhd4k)).await.unwrap();
        assert_eq!(chosen.name(), AiProvider::GeminiVeo);
    }

    #[tokio::test]
    async fn test_preferred_used_even_when_unhealthy() {
        let s = selector(vec![wan(true), gemini(false)]);
        let mut c = criteria(5, Resolution::FullHd1080);
        c.preferred_provider = Some(AiProvider::GeminiVeo);

        let chosen = s.select(&c).await.unwrap();
        assert_eq!(chosen.name(), AiProvider::GeminiVeo);
    }

    #[tokio::test]
    async fn test_mock_is_last_resort() {
        let s = selector(vec![mock_double(), gemini(true)]).with_priority_provider(None);
        let mut c = criteria(15, Resolution::FullHd1080);
        c.user_tier = UserTier::Free;

        let chosen = s.select(&c).await.unwrap();
        assert_eq!(chosen.name(), AiProvider::GeminiVeo);
    }

    #[tokio::test]
    async fn test_health_policy() {
        let advisory = selector(vec![wan(false), gemini(true)]);
        let chosen = advisory
            .select(&criteria(5, Resolution::FullHd1080))
            .await
            .unwrap();
        assert_eq!(chosen.name(), AiProvider::WanAi);

        let strict =
            selector(vec![wan(false), gemini(true)]).with_health_policy(HealthPolicy::PreferHealthy);
        let chosen = strict
            .select(&criteria(5, Resolution::FullHd1080))
            .await
            .unwrap();
        assert_eq!(chosen.name(), AiProvider::GeminiVeo);

        // A sole provider stays eligible
        let sole = selector(vec![wan(false)]).with_health_policy(HealthPolicy::PreferHealthy);
        assert!(sole.select(&criteria(5, Resolution::Hd720)).await.is_ok());
    }

    #[tokio::test]
    async fn test_available_providers_and_cache() {
        let s = selector(vec![wan(false), gemini(true)]);
        let available = s.available_providers().await;
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].name(), AiProvider::GeminiVeo);

        let cache = s.cached_health().await;
        assert!(!cache[&AiProvider::WanAi].is_healthy);
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let s = selector(Vec::new());
        assert!(matches!(
            s.select(&criteria(5, Resolution::Hd720)).await,
            Err(ProviderError::Unavailable(_))
        ));
    }

    #[test]
    fn test_premium_bonus_only_for_paying_users() {
        let caps = ProviderCapabilities {
            name: "x".into(),
            max_duration: 60,
            max_resolution: Resolution::Uhd4k,
            supported_ratios: vec![],
            estimated_time: 30,
            quality_tier: QualityTier::Premium,
            supports_styles: true,
            cost_per_second: 0.05,
        };
        let free = score_provider(AiProvider::GeminiVeo, &caps, UserTier::Free, None);
        let paid = score_provider(AiProvider::GeminiVeo, &caps, UserTier::Premium, None);
        assert_eq!(free, 70);
        assert_eq!(paid, 100);
    }
}
