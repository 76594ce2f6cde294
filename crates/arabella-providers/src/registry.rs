//! Name-keyed table of configured providers.

use std::sync::Arc;

use tracing::info;

use arabella_models::AiProvider;

use crate::provider::VideoProvider;

/// Providers in registration order. Built once by the composition root.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn VideoProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider, replacing any earlier one with the same name.
    pub fn register(&mut self, provider: Arc<dyn VideoProvider>) {
        let name = provider.name();
        self.providers.retain(|p| p.name() != name);
        info!(provider = %name, "Registered AI provider");
        self.providers.push(provider);
    }

    pub fn get(&self, name: AiProvider) -> Option<Arc<dyn VideoProvider>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }

    pub fn all(&self) -> &[Arc<dyn VideoProvider>] {
        &self.providers
    }

    pub fn names(&self) -> Vec<AiProvider> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockProvider;

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProvider::new(false)));
        registry.register(Arc::new(MockProvider::new(true)));

        assert_eq!(registry.len(), 1);
        assert!(registry.get(AiProvider::Mock).is_some());
        assert!(registry.get(AiProvider::WanAi).is_none());
    }
}
