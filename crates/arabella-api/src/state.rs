//! Application state.

use std::sync::Arc;

use arabella_providers::ProviderSelector;
use arabella_queue::JobQueue;
use arabella_store::{JobRepository, TemplateRepository, UserRepository};

use crate::config::ApiConfig;
use crate::hub::Hub;
use crate::services::GenerationService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub queue: Arc<dyn JobQueue>,
    pub selector: Arc<ProviderSelector>,
    pub hub: Hub,
    pub generation: GenerationService,
}

impl AppState {
    /// Wire the request-path services over an already built back end.
    pub fn new<S>(
        config: ApiConfig,
        store: Arc<S>,
        queue: Arc<dyn JobQueue>,
        selector: Arc<ProviderSelector>,
        hub: Hub,
    ) -> Self
    where
        S: JobRepository + UserRepository + TemplateRepository + 'static,
    {
        let generation = GenerationService::new(
            store.clone(),
            store.clone(),
            store,
            Arc::clone(&queue),
            Arc::new(hub.clone()),
        )
        .with_wait_per_position(config.queue_wait_per_position);

        Self {
            config,
            queue,
            selector,
            hub,
            generation,
        }
    }
}
