//! Arabella API server binary.
//!
//! Builds the provider registry, queue, store, hub and worker, then serves
//! HTTP and WebSocket traffic until CTRL+C.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use arabella_api::{create_router, metrics, ApiConfig, AppState, Hub};
use arabella_providers::ProvidersConfig;
use arabella_queue::QueueConfig;
use arabella_store::MemoryStore;
use arabella_worker::{VideoWorker, WorkerConfig, WorkerDeps};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Install rustls crypto provider (required for rustls 0.23+)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("arabella=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting arabella-api");

    // Load configuration
    let config = ApiConfig::from_env();
    let queue_config = QueueConfig::from_env();
    let providers_config = ProvidersConfig::from_env();
    let worker_config = WorkerConfig::from_env();
    info!(
        host = %config.host,
        port = config.port,
        queue_backend = ?queue_config.backend,
        "API config loaded"
    );

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics())
    } else {
        None
    };

    // Providers
    let registry = Arc::new(
        providers_config
            .build_registry()
            .context("Failed to build provider registry")?,
    );
    let selector = Arc::new(providers_config.build_selector(registry));

    // Queue and system of record
    let queue = arabella_queue::connect(queue_config).context("Failed to connect job queue")?;
    let store = Arc::new(MemoryStore::new());
    if config.seed_demo_data {
        store.seed_demo().await;
    }

    // Real-time hub
    let (hub, hub_loop) = Hub::new();
    tokio::spawn(hub_loop.run());

    // Worker
    let worker = Arc::new(VideoWorker::new(
        WorkerDeps {
            queue: Arc::clone(&queue),
            jobs: store.clone(),
            users: store.clone(),
            templates: store.clone(),
            selector: Arc::clone(&selector),
            broadcaster: Arc::new(hub.clone()),
        },
        worker_config,
    ));
    let worker_task = {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move {
            if let Err(e) = worker.run().await {
                error!("Video worker stopped with error: {}", e);
            }
        })
    };

    // Router
    let state = AppState::new(config.clone(), store, queue, selector, hub);
    let app = create_router(state, metrics_handle);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid bind address")?;

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("HTTP server stopped, stopping worker");
    worker.shutdown();
    if let Err(e) = worker_task.await {
        error!("Worker task panicked: {}", e);
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
