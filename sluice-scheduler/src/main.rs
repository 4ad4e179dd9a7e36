//! Sluice Scheduler
//!
//! A quota-aware admission daemon that holds jobs for one namespace in a
//! first-come-first-served queue and hands them to the cluster only when the
//! namespace's resource quota has room for them.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Repositories: queue store (file or memory) and the cluster HTTP client
//! - Services: queue manager, admission controller, backoff engine
//! - Scheduler: reconciliation pass and the driver that triggers it
//! - API: job intake, status and operator actions over HTTP

mod api;
mod config;
mod repository;
mod scheduler;
mod service;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::AppState;
use crate::config::{Config, StoreKind};
use crate::repository::{FileQueueStore, HttpClusterClient, MemoryQueueStore, QueueStore};
use crate::scheduler::{ReconcileDriver, Reconciler};
use crate::service::{BackoffEngine, PendingQueueManager};
use sluice_core::domain::job::JobState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sluice_scheduler=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Sluice Scheduler");

    // Load configuration
    let config = load_config()?;
    info!(
        "Loaded configuration: namespace={}, cluster_url={}, store={:?}",
        config.namespace, config.cluster_url, config.store
    );

    // Initialize queue store
    let store = open_store(&config).await?;
    let queue = Arc::new(PendingQueueManager::new(store));
    report_recovered(&queue).await?;

    // Initialize cluster client
    let cluster = Arc::new(
        HttpClusterClient::new(config.cluster_url.clone(), config.call_timeout)
            .context("Failed to build cluster client")?,
    );
    info!("Cluster client initialized");

    let reconciler = Arc::new(
        Reconciler::new(
            config.namespace.clone(),
            Arc::clone(&queue),
            cluster.clone(),
            cluster,
            BackoffEngine::new(config.backoff_base, config.backoff_max),
            config.call_timeout,
        )
        .with_prune_scheduled(config.prune_scheduled),
    );

    let (driver, triggers) = ReconcileDriver::new(reconciler, config.poll_interval);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let driver_handle = tokio::spawn(driver.run(shutdown_rx));

    info!(
        "Poll interval: {:?}, backoff: {:?} up to {:?}",
        config.poll_interval, config.backoff_base, config.backoff_max
    );

    // Build router with all API endpoints
    let app = api::create_router(AppState { queue, triggers });

    info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Let the driver finish the pass it may be in before exiting.
    let _ = shutdown_tx.send(true);
    if let Err(e) = driver_handle.await {
        warn!("Reconcile driver task panicked: {}", e);
    }

    if let Err(e) = served {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    info!("Sluice Scheduler stopped");
    Ok(())
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<Config> {
    match Config::from_env() {
        Ok(config) => {
            config.validate()?;
            Ok(config)
        }
        Err(e) => {
            info!("Failed to load config from environment ({}), using defaults", e);
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

async fn open_store(config: &Config) -> Result<Arc<dyn QueueStore>> {
    match config.store {
        StoreKind::File => {
            let store = FileQueueStore::open(&config.data_dir, &config.namespace)
                .await
                .with_context(|| {
                    format!("Failed to open queue store in {}", config.data_dir.display())
                })?;
            info!("Using file queue store at {}", config.data_dir.display());
            Ok(Arc::new(store))
        }
        StoreKind::Memory => {
            warn!("Using in-memory queue store; queued jobs will not survive a restart");
            Ok(Arc::new(MemoryQueueStore::new()))
        }
    }
}

/// Logs what the store still holds from a previous run
async fn report_recovered(queue: &PendingQueueManager) -> Result<()> {
    let pending = queue
        .list_ordered()
        .await
        .context("Failed to read the pending queue")?;

    if pending.is_empty() {
        return Ok(());
    }

    let interrupted = pending
        .iter()
        .filter(|r| r.state == JobState::Admitting)
        .count();
    info!("Recovered {} queued job(s) from the store", pending.len());
    if interrupted > 0 {
        info!(
            "{} job(s) were mid-admission and will be re-evaluated",
            interrupted
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
