//! Replica Console - cluster replica management and metrics pipeline
//!
//! Serves health, metrics and job endpoints, and runs the replica metrics
//! collection and retention jobs against every registered cluster.
//!
//! Replica browsing and actions (`ReplicaDirectory`, `ReplicaOperations`)
//! are library entry points for the web layer in front of the console and
//! are not routed by this binary.

use anyhow::{Context, Result};
use console_lib::{
    backend::{BackendRegistry, KubernetesBackend},
    health::{components, HealthRegistry},
    metrics::{JobGuard, JobScheduler, MetricsCollector, Pruner, ReplicaJobs},
    observability::{ConsoleMetrics, StructuredLogger},
    store::{MemoryStore, RecordStores},
};
use replica_console::{api, config::ConsoleConfig};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const CONSOLE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting replica-console");

    let config = ConsoleConfig::load()?;
    info!(instance = %config.instance_name, api_port = config.api_port, "Console configured");

    let health_registry = HealthRegistry::new();
    health_registry.register(components::COLLECTOR).await;
    health_registry.register(components::PRUNER).await;

    // Registers the Prometheus collectors before the first scrape
    let _metrics = ConsoleMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);

    let store = match &config.inventory_path {
        Some(path) => Arc::new(
            MemoryStore::load(path)
                .await
                .with_context(|| format!("failed to load inventory from {path}"))?,
        ),
        None => {
            warn!("No inventory_path configured, starting with an empty inventory");
            Arc::new(MemoryStore::new())
        }
    };
    let stores = RecordStores::from_memory(store.clone());

    let registry = BackendRegistry::builder()
        .register(Arc::new(KubernetesBackend::new(config.kubernetes_config())))
        .build();

    let collector = MetricsCollector::new(
        stores,
        store.clone(),
        registry.clone(),
        logger.clone(),
    );
    let pruner = Pruner::new(store, config.retention_horizon_hours, logger.clone());
    let jobs = ReplicaJobs::new(
        Arc::new(collector),
        Arc::new(pruner),
        JobGuard::new(),
        health_registry.clone(),
    );

    let (shutdown_tx, _) = broadcast::channel(1);
    let job_handles =
        JobScheduler::new(jobs.clone(), config.scheduler_config()).spawn(&shutdown_tx);

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), jobs));
    let mut api_shutdown = shutdown_tx.subscribe();
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state, async move {
        let _ = api_shutdown.recv().await;
    }));

    logger.log_startup(CONSOLE_VERSION, &registry.cluster_types());
    health_registry.set_ready(true).await;

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;

    let _ = shutdown_tx.send(());
    for handle in job_handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "Job task ended abnormally");
        }
    }
    match api_handle.await {
        Ok(Err(e)) => warn!(error = %e, "API server stopped with error"),
        Err(e) => warn!(error = %e, "API server task ended abnormally"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}
