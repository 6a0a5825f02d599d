//! Turnstile reconciliation service.
//!
//! Replays check-ins captured by offline scanners against the `PostgreSQL`
//! system of record until interrupted.

mod config;

use config::ReconcilerConfig;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use turnstile_core::SystemClock;
use turnstile_postgres::{
    PostgresAuditLog, PostgresEventDirectory, PostgresPendingQueue, PostgresTicketStore,
};
use turnstile_runtime::metrics::MetricsServer;
use turnstile_runtime::{CheckInCoordinator, Reconciler, ScanEnvironment, ScanPolicy};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,turnstile=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ReconcilerConfig::from_env();
    let policy = ScanPolicy::from_env();
    info!(
        max_connections = config.max_connections,
        batch_size = config.batch_size,
        max_retries = config.max_retries,
        metrics_addr = %config.metrics_addr,
        "Configuration loaded"
    );

    let pool = turnstile_postgres::connect(&config.database_url, config.max_connections).await?;
    turnstile_postgres::migrate(&pool).await?;
    info!("Database ready");

    let mut metrics = MetricsServer::new(config.metrics_addr);
    metrics.start()?;

    let env = ScanEnvironment::new(
        Arc::new(PostgresTicketStore::new(pool.clone())),
        Arc::new(PostgresEventDirectory::new(pool.clone())),
        Arc::new(PostgresAuditLog::new(pool.clone())),
        Arc::new(SystemClock),
        policy,
    );
    let reconciler = Reconciler::new(
        Arc::new(PostgresPendingQueue::new(pool.clone())),
        CheckInCoordinator::new(env),
        config.settings(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(async move { reconciler.run(shutdown_rx).await });

    signal::ctrl_c().await?;
    info!("Shutdown signal received, finishing the current pass");
    shutdown_tx.send(true)?;
    worker.await?;

    pool.close().await;
    info!("Reconciler stopped");
    Ok(())
}
