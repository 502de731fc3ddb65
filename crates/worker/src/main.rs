//! BarkBase workflow worker binary.
//!
//! Polls PostgreSQL for due executions, triggers, and scheduled jobs,
//! and shuts down gracefully on SIGINT/SIGTERM.

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use barkbase_engine::db::{create_pool, health_check};
use barkbase_worker::{Worker, WorkerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,barkbase_worker=debug,barkbase_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    tracing::info!("Starting BarkBase workflow worker");

    // Load configuration
    let config = WorkerConfig::from_env()?;
    tracing::info!(
        worker_id = %config.worker_id,
        database = %config.database.database,
        notify_url = %config.engine.notify_url,
        "Worker configuration loaded"
    );

    // Connect to the database
    let pool = create_pool(&config.database).await?;
    if !health_check(&pool).await {
        tracing::warn!("Database health check failed at startup");
    }

    // Create the worker
    let worker = Worker::new(config, pool)?;

    // Cancel the token on shutdown signals; the loop observes it
    // between iterations.
    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received");
        signal_token.cancel();
    });

    worker.run(token).await;

    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
