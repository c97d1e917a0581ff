//! Ticket Queue Server
//!
//! This binary:
//! - Loads configuration from the environment (and `.env`)
//! - Restores queue state from the last snapshot, if configured
//! - Starts the recovery sweep
//! - Serves the HTTP API and push channels until Ctrl+C
//! - Writes a fresh snapshot on the way out
//!
//! # Usage
//!
//! ```bash
//! QUEUE_SNAPSHOT_PATH=./queue.json cargo run --bin server
//! ```

use std::sync::Arc;
use std::time::Duration;
use ticket_queue_core::QueueEnvironment;
use ticket_queue_core::clock::SystemClock;
use ticket_queue_runtime::metrics::install_recorder;
use ticket_queue_runtime::{InMemoryCatalog, PushHub, QueueManager, QueueSnapshot, spawn_sweeper};
use ticket_queue_web::{AppState, Config, build_router};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ticket queue server...");
    tracing::info!(
        reservation_window_secs = config.queue.reservation_window.as_secs(),
        estimate_mode = %config.queue.estimate_mode,
        holder_disconnect = ?config.queue.holder_disconnect,
        snapshot = ?config.snapshot_path,
        "Configuration loaded"
    );

    let metrics = install_recorder()?;

    let catalog = InMemoryCatalog::new();
    let env = QueueEnvironment::new(Arc::new(SystemClock), config.queue.clone());
    let manager = QueueManager::new(env, Arc::new(catalog.clone()), PushHub::new());

    if let Some(path) = &config.snapshot_path {
        if let Some(snapshot) = QueueSnapshot::load(path).await? {
            // The in-memory catalog starts empty; seed it from the snapshot
            for state in &snapshot.resources {
                catalog.register(state.resource_id, state.availability);
            }
            manager.restore(snapshot).await;
        }
    }

    let sweeper = spawn_sweeper(manager.clone(), config.queue.sweep_interval);

    let app = build_router(
        AppState::new(manager.clone(), catalog, config.websocket).with_metrics(metrics),
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    tracing::info!(address = %config.bind_address(), "Listening");

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Shutting down gracefully...");
            let _ = stop_tx.send(());
            let timeout = Duration::from_secs(config.server.shutdown_timeout);
            match tokio::time::timeout(timeout, &mut server).await {
                Ok(Ok(Ok(()))) => {},
                Ok(Ok(Err(error))) => tracing::error!(%error, "Server error during shutdown"),
                Ok(Err(error)) => tracing::error!(%error, "Server task failed"),
                Err(_) => {
                    tracing::warn!(timeout_secs = timeout.as_secs(), "Shutdown timed out, closing remaining connections");
                    server.abort();
                },
            }
        },
        result = &mut server => {
            result??;
        },
    }

    manager.shutdown();
    sweeper.abort();

    if let Some(path) = &config.snapshot_path {
        manager.snapshot().await.save(path).await?;
    }

    tracing::info!("Ticket queue server stopped");
    Ok(())
}
