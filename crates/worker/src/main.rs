use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mosaic_core::paths::DataRoot;
use mosaic_db::models::status::TaskStatus;
use mosaic_db::models::task::TaskListQuery;
use mosaic_events::{BroadcastBus, PgRelay};
use mosaic_tasks::TaskManager;
use mosaic_worker::config::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "mosaic_worker=debug,mosaic_tasks=info,mosaic_pipeline=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env()?;
    tracing::info!(data_root = %config.data_root.display(), "Loaded worker configuration");

    // --- Database ---
    let pool = mosaic_db::connect(&config.database_url).await?;
    tracing::info!("Database connection pool created");

    // --- Startup election ---
    let data_root = DataRoot::new(&config.data_root);
    let elected = mosaic_tasks::startup::bootstrap(&pool, &data_root).await?;
    if elected {
        tracing::info!("Startup work completed by this process");
    } else {
        tracing::info!("Startup work handled by a sibling process");
    }

    // --- Broadcast bus and cross-process relay ---
    let bus = Arc::new(BroadcastBus::default());
    let relay_cancel = CancellationToken::new();
    let relay = PgRelay::new(pool.clone(), Arc::clone(&bus));
    let relay_handle = tokio::spawn({
        let cancel = relay_cancel.clone();
        async move { relay.run(cancel).await }
    });
    tracing::info!(origin = bus.origin(), "Broadcast relay started");

    // --- Task manager ---
    let manager = TaskManager::new(pool.clone(), Arc::clone(&bus));
    let running = manager
        .list_all(&TaskListQuery {
            status_id: Some(TaskStatus::Running.id()),
            limit: None,
            offset: None,
        })
        .await?
        .len();
    if running > 0 {
        // Records still marked running belong to sibling processes, or to
        // a crashed one; they stay cancellable through the store.
        tracing::info!(running, "Task records currently marked running");
    }
    tracing::info!("Task manager ready");

    shutdown_signal().await;

    // --- Shutdown ---
    let signalled = manager.cancel_all_local();
    if signalled > 0 {
        tracing::info!(signalled, "Signalled in-flight tasks to stop");
        // Give targets a moment to observe their tokens and finalise
        // their records before the process exits.
        tokio::time::sleep(Duration::from_secs(2)).await;
    }

    relay_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), relay_handle).await;
    tracing::info!("Broadcast relay stopped");
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM so the worker stops cleanly whether it runs
/// interactively or under a process manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
