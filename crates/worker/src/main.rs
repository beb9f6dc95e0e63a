use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use erpsync_db::repositories::SyncRunRepo;
use erpsync_events::{EventBus, EventPersistence};
use erpsync_sync::remote::HttpAccountingClient;
use erpsync_sync::store::PgStore;
use erpsync_worker::{Services, WorkerConfig};

/// Note stored on runs left `running` by a previous process.
const ABANDONED_RUN_NOTE: &str = "abandoned: worker restarted";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "erpsync_worker=debug,erpsync_sync=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = WorkerConfig::from_env()?;
    tracing::info!(
        api_url = %config.api_url,
        interval_secs = config.sync_interval.as_secs(),
        max_parallel = config.job.max_parallel,
        "Loaded worker configuration",
    );

    // --- Database ---
    let pool = erpsync_db::create_pool(&config.database_url, config.max_connections)
        .await
        .context("Failed to connect to database")?;
    erpsync_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    erpsync_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database ready");

    let abandoned = SyncRunRepo::fail_abandoned(&pool, ABANDONED_RUN_NOTE).await?;
    if abandoned > 0 {
        tracing::warn!(abandoned, "Closed sync runs left running by a previous process");
    }

    // --- Event bus ---
    let events = Arc::new(EventBus::default());
    let persistence_handle = tokio::spawn(EventPersistence::run(pool.clone(), events.subscribe()));

    // --- Engine ---
    let api = HttpAccountingClient::new(
        &config.api_url,
        config.api_token.clone(),
        config.job.call_timeout,
    )
    .context("Failed to build accounting API client")?;
    let services = Services::new(
        Arc::new(PgStore::new(pool.clone())),
        Arc::new(api),
        Arc::clone(&events),
        &config,
    );

    let cancel = CancellationToken::new();
    let scheduler_handle = tokio::spawn(services.scheduler(&config).run(cancel.clone()));
    tracing::info!("Worker started");

    shutdown_signal().await;

    // --- Shutdown ---
    tracing::info!("Shutdown requested, cancelling in-flight runs");
    services.orchestrator.shutdown();
    cancel.cancel();
    if tokio::time::timeout(Duration::from_secs(60), scheduler_handle)
        .await
        .is_err()
    {
        tracing::warn!("Scheduler did not stop within 60s");
    }

    // Dropping the last sender closes the channel and ends persistence.
    drop(services);
    drop(events);
    let _ = tokio::time::timeout(Duration::from_secs(5), persistence_handle).await;
    tracing::info!("Worker stopped");
    Ok(())
}

/// Wait for SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
