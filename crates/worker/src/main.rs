//! `gas-worker` -- annotation job worker daemon.
//!
//! Long-polls the request queue, runs the annotation pipeline for each job
//! request, uploads the results, and records job status in Postgres.
//! Configuration is read from the environment; see [`gas_worker::config`].

use std::sync::Arc;

use gas_cloud::{S3ObjectStore, SqsRequestQueue};
use gas_core::pipeline::AnnotatorExecutor;
use gas_db::PgJobStore;
use gas_worker::publisher::ResultPublisher;
use gas_worker::state::JobStateClient;
use gas_worker::workspace::WorkspaceManager;
use gas_worker::{Dispatcher, JobProcessor, WorkerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gas_worker=info,gas_cloud=info,gas_db=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });
    tracing::info!(
        queue_url = %config.queue_url,
        results_bucket = %config.results_bucket,
        workspace_root = %config.workspace_root.display(),
        pipeline_timeout_secs = config.pipeline_timeout.as_secs(),
        "Loaded worker configuration",
    );

    // --- Database ---
    let pool = gas_db::create_pool(&config.database_url)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to connect to database");
            std::process::exit(1);
        });
    if let Err(e) = gas_db::health_check(&pool).await {
        tracing::error!(error = %e, "Database health check failed");
        std::process::exit(1);
    }
    if let Err(e) = gas_db::run_migrations(&pool).await {
        tracing::error!(error = %e, "Failed to run database migrations");
        std::process::exit(1);
    }
    tracing::info!("Database ready");

    // --- Components ---
    let sdk_config = gas_cloud::load_sdk_config(config.region.as_deref()).await;
    let storage = Arc::new(S3ObjectStore::new(&sdk_config));
    let queue = Arc::new(SqsRequestQueue::new(&sdk_config, config.queue_url.clone()));

    let state = Arc::new(JobStateClient::new(
        Arc::new(PgJobStore::new(pool)),
        config.store_retry.clone(),
    ));
    let workspace = Arc::new(WorkspaceManager::new(
        config.workspace_root.clone(),
        storage.clone(),
    ));
    let executor = Arc::new(AnnotatorExecutor::new(
        config.annotator_program.clone(),
        config.annotator_args.clone(),
        config.pipeline_timeout,
    ));
    let publisher = ResultPublisher::new(storage, state.clone(), workspace.clone());
    let processor = Arc::new(JobProcessor::new(
        workspace,
        state,
        executor,
        publisher,
        config.results_bucket.clone(),
        config.result_prefix.clone(),
    ));
    let dispatcher = Dispatcher::new(
        queue,
        processor,
        config.concurrency,
        config.max_messages,
        config.wait_time,
    );

    // --- Run ---
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    dispatcher.run(cancel).await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
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
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), finishing in-flight messages");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, finishing in-flight messages");
        }
    }
}
