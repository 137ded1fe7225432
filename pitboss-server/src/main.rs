//! Pitboss Server
//!
//! Supervision daemon for externally-configured miner executables.
//!
//! Architecture:
//! - Configuration: environment-driven settings with sane defaults
//! - Store: JSON persistence of the worker set, loaded at boot
//! - Engine: registry + supervisor + monitors + termination + reaper
//! - API: axum admin transport over the supervisor operations
//!
//! Background tasks: a delayed auto-start sweep after boot, and a periodic
//! status log of every running worker. On SIGINT/SIGTERM every running
//! worker is stopped through the termination protocol before exit.

mod api;
mod artifacts;
mod config;
mod store;

use std::sync::Arc;

use pitboss_core::domain::worker::WorkerState;
use pitboss_engine::{Supervisor, SupervisorService, WorkerRegistry};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::AppState;
use crate::artifacts::ArtifactFetcher;
use crate::config::Config;
use crate::store::ConfigStore;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "pitboss_server=info,pitboss_engine=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting pitboss...");

    let config = Config::from_env();
    config.validate().expect("invalid configuration");

    // Load the persisted worker set
    let store = ConfigStore::new(config.config_file.clone());
    let specs = store.load();
    tracing::info!("Loaded {} configured worker(s)", specs.len());

    let registry = Arc::new(WorkerRegistry::new(specs));
    let supervisor: Arc<dyn SupervisorService> = Arc::new(Supervisor::new(Arc::clone(&registry)));
    let fetcher = ArtifactFetcher::new(config.artifact_base_url.clone(), config.miners_dir.clone());

    // Boot-time auto-start sweep, delayed so the API is up first
    {
        let supervisor = Arc::clone(&supervisor);
        let delay = config.auto_start_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tracing::info!("Running boot auto-start sweep");
            let outcome = supervisor.auto_start_sweep().await;
            tracing::info!(
                "Boot auto-start: {}/{} started, {} failure(s)",
                outcome.started,
                outcome.attempted,
                outcome.failures.len()
            );
        });
    }

    // Periodic status log; also self-heals records of silently died workers
    {
        let supervisor = Arc::clone(&supervisor);
        let interval = config.status_log_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                log_status(supervisor.as_ref()).await;
            }
        });
    }

    // Build router with all API endpoints
    let state = Arc::new(AppState {
        supervisor: Arc::clone(&supervisor),
        registry,
        store,
        fetcher,
    });
    let app = api::create_router(state);

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(supervisor))
        .await
        .expect("Failed to start server");
}

/// One status sweep: log every running worker with rate, pid and uptime.
async fn log_status(supervisor: &dyn SupervisorService) {
    let all = supervisor.status_all().await;
    let running: Vec<_> = all
        .workers
        .iter()
        .filter(|w| w.state == WorkerState::Running)
        .collect();

    if running.is_empty() {
        tracing::info!("no active workers");
        return;
    }

    for worker in running {
        let uptime_secs = worker
            .started_at
            .map(|t| (chrono::Utc::now() - t).num_seconds().max(0))
            .unwrap_or(0);
        tracing::info!(
            "{}: {} | {} | {:.2} MH/s | pid {} | up {}h {}m",
            worker.name,
            worker.coin_name,
            worker.tool_name,
            worker.hash_rate_mhs,
            worker.pid.unwrap_or(0),
            uptime_secs / 3600,
            (uptime_secs % 3600) / 60,
        );
    }
}

/// Resolves on SIGINT/SIGTERM after stopping every running worker.
async fn shutdown_signal(supervisor: Arc<dyn SupervisorService>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown requested, stopping running workers...");
    let all = supervisor.status_all().await;
    for worker in all
        .workers
        .iter()
        .filter(|w| w.state == WorkerState::Running)
    {
        tracing::info!("Stopping worker '{}'", worker.name);
        if let Err(e) = supervisor.stop(&worker.name).await {
            tracing::warn!("Failed to stop '{}': {}", worker.name, e);
        }
    }
    tracing::info!("Shutdown complete");
}
