//! API Module
//!
//! HTTP API layer for the daemon. Each submodule handles endpoints for a
//! specific domain. Handlers only talk to the supervisor service and the
//! registry; no worker I/O happens on the control plane.

pub mod control;
pub mod error;
pub mod health;
pub mod worker;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use pitboss_engine::{SupervisorService, WorkerRegistry};
use tower_http::trace::TraceLayer;

use crate::artifacts::ArtifactFetcher;
use crate::store::ConfigStore;

/// Shared state behind every handler
pub struct AppState {
    pub supervisor: Arc<dyn SupervisorService>,
    pub registry: Arc<WorkerRegistry>,
    pub store: ConfigStore,
    pub fetcher: ArtifactFetcher,
}

/// Create the main API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Worker configuration
        .route("/api/workers", get(worker::list_workers))
        .route("/api/workers", post(worker::update_workers))
        .route("/api/status", get(worker::get_status))
        // Lifecycle control
        .route("/api/start", post(control::start_workers))
        .route("/api/stop", post(control::stop_workers))
        .route("/api/kill-all", post(control::kill_all))
        // Auto-start
        .route("/api/auto-start", post(control::trigger_auto_start))
        .route("/api/auto-start/config", get(control::get_auto_start_config))
        .route("/api/auto-start/config", post(control::set_auto_start_config))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
