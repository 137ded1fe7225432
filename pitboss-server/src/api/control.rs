//! Lifecycle Control API Handlers
//!
//! Start/stop endpoints (single or bulk), the kill-all sweep, and the
//! auto-start controls.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// Target of a start/stop request: one name or a list
#[derive(Debug, Deserialize)]
pub struct TargetRequest {
    pub name: Option<String>,
    pub names: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct BulkEntry {
    pub name: String,
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct BulkResponse {
    pub success: bool,
    pub results: Vec<BulkEntry>,
}

#[derive(Debug, Deserialize)]
pub struct KillAllRequest {
    pub process_names: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct AutoStartConfigRequest {
    pub enabled: bool,
}

/// POST /api/start
/// Start one worker (`{"name": ...}`) or several (`{"names": [...]}`)
pub async fn start_workers(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TargetRequest>,
) -> ApiResult<Response> {
    match (request.name, request.names) {
        (Some(name), _) => {
            let response = state.supervisor.start(&name).await?;
            Ok(Json(response).into_response())
        }
        (None, Some(names)) => {
            let mut results = Vec::new();
            for name in names {
                let entry = match state.supervisor.start(&name).await {
                    Ok(response) => BulkEntry {
                        name,
                        success: true,
                        message: response.message,
                        pid: response.pid,
                    },
                    Err(e) => BulkEntry {
                        name,
                        success: false,
                        message: e.to_string(),
                        pid: None,
                    },
                };
                results.push(entry);
            }
            Ok(Json(BulkResponse {
                success: true,
                results,
            })
            .into_response())
        }
        (None, None) => Err(ApiError::BadRequest(
            "expected 'name' or 'names' field".to_string(),
        )),
    }
}

/// POST /api/stop
/// Stop one worker or several
pub async fn stop_workers(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TargetRequest>,
) -> ApiResult<Response> {
    match (request.name, request.names) {
        (Some(name), _) => {
            let response = state.supervisor.stop(&name).await?;
            Ok(Json(response).into_response())
        }
        (None, Some(names)) => {
            let mut results = Vec::new();
            for name in names {
                let entry = match state.supervisor.stop(&name).await {
                    Ok(response) => BulkEntry {
                        name,
                        success: true,
                        message: response.message,
                        pid: None,
                    },
                    Err(e) => BulkEntry {
                        name,
                        success: false,
                        message: e.to_string(),
                        pid: None,
                    },
                };
                results.push(entry);
            }
            Ok(Json(BulkResponse {
                success: true,
                results,
            })
            .into_response())
        }
        (None, None) => Err(ApiError::BadRequest(
            "expected 'name' or 'names' field".to_string(),
        )),
    }
}

/// POST /api/kill-all
/// Force kill every process matching the given (or derived) name patterns
pub async fn kill_all(
    State(state): State<Arc<AppState>>,
    request: Option<Json<KillAllRequest>>,
) -> impl IntoResponse {
    let patterns = request.and_then(|Json(r)| r.process_names);
    let response = state.supervisor.kill_by_name(patterns).await;
    Json(response)
}

/// POST /api/auto-start
/// Trigger the auto-start sweep; it runs as its own task so the control
/// plane is not held for the staggered launches.
pub async fn trigger_auto_start(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let supervisor = Arc::clone(&state.supervisor);
    tokio::spawn(async move {
        let outcome = supervisor.auto_start_sweep().await;
        info!(
            "auto-start sweep finished: {}/{} started, {} failure(s)",
            outcome.started,
            outcome.attempted,
            outcome.failures.len()
        );
    });

    Json(serde_json::json!({
        "success": true,
        "message": "auto-start triggered",
    }))
}

/// GET /api/auto-start/config
/// Current global flag plus the workers opted in
pub async fn get_auto_start_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let workers: Vec<serde_json::Value> = state
        .registry
        .snapshot_all()
        .into_iter()
        .filter(|r| r.auto_start)
        .map(|r| {
            serde_json::json!({
                "name": r.name,
                "coin_name": r.coin_name,
                "tool_name": r.tool_name,
                "state": r.state,
            })
        })
        .collect();

    Json(serde_json::json!({
        "success": true,
        "global_enabled": state.registry.auto_start_enabled(),
        "auto_start_workers": workers,
    }))
}

/// POST /api/auto-start/config
/// Enable or disable auto-start globally
pub async fn set_auto_start_config(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AutoStartConfigRequest>,
) -> impl IntoResponse {
    state.registry.set_auto_start_enabled(request.enabled);
    info!(
        "auto-start globally {}",
        if request.enabled { "enabled" } else { "disabled" }
    );

    Json(serde_json::json!({
        "success": true,
        "message": format!(
            "auto-start globally {}",
            if request.enabled { "enabled" } else { "disabled" }
        ),
    }))
}
