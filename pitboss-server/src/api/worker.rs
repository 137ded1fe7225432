//! Worker Configuration API Handlers
//!
//! Endpoints for listing workers, replacing the configuration wholesale,
//! and reading status snapshots.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use pitboss_core::domain::worker::{ConfigPayload, WorkerSpec};
use pitboss_core::dto::worker::{ConfigResult, StatusReport, WorkerDefinition};
use pitboss_engine::tools::default_files;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    pub success: bool,
    pub results: Vec<ConfigResult>,
}

#[derive(Debug, Serialize)]
pub struct WorkerListEntry {
    pub name: String,
    pub coin_name: String,
    pub tool_name: String,
    pub config_path: String,
    pub command: String,
    pub auto_start: bool,
}

#[derive(Debug, Serialize)]
pub struct WorkerListResponse {
    pub success: bool,
    pub workers: Vec<WorkerListEntry>,
}

#[derive(Debug, Serialize)]
pub struct StatusOneResponse {
    pub success: bool,
    pub worker: StatusReport,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub name: Option<String>,
}

/// POST /api/workers
/// Wholesale configuration replacement: fetch artifacts for every
/// definition, rebuild the registry from the successful ones, persist, and
/// reap processes left over from the superseded tool set.
pub async fn update_workers(
    State(state): State<Arc<AppState>>,
    Json(definitions): Json<Vec<WorkerDefinition>>,
) -> ApiResult<Json<UpdateResponse>> {
    info!("replacing configuration with {} worker(s)", definitions.len());

    let previous_tools = state.registry.tool_names();

    let mut results = Vec::new();
    let mut specs = Vec::new();
    for def in definitions {
        if def.name.trim().is_empty() {
            results.push(ConfigResult {
                name: def.name,
                success: false,
                message: "worker name cannot be empty".to_string(),
            });
            continue;
        }

        let files = def
            .required_files
            .clone()
            .unwrap_or_else(|| default_files(&def.tool_name));

        match state.fetcher.ensure_files(&def.coin_name, &files).await {
            Ok(install_dir) => {
                let config_path = install_dir.join("config.json");
                specs.push(WorkerSpec {
                    name: def.name.clone(),
                    coin_name: def.coin_name,
                    tool_name: def.tool_name,
                    install_dir,
                    config_path,
                    required_files: files,
                    payload: def.payload,
                    auto_start: def.auto_start,
                });
                results.push(ConfigResult {
                    name: def.name,
                    success: true,
                    message: "configuration updated".to_string(),
                });
            }
            Err(e) => {
                warn!("artifact provisioning for '{}' failed: {:#}", def.name, e);
                results.push(ConfigResult {
                    name: def.name,
                    success: false,
                    message: format!("artifact provisioning failed: {e}"),
                });
            }
        }
    }

    state.registry.replace_all(specs.clone());
    state
        .store
        .save(&specs)
        .map_err(|e| ApiError::InternalError(format!("failed to persist configuration: {e}")))?;

    // Processes belonging to the superseded configuration are orphans now;
    // sweep them in the background.
    if !previous_tools.is_empty() {
        let supervisor = Arc::clone(&state.supervisor);
        tokio::spawn(async move {
            let response = supervisor.kill_by_name(Some(previous_tools)).await;
            info!(
                "post-replacement sweep finished: {} process(es) reaped",
                response.killed_count
            );
        });
    }

    Ok(Json(UpdateResponse {
        success: true,
        results,
    }))
}

/// GET /api/workers
/// List all configured workers with their display command lines
pub async fn list_workers(State(state): State<Arc<AppState>>) -> Json<WorkerListResponse> {
    let workers = state
        .registry
        .specs()
        .into_iter()
        .map(|spec| {
            let command = display_command(&spec);
            WorkerListEntry {
                name: spec.name,
                coin_name: spec.coin_name,
                tool_name: spec.tool_name,
                config_path: spec.config_path.display().to_string(),
                command,
                auto_start: spec.auto_start,
            }
        })
        .collect();

    Json(WorkerListResponse {
        success: true,
        workers,
    })
}

/// GET /api/status
/// Snapshot of one worker (`?name=`) or of all workers
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Response> {
    match query.name {
        Some(name) => {
            let worker = state.supervisor.status(&name).await?;
            Ok(Json(StatusOneResponse {
                success: true,
                worker,
            })
            .into_response())
        }
        None => {
            let all = state.supervisor.status_all().await;
            Ok(Json(all).into_response())
        }
    }
}

fn display_command(spec: &WorkerSpec) -> String {
    let exe = spec.install_dir.join(&spec.tool_name);
    match &spec.payload {
        ConfigPayload::Structured(_) => {
            format!("\"{}\" -c \"{}\"", exe.display(), spec.config_path.display())
        }
        ConfigPayload::RawArgs(args) if args.is_empty() => format!("\"{}\"", exe.display()),
        ConfigPayload::RawArgs(args) => format!("\"{}\" {}", exe.display(), args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn spec(payload: ConfigPayload) -> WorkerSpec {
        WorkerSpec {
            name: "w1".to_string(),
            coin_name: "vrsc".to_string(),
            tool_name: "ccminer".to_string(),
            install_dir: PathBuf::from("/opt/miners/vrsc"),
            config_path: PathBuf::from("/opt/miners/vrsc/config.json"),
            required_files: vec![],
            payload,
            auto_start: false,
        }
    }

    #[test]
    fn test_display_command_structured() {
        let cmd = display_command(&spec(ConfigPayload::Structured(serde_json::json!({}))));
        assert_eq!(
            cmd,
            "\"/opt/miners/vrsc/ccminer\" -c \"/opt/miners/vrsc/config.json\""
        );
    }

    #[test]
    fn test_display_command_raw_args() {
        let cmd = display_command(&spec(ConfigPayload::RawArgs("-o pool -u wallet".into())));
        assert_eq!(cmd, "\"/opt/miners/vrsc/ccminer\" -o pool -u wallet");
    }
}
