//! Worker DTOs
//!
//! Request and response shapes for supervisor operations. Every operation
//! response carries a success flag and a human-readable message, plus
//! operation-specific data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::worker::{ConfigPayload, WorkerState};

/// One worker definition as submitted to the bulk configuration endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerDefinition {
    pub name: String,
    pub coin_name: String,
    pub tool_name: String,
    pub payload: ConfigPayload,

    /// Artifact filenames; defaults per tool when omitted
    #[serde(default)]
    pub required_files: Option<Vec<String>>,

    #[serde(default)]
    pub auto_start: bool,
}

/// Per-worker outcome of a bulk configuration replacement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigResult {
    pub name: String,
    pub success: bool,
    pub message: String,
}

/// Response to `start`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartResponse {
    pub success: bool,
    pub message: String,

    /// Present when the spawn succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

/// Response to `stop`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopResponse {
    pub success: bool,
    pub message: String,
}

/// Point-in-time snapshot of one worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub name: String,
    pub coin_name: String,
    pub tool_name: String,
    pub state: WorkerState,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,

    /// Canonical unit: MH/s
    pub hash_rate_mhs: f64,

    pub auto_start: bool,

    /// Tail of the worker's combined output (last 1000 bytes)
    pub recent_output: String,
}

/// Snapshot of every configured worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusAllResponse {
    pub success: bool,
    pub workers: Vec<StatusReport>,

    /// Advanced whenever a configuration replacement is accepted
    pub last_sync: DateTime<Utc>,
}

/// Response to a bulk kill-by-name sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillAllResponse {
    pub success: bool,
    pub message: String,
    pub killed_count: usize,
    pub target_patterns: Vec<String>,
}

/// Outcome of one auto-start sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepOutcome {
    pub attempted: usize,
    pub started: usize,
    pub failures: Vec<ConfigResult>,
}
