//! Worker domain types
//!
//! A worker is one externally-launched miner executable under supervision.
//! `WorkerSpec` is the persisted part (identity, placement, config payload,
//! policy); runtime state lives in the engine's registry and is never
//! written to disk.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Persisted definition of one supervised worker, keyed by a unique name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSpec {
    /// Unique worker name (registry key)
    pub name: String,

    /// Coin this worker mines (display/grouping only)
    pub coin_name: String,

    /// Executable identity, e.g. "ccminer" or "xmrig"
    pub tool_name: String,

    /// Absolute directory the executable and its artifacts live in;
    /// also the working directory at launch
    pub install_dir: PathBuf,

    /// Absolute path the structured config payload is written to
    pub config_path: PathBuf,

    /// Artifact filenames that must exist in `install_dir` before launch
    pub required_files: Vec<String>,

    /// How the worker is told its configuration
    pub payload: ConfigPayload,

    /// Whether the auto-start sweep should launch this worker
    #[serde(default)]
    pub auto_start: bool,
}

/// Configuration handed to the worker at launch.
///
/// Structured payloads are serialized to the worker's config file and the
/// executable is invoked with `-c <config_path>`. Raw payloads are split
/// into arguments and appended verbatim. The two are mutually exclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ConfigPayload {
    /// Key/value document written to `config_path` before launch
    Structured(serde_json::Value),

    /// Command-line argument string passed through as-is
    RawArgs(String),
}

/// Lifecycle state of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Not running; the initial state and the state after any stop
    Stopped,

    /// An OS process is (believed to be) alive for this worker
    Running,

    /// The output monitor hit an unrecoverable read error
    Error,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Stopped => write!(f, "stopped"),
            WorkerState::Running => write!(f, "running"),
            WorkerState::Error => write!(f, "error"),
        }
    }
}
