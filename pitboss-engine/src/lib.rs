//! Pitboss Engine
//!
//! The process supervision engine behind the pitboss daemon.
//!
//! Architecture:
//! - Registry: shared worker records with per-worker transition ownership
//! - Supervisor: start/stop/status orchestration and the auto-start sweep
//! - Monitor: per-worker output drain, telemetry extraction, exit detection
//! - Termination: escalating-signal stop of a worker's process tree
//! - Reaper: registry-independent kill-by-name for crash recovery
//! - Telemetry/Tools: pattern tables turning console noise into rates
//!
//! The engine never blocks its callers on worker I/O: every started worker
//! owns one monitor task, and all bounded waits happen inside the task
//! running the operation.

pub mod error;
pub mod monitor;
pub mod process;
pub mod reaper;
pub mod registry;
pub mod supervisor;
pub mod telemetry;
pub mod termination;
pub mod tools;

pub use error::{EngineError, Result};
pub use registry::WorkerRegistry;
pub use supervisor::{Supervisor, SupervisorService};
pub use termination::{StageTimeouts, TerminationOutcome, TerminationProtocol};
