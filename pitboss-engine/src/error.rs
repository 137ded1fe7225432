//! Error types for the supervision engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by supervisor operations
///
/// Termination-side conditions (a process vanishing mid-protocol, an
/// unconfirmed survivor after the last escalation stage) are logged by the
/// protocol and never surface here: a worker whose record can be declared
/// stopped is a successful stop.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No worker with this name is configured
    #[error("worker '{0}' not found")]
    NotFound(String),

    /// The worker already has a live process
    #[error("worker '{0}' is already running")]
    AlreadyRunning(String),

    /// Stop was called on a worker that has no live process
    #[error("worker '{0}' is not running")]
    NotRunning(String),

    /// Neither the bare tool name nor its `.exe` variant exists in the
    /// install directory
    #[error("executable not found: {0}")]
    ExecutableNotFound(String),

    /// The structured config payload could not be written before launch
    #[error("failed to write config file {path}: {source}")]
    ConfigWriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The OS refused to create the process, or it exited during the
    /// post-spawn liveness check
    #[error("failed to start worker '{name}': {reason}")]
    SpawnFailed { name: String, reason: String },
}

impl EngineError {
    /// Precondition failures are caller mistakes, not faults; the API
    /// layer maps them to 4xx responses.
    pub fn is_precondition_failure(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::AlreadyRunning(_)
                | Self::NotRunning(_)
                | Self::ExecutableNotFound(_)
        )
    }

    /// Check if this error is a state conflict (start/stop called in the
    /// wrong lifecycle state)
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyRunning(_) | Self::NotRunning(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_classification() {
        assert!(EngineError::NotFound("w1".into()).is_precondition_failure());
        assert!(EngineError::AlreadyRunning("w1".into()).is_precondition_failure());
        assert!(EngineError::NotRunning("w1".into()).is_precondition_failure());
        assert!(
            !EngineError::SpawnFailed {
                name: "w1".into(),
                reason: "exited with code 1".into()
            }
            .is_precondition_failure()
        );
    }

    #[test]
    fn test_conflict_classification() {
        assert!(EngineError::AlreadyRunning("w1".into()).is_conflict());
        assert!(EngineError::NotRunning("w1".into()).is_conflict());
        assert!(!EngineError::NotFound("w1".into()).is_conflict());
    }
}
