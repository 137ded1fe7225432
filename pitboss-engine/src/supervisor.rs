//! Process supervisor
//!
//! Single authority for starting and stopping workers and answering status
//! queries. The external API layer talks to this service only; monitors
//! and the reaper run underneath it against the shared registry.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::process::Command;
use tokio::time::sleep;
use tracing::{error, info, warn};

use pitboss_core::domain::worker::{ConfigPayload, WorkerSpec, WorkerState};
use pitboss_core::dto::worker::{
    ConfigResult, KillAllResponse, StartResponse, StatusAllResponse, StatusReport, StopResponse,
    SweepOutcome,
};

use crate::error::{EngineError, Result};
use crate::monitor::{self, MonitorSet};
use crate::process::{self, SystemProcesses};
use crate::reaper;
use crate::registry::WorkerRegistry;
use crate::termination::{StageTimeouts, TerminationOutcome, TerminationProtocol};
use crate::tools::profile_for;

/// Delay before polling a fresh spawn for an immediate exit
const SPAWN_PROBE_DELAY: Duration = Duration::from_millis(300);

/// Spacing between sequential auto-start launches
const AUTO_START_SPACING: Duration = Duration::from_secs(2);

/// Service trait for worker supervision operations
#[async_trait]
pub trait SupervisorService: Send + Sync {
    /// Starts a configured worker and wires its output monitor
    async fn start(&self, name: &str) -> Result<StartResponse>;

    /// Stops a running worker through the termination protocol
    async fn stop(&self, name: &str) -> Result<StopResponse>;

    /// Snapshot of one worker, self-healing silently died processes
    async fn status(&self, name: &str) -> Result<StatusReport>;

    /// Snapshot of every worker
    async fn status_all(&self) -> StatusAllResponse;

    /// Starts every auto-start worker that is currently stopped
    async fn auto_start_sweep(&self) -> SweepOutcome;

    /// Bulk kill-by-name sweep; resets all records to stopped
    async fn kill_by_name(&self, patterns: Option<Vec<String>>) -> KillAllResponse;
}

/// Standard implementation over the live process table
pub struct Supervisor {
    registry: Arc<WorkerRegistry>,
    protocol: TerminationProtocol<SystemProcesses>,
    monitors: MonitorSet,
}

impl Supervisor {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self::with_stage_timeouts(registry, StageTimeouts::default())
    }

    /// Same supervisor with injected stage timing (tests use short values).
    pub fn with_stage_timeouts(registry: Arc<WorkerRegistry>, timeouts: StageTimeouts) -> Self {
        Self {
            registry,
            protocol: TerminationProtocol::with_backend(timeouts, SystemProcesses),
            monitors: MonitorSet::new(),
        }
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    /// Names of workers with a live output monitor task, for diagnostics.
    pub fn active_monitors(&self) -> Vec<String> {
        self.monitors.active()
    }

    /// Resolves the worker executable: bare tool name first, then `.exe`.
    fn resolve_executable(spec: &WorkerSpec) -> Result<PathBuf> {
        let bare = spec.install_dir.join(&spec.tool_name);
        if bare.is_file() {
            return Ok(bare);
        }
        let with_ext = spec.install_dir.join(format!("{}.exe", spec.tool_name));
        if with_ext.is_file() {
            return Ok(with_ext);
        }
        Err(EngineError::ExecutableNotFound(format!(
            "{} (also tried .exe)",
            bare.display()
        )))
    }

    /// Builds the argument vector, writing the config file first when the
    /// payload is structured.
    fn prepare_arguments(spec: &WorkerSpec) -> Result<Vec<String>> {
        match &spec.payload {
            ConfigPayload::Structured(document) => {
                let path = spec.config_path.display().to_string();
                if let Some(parent) = spec.config_path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| EngineError::ConfigWriteFailed {
                        path: path.clone(),
                        source: e,
                    })?;
                }
                let text = serde_json::to_string_pretty(document).map_err(|e| {
                    EngineError::ConfigWriteFailed {
                        path: path.clone(),
                        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
                    }
                })?;
                std::fs::write(&spec.config_path, text)
                    .map_err(|e| EngineError::ConfigWriteFailed { path, source: e })?;
                Ok(vec![
                    "-c".to_string(),
                    spec.config_path.display().to_string(),
                ])
            }
            ConfigPayload::RawArgs(args) => {
                Ok(args.split_whitespace().map(String::from).collect())
            }
        }
    }

    /// A Running record whose pid no longer resolves is healed to Stopped
    /// before it is reported.
    fn heal_if_vanished(&self, report: StatusReport) -> StatusReport {
        if report.state == WorkerState::Running {
            if let Some(pid) = report.pid {
                if !process::pid_alive(pid) {
                    warn!(
                        "worker '{}' (pid {}) vanished, healing record to stopped",
                        report.name, pid
                    );
                    self.registry.reset_runtime(&report.name);
                    return self.registry.snapshot(&report.name).unwrap_or(report);
                }
            }
        }
        report
    }
}

#[async_trait]
impl SupervisorService for Supervisor {
    async fn start(&self, name: &str) -> Result<StartResponse> {
        let lock = self.registry.control_lock(name);
        let _guard = lock.lock().await;

        let spec = self.registry.spec_of(name)?;
        if self.registry.state_of(name)? == WorkerState::Running {
            return Err(EngineError::AlreadyRunning(name.to_string()));
        }
        if !spec.install_dir.is_dir() {
            return Err(EngineError::ExecutableNotFound(format!(
                "install directory missing: {}",
                spec.install_dir.display()
            )));
        }

        let args = Self::prepare_arguments(&spec)?;
        let exe = Self::resolve_executable(&spec)?;

        info!(
            "starting worker '{}': {} {:?} (cwd {})",
            name,
            exe.display(),
            args,
            spec.install_dir.display()
        );

        let mut child = Command::new(&exe)
            .args(&args)
            .current_dir(&spec.install_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineError::SpawnFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        // Liveness probe: catch bad arguments or missing libraries before
        // a monitor is wired up.
        sleep(SPAWN_PROBE_DELAY).await;
        match child.try_wait() {
            Ok(Some(status)) => {
                return Err(EngineError::SpawnFailed {
                    name: name.to_string(),
                    reason: format!("exited immediately ({status})"),
                });
            }
            Ok(None) => {}
            Err(e) => {
                return Err(EngineError::SpawnFailed {
                    name: name.to_string(),
                    reason: format!("liveness poll failed: {e}"),
                });
            }
        }
        let pid = child.id().ok_or_else(|| EngineError::SpawnFailed {
            name: name.to_string(),
            reason: "pid unavailable after spawn".to_string(),
        })?;

        let epoch = self.registry.mark_running(name, pid, Utc::now())?;
        let handle = monitor::spawn_monitor(
            Arc::clone(&self.registry),
            name.to_string(),
            spec.tool_name.clone(),
            epoch,
            child,
        );
        self.monitors.insert(name, handle);

        info!("worker '{}' running with pid {}", name, pid);
        Ok(StartResponse {
            success: true,
            message: format!("worker '{name}' started"),
            pid: Some(pid),
        })
    }

    async fn stop(&self, name: &str) -> Result<StopResponse> {
        let lock = self.registry.control_lock(name);
        let _guard = lock.lock().await;

        let spec = self.registry.spec_of(name)?;
        let pid = self
            .registry
            .running_pid(name)
            .ok_or_else(|| EngineError::NotRunning(name.to_string()))?;

        let profile = profile_for(&spec.tool_name);
        let outcome = self.protocol.stop_tree(pid, &spec.tool_name, profile).await;

        // Whatever the stages achieved, the record is stopped now.
        self.registry.reset_runtime(name);

        match &outcome {
            TerminationOutcome::Partial { survivors } => {
                error!(
                    "worker '{}' marked stopped with unconfirmed survivors {:?}",
                    name, survivors
                );
            }
            other => info!("worker '{}' stopped: {}", name, other.describe()),
        }

        Ok(StopResponse {
            success: true,
            message: format!("worker '{}' stopped ({})", name, outcome.describe()),
        })
    }

    async fn status(&self, name: &str) -> Result<StatusReport> {
        let report = self.registry.snapshot(name)?;
        Ok(self.heal_if_vanished(report))
    }

    async fn status_all(&self) -> StatusAllResponse {
        let workers = self
            .registry
            .snapshot_all()
            .into_iter()
            .map(|r| self.heal_if_vanished(r))
            .collect();
        StatusAllResponse {
            success: true,
            workers,
            last_sync: self.registry.last_sync(),
        }
    }

    async fn auto_start_sweep(&self) -> SweepOutcome {
        if !self.registry.auto_start_enabled() {
            info!("auto-start globally disabled, skipping sweep");
            return SweepOutcome {
                attempted: 0,
                started: 0,
                failures: Vec::new(),
            };
        }

        let candidates = self.registry.auto_start_candidates();
        if candidates.is_empty() {
            info!("no workers flagged for auto-start");
            return SweepOutcome {
                attempted: 0,
                started: 0,
                failures: Vec::new(),
            };
        }

        info!("auto-starting {} worker(s): {:?}", candidates.len(), candidates);
        let mut started = 0;
        let mut failures = Vec::new();
        for (i, name) in candidates.iter().enumerate() {
            // Stagger launches so simultaneous spawns don't fight over
            // GPU/CPU bring-up.
            if i > 0 {
                sleep(AUTO_START_SPACING).await;
            }
            match self.start(name).await {
                Ok(_) => started += 1,
                Err(e) => {
                    warn!("auto-start of '{}' failed: {}", name, e);
                    failures.push(ConfigResult {
                        name: name.clone(),
                        success: false,
                        message: e.to_string(),
                    });
                }
            }
        }

        SweepOutcome {
            attempted: candidates.len(),
            started,
            failures,
        }
    }

    async fn kill_by_name(&self, patterns: Option<Vec<String>>) -> KillAllResponse {
        let patterns = reaper::resolve_patterns(patterns, self.registry.tool_names());
        let killed =
            reaper::sweep(self.protocol.backend(), &patterns, self.protocol.timeouts()).await;

        // Whatever was running is gone or doomed; records reflect that.
        self.registry.reset_all_runtime();

        KillAllResponse {
            success: true,
            message: format!("force killed {killed} process(es)"),
            killed_count: killed,
            target_patterns: patterns,
        }
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    fn fast_timeouts() -> StageTimeouts {
        StageTimeouts {
            first_interrupt_pause: Duration::from_millis(50),
            interrupt_pause: Duration::from_millis(20),
            interrupt_wait: Duration::from_millis(500),
            terminate_wait: Duration::from_millis(300),
            kill_wait: Duration::from_millis(300),
            poll_interval: Duration::from_millis(20),
        }
    }

    /// Writes a fake miner script into `dir` and returns a matching spec.
    fn fake_worker(dir: &std::path::Path, name: &str, script: &str) -> WorkerSpec {
        let tool = "fakeminer";
        let exe = dir.join(tool);
        let mut file = std::fs::File::create(&exe).unwrap();
        writeln!(file, "#!/bin/sh\n{script}").unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();

        WorkerSpec {
            name: name.to_string(),
            coin_name: "vrsc".to_string(),
            tool_name: tool.to_string(),
            install_dir: dir.to_path_buf(),
            config_path: dir.join("config.json"),
            required_files: vec![tool.to_string()],
            payload: ConfigPayload::RawArgs(String::new()),
            auto_start: false,
        }
    }

    fn supervisor_for(specs: Vec<WorkerSpec>) -> Arc<Supervisor> {
        let registry = Arc::new(WorkerRegistry::new(specs));
        Arc::new(Supervisor::with_stage_timeouts(registry, fast_timeouts()))
    }

    #[tokio::test]
    async fn test_start_then_status_reports_running() {
        let dir = tempfile::tempdir().unwrap();
        let spec = fake_worker(dir.path(), "w1", "echo started; sleep 30");
        let supervisor = supervisor_for(vec![spec]);

        let response = supervisor.start("w1").await.unwrap();
        assert!(response.success);
        let pid = response.pid.unwrap();
        assert!(pid > 0);

        let report = supervisor.status("w1").await.unwrap();
        assert_eq!(report.state, WorkerState::Running);
        assert_eq!(report.pid, Some(pid));
        assert!(report.started_at.is_some());

        supervisor.stop("w1").await.unwrap();
    }

    #[tokio::test]
    async fn test_double_start_reports_already_running() {
        let dir = tempfile::tempdir().unwrap();
        let spec = fake_worker(dir.path(), "w1", "sleep 30");
        let supervisor = supervisor_for(vec![spec]);

        let first = supervisor.start("w1").await.unwrap();
        let err = supervisor.start("w1").await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyRunning(_)));

        // First pid unaffected
        let report = supervisor.status("w1").await.unwrap();
        assert_eq!(report.pid, first.pid);

        supervisor.stop("w1").await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_starts_admit_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let spec = fake_worker(dir.path(), "w1", "sleep 30");
        let supervisor = supervisor_for(vec![spec]);

        let a = tokio::spawn({
            let s = Arc::clone(&supervisor);
            async move { s.start("w1").await }
        });
        let b = tokio::spawn({
            let s = Arc::clone(&supervisor);
            async move { s.start("w1").await }
        });

        let results = [a.await.unwrap(), b.await.unwrap()];
        let wins = results.iter().filter(|r| r.is_ok()).count();
        let losses = results
            .iter()
            .filter(|r| matches!(r, Err(EngineError::AlreadyRunning(_))))
            .count();
        assert_eq!(wins, 1);
        assert_eq!(losses, 1);

        supervisor.stop("w1").await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_resets_record_and_second_stop_fails() {
        let dir = tempfile::tempdir().unwrap();
        let spec = fake_worker(dir.path(), "w1", "sleep 30");
        let supervisor = supervisor_for(vec![spec]);

        supervisor.start("w1").await.unwrap();
        let response = supervisor.stop("w1").await.unwrap();
        assert!(response.success);

        let report = supervisor.status("w1").await.unwrap();
        assert_eq!(report.state, WorkerState::Stopped);
        assert_eq!(report.pid, None);
        assert_eq!(report.hash_rate_mhs, 0.0);

        let err = supervisor.stop("w1").await.unwrap_err();
        assert!(matches!(err, EngineError::NotRunning(_)));
    }

    #[tokio::test]
    async fn test_stop_unknown_worker_reports_not_found() {
        let supervisor = supervisor_for(vec![]);
        let err = supervisor.stop("ghost").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_start_with_structured_config_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = fake_worker(dir.path(), "w1", "sleep 30");
        spec.payload = ConfigPayload::Structured(serde_json::json!({
            "pool": "p",
            "wallet": "addr",
        }));
        let supervisor = supervisor_for(vec![spec.clone()]);

        let response = supervisor.start("w1").await.unwrap();
        assert!(response.success);
        assert!(response.pid.is_some());

        let written = std::fs::read_to_string(&spec.config_path).unwrap();
        assert!(written.contains("\"pool\""));
        assert!(written.contains("\"wallet\""));

        let report = supervisor.status("w1").await.unwrap();
        assert_eq!(report.state, WorkerState::Running);

        supervisor.stop("w1").await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_executable_is_a_precondition_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = fake_worker(dir.path(), "w1", "sleep 30");
        spec.tool_name = "nosuchtool".to_string();
        let supervisor = supervisor_for(vec![spec]);

        let err = supervisor.start("w1").await.unwrap_err();
        assert!(matches!(err, EngineError::ExecutableNotFound(_)));
        assert!(err.is_precondition_failure());
    }

    #[tokio::test]
    async fn test_immediate_exit_is_reported_as_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let spec = fake_worker(dir.path(), "w1", "exit 3");
        let supervisor = supervisor_for(vec![spec]);

        let err = supervisor.start("w1").await.unwrap_err();
        assert!(matches!(err, EngineError::SpawnFailed { .. }));

        // No monitor was wired and the record never went Running
        let report = supervisor.status("w1").await.unwrap();
        assert_eq!(report.state, WorkerState::Stopped);
        assert!(supervisor.active_monitors().is_empty());
    }

    #[tokio::test]
    async fn test_voluntary_exit_heals_through_monitor() {
        let dir = tempfile::tempdir().unwrap();
        let spec = fake_worker(dir.path(), "w1", "echo 'total: 3.1 MH/s'; sleep 1");
        let supervisor = supervisor_for(vec![spec]);

        supervisor.start("w1").await.unwrap();

        // Worker exits on its own; the monitor resets the record
        tokio::time::sleep(Duration::from_millis(1800)).await;
        let report = supervisor.status("w1").await.unwrap();
        assert_eq!(report.state, WorkerState::Stopped);
        assert_eq!(report.hash_rate_mhs, 0.0);
    }

    #[tokio::test]
    async fn test_auto_start_sweep_honors_global_gate() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = fake_worker(dir.path(), "w1", "sleep 30");
        spec.auto_start = true;
        let supervisor = supervisor_for(vec![spec]);

        supervisor.registry().set_auto_start_enabled(false);
        let outcome = supervisor.auto_start_sweep().await;
        assert_eq!(outcome.attempted, 0);

        supervisor.registry().set_auto_start_enabled(true);
        let outcome = supervisor.auto_start_sweep().await;
        assert_eq!(outcome.attempted, 1);
        assert_eq!(outcome.started, 1);

        supervisor.stop("w1").await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_records_failures_without_aborting() {
        let dir_ok = tempfile::tempdir().unwrap();
        let dir_bad = tempfile::tempdir().unwrap();

        let mut good = fake_worker(dir_ok.path(), "good", "sleep 30");
        good.auto_start = true;
        let mut bad = fake_worker(dir_bad.path(), "bad", "sleep 30");
        bad.auto_start = true;
        bad.tool_name = "missing".to_string();

        let supervisor = supervisor_for(vec![good, bad]);
        let outcome = supervisor.auto_start_sweep().await;

        assert_eq!(outcome.attempted, 2);
        assert_eq!(outcome.started, 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].name, "bad");

        supervisor.stop("good").await.unwrap();
    }
}
