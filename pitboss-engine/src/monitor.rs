//! Output monitor
//!
//! One background task per started worker. Drains the worker's stdout and
//! stderr line by line as a single logical stream, feeds each line to the
//! tail buffer and (gated per tool) to the telemetry extractor, reaps the
//! child when the stream ends, and resets the worker's record. The reset
//! is epoch-guarded so a monitor outliving its worker generation cannot
//! stomp a successor start.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::registry::WorkerRegistry;
use crate::telemetry::extract_rate_mhs;
use crate::tools::profile_for;

/// Output keywords worth echoing into the daemon log
const NOTABLE_KEYWORDS: &[&str] = &["accepted", "rejected", "error", "connected", "difficulty"];

/// Tracks the monitor task of every started worker, for diagnostics.
#[derive(Default)]
pub struct MonitorSet {
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl MonitorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the monitor for a worker; a finished predecessor entry is
    /// simply replaced.
    pub fn insert(&self, name: &str, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().unwrap();
        tasks.insert(name.to_string(), handle);
    }

    /// Names of workers whose monitor task is still running.
    pub fn active(&self) -> Vec<String> {
        let mut tasks = self.tasks.lock().unwrap();
        tasks.retain(|_, handle| !handle.is_finished());
        let mut names: Vec<String> = tasks.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Spawns the monitor task for one started worker.
///
/// The task owns the child handle; it terminates itself when the output
/// stream ends (which follows process death), needing no external
/// cancellation.
pub fn spawn_monitor(
    registry: Arc<WorkerRegistry>,
    name: String,
    tool: String,
    epoch: u64,
    mut child: Child,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // stderr drains in a sub-task; process exit closes both pipes
        let stderr_task = stderr.map(|stream| {
            let registry = Arc::clone(&registry);
            let name = name.clone();
            let tool = tool.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stream).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => handle_line(&registry, &name, &tool, epoch, &line),
                        Ok(None) => return,
                        Err(e) => {
                            warn!("stderr stream of worker '{}' failed: {}", name, e);
                            return;
                        }
                    }
                }
            })
        });

        if let Some(stream) = stdout {
            let mut lines = BufReader::new(stream).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => handle_line(&registry, &name, &tool, epoch, &line),
                    Ok(None) => break,
                    Err(e) => {
                        // The process may still be alive behind a broken
                        // pipe; flag the record instead of waiting on it.
                        warn!("output stream of worker '{}' failed: {}", name, e);
                        registry.mark_error_if_epoch(&name, epoch);
                        return;
                    }
                }
            }
        }

        // Reap; the stream only ends once the process is done with it
        match child.wait().await {
            Ok(status) => info!("worker '{}' process exited ({})", name, status),
            Err(e) => warn!("failed to reap worker '{}': {}", name, e),
        }

        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        if registry.reset_runtime_if_epoch(&name, epoch) {
            debug!("worker '{}' record reset to stopped", name);
        }
    })
}

fn handle_line(registry: &WorkerRegistry, name: &str, tool: &str, epoch: u64, line: &str) {
    let line = line.trim_end();
    if line.is_empty() {
        return;
    }

    registry.append_output(name, epoch, line);

    let profile = profile_for(tool);
    if profile.gate.admits(line) {
        if let Some(rate) = extract_rate_mhs(line, tool) {
            registry.set_hash_rate(name, epoch, rate);
            debug!("worker '{}' hash rate {:.4} MH/s", name, rate);
        }
    }

    let lower = line.to_lowercase();
    if NOTABLE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        info!("[{}] {}", name, line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pitboss_core::domain::worker::{ConfigPayload, WorkerSpec, WorkerState};
    use std::path::PathBuf;

    fn spec(name: &str, tool: &str) -> WorkerSpec {
        WorkerSpec {
            name: name.to_string(),
            coin_name: "vrsc".to_string(),
            tool_name: tool.to_string(),
            install_dir: PathBuf::from("/tmp"),
            config_path: PathBuf::from("/tmp/config.json"),
            required_files: vec![],
            payload: ConfigPayload::RawArgs(String::new()),
            auto_start: false,
        }
    }

    #[test]
    fn test_gated_line_updates_rate_only_for_admitted_lines() {
        let registry = WorkerRegistry::new(vec![spec("w1", "ccminer")]);
        let epoch = registry.mark_running("w1", 100, Utc::now()).unwrap();

        // ccminer is acceptance-gated: a GPU line alone must not update
        handle_line(
            &registry,
            "w1",
            "ccminer",
            epoch,
            "GPU #0: GeForce GTX 1080, 25.50 MH/s",
        );
        assert_eq!(registry.snapshot("w1").unwrap().hash_rate_mhs, 0.0);

        handle_line(
            &registry,
            "w1",
            "ccminer",
            epoch,
            "accepted: 1/1 (diff 0.01), 4.95 kH/s yes!",
        );
        let rate = registry.snapshot("w1").unwrap().hash_rate_mhs;
        assert!((rate - 4.95 / 1000.0).abs() < 1e-12);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_monitor_observes_voluntary_exit() {
        use std::process::Stdio;

        let registry = Arc::new(WorkerRegistry::new(vec![spec("w1", "sometool")]));

        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg("echo 'Hashrate 2.5 MH/s'")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();
        let epoch = registry.mark_running("w1", pid, Utc::now()).unwrap();

        let handle = spawn_monitor(
            Arc::clone(&registry),
            "w1".to_string(),
            "sometool".to_string(),
            epoch,
            child,
        );
        handle.await.unwrap();

        let report = registry.snapshot("w1").unwrap();
        assert_eq!(report.state, WorkerState::Stopped);
        assert_eq!(report.pid, None);
        assert_eq!(report.hash_rate_mhs, 0.0);
        assert!(report.recent_output.contains("Hashrate 2.5 MH/s"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_monitor_merges_stderr_into_the_tail() {
        use std::process::Stdio;

        let registry = Arc::new(WorkerRegistry::new(vec![spec("w1", "sometool")]));

        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg("echo out-line; echo err-line >&2")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();
        let epoch = registry.mark_running("w1", pid, Utc::now()).unwrap();

        spawn_monitor(
            Arc::clone(&registry),
            "w1".to_string(),
            "sometool".to_string(),
            epoch,
            child,
        )
        .await
        .unwrap();

        let report = registry.snapshot("w1").unwrap();
        assert!(report.recent_output.contains("out-line"));
        assert!(report.recent_output.contains("err-line"));
    }

    #[tokio::test]
    async fn test_monitor_set_tracks_active_tasks() {
        let set = MonitorSet::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        set.insert(
            "w1",
            tokio::spawn(async move {
                let _ = rx.await;
            }),
        );
        assert_eq!(set.active(), vec!["w1"]);

        tx.send(()).unwrap();
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(set.active().is_empty());
    }
}
