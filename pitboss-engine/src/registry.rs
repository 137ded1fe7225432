//! Worker registry
//!
//! Single shared home for all worker records. The registry is the only
//! mutable state the supervisor, the output monitors, and the reaper touch;
//! every access goes through a short critical section on one mutex.
//!
//! Transition ownership: the supervisor moves records between states on
//! start/stop, a worker's own output monitor updates its telemetry and
//! detects voluntary exit, and bulk operations reset everything at once.
//! Monitors carry the epoch handed out at start so a stale monitor (its
//! process already superseded by a newer start) cannot stomp the successor's
//! record.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use pitboss_core::domain::worker::{WorkerSpec, WorkerState};
use pitboss_core::dto::worker::StatusReport;

use crate::error::{EngineError, Result};

/// Byte cap on a worker's retained output tail
pub const OUTPUT_RING_CAP: usize = 5000;

/// Bytes of the tail exposed in status reports
pub const OUTPUT_TAIL_EXPOSED: usize = 1000;

/// Bounded tail buffer over a worker's combined output.
///
/// Oldest bytes are discarded first; the buffer never exceeds its cap.
#[derive(Debug, Clone)]
pub struct OutputRing {
    buf: String,
    cap: usize,
}

impl OutputRing {
    pub fn new(cap: usize) -> Self {
        Self {
            buf: String::new(),
            cap,
        }
    }

    /// Appends one line, then trims from the front to the cap.
    pub fn push_line(&mut self, line: &str) {
        self.buf.push_str(line);
        self.buf.push('\n');

        if self.buf.len() > self.cap {
            let mut cut = self.buf.len() - self.cap;
            while !self.buf.is_char_boundary(cut) {
                cut += 1;
            }
            self.buf.drain(..cut);
        }
    }

    /// Last `n` bytes of the buffer (char-boundary aligned).
    pub fn tail(&self, n: usize) -> &str {
        if self.buf.len() <= n {
            return &self.buf;
        }
        let mut cut = self.buf.len() - n;
        while !self.buf.is_char_boundary(cut) {
            cut += 1;
        }
        &self.buf[cut..]
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// One worker's full record: persisted spec plus runtime state.
#[derive(Debug)]
pub struct WorkerRecord {
    pub spec: WorkerSpec,
    pub state: WorkerState,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub hash_rate_mhs: f64,
    pub output: OutputRing,

    /// Bumped on every successful start; monitors check it before
    /// resetting the record on stream end
    pub epoch: u64,
}

impl WorkerRecord {
    fn new(spec: WorkerSpec) -> Self {
        Self {
            spec,
            state: WorkerState::Stopped,
            pid: None,
            started_at: None,
            hash_rate_mhs: 0.0,
            output: OutputRing::new(OUTPUT_RING_CAP),
            epoch: 0,
        }
    }

    fn clear_runtime(&mut self, state: WorkerState) {
        self.state = state;
        self.pid = None;
        self.started_at = None;
        self.hash_rate_mhs = 0.0;
    }

    fn report(&self) -> StatusReport {
        StatusReport {
            name: self.spec.name.clone(),
            coin_name: self.spec.coin_name.clone(),
            tool_name: self.spec.tool_name.clone(),
            state: self.state,
            pid: self.pid,
            started_at: self.started_at,
            hash_rate_mhs: self.hash_rate_mhs,
            auto_start: self.spec.auto_start,
            recent_output: self.output.tail(OUTPUT_TAIL_EXPOSED).to_string(),
        }
    }
}

/// Shared registry of all configured workers.
pub struct WorkerRegistry {
    workers: Mutex<HashMap<String, WorkerRecord>>,

    /// Per-worker control mutexes serializing start/stop for one name
    control: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,

    /// Process-wide auto-start gate
    auto_start_enabled: AtomicBool,

    /// Advanced only when a configuration replacement is accepted
    last_sync: Mutex<DateTime<Utc>>,
}

impl WorkerRegistry {
    pub fn new(specs: Vec<WorkerSpec>) -> Self {
        let workers = specs
            .into_iter()
            .map(|spec| (spec.name.clone(), WorkerRecord::new(spec)))
            .collect();

        Self {
            workers: Mutex::new(workers),
            control: Mutex::new(HashMap::new()),
            auto_start_enabled: AtomicBool::new(true),
            last_sync: Mutex::new(Utc::now()),
        }
    }

    /// Replaces the whole registry. Old runtime state is discarded and new
    /// records start Stopped; `last_sync` advances.
    pub fn replace_all(&self, specs: Vec<WorkerSpec>) {
        let mut workers = self.workers.lock().unwrap();
        *workers = specs
            .into_iter()
            .map(|spec| (spec.name.clone(), WorkerRecord::new(spec)))
            .collect();
        *self.last_sync.lock().unwrap() = Utc::now();
    }

    /// The control mutex for one worker name; start/stop take it first.
    pub fn control_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut control = self.control.lock().unwrap();
        control
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    pub fn spec_of(&self, name: &str) -> Result<WorkerSpec> {
        let workers = self.workers.lock().unwrap();
        workers
            .get(name)
            .map(|r| r.spec.clone())
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    pub fn state_of(&self, name: &str) -> Result<WorkerState> {
        let workers = self.workers.lock().unwrap();
        workers
            .get(name)
            .map(|r| r.state)
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    pub fn running_pid(&self, name: &str) -> Option<u32> {
        let workers = self.workers.lock().unwrap();
        workers
            .get(name)
            .filter(|r| r.state == WorkerState::Running)
            .and_then(|r| r.pid)
    }

    /// Transitions a worker to Running. Fails with `AlreadyRunning` if a
    /// process is already recorded; this check-and-set under the registry
    /// lock is what guarantees at most one concurrent start wins.
    ///
    /// Returns the new epoch for the worker's output monitor.
    pub fn mark_running(&self, name: &str, pid: u32, started_at: DateTime<Utc>) -> Result<u64> {
        let mut workers = self.workers.lock().unwrap();
        let record = workers
            .get_mut(name)
            .ok_or_else(|| EngineError::NotFound(name.to_string()))?;

        if record.state == WorkerState::Running {
            return Err(EngineError::AlreadyRunning(name.to_string()));
        }

        record.state = WorkerState::Running;
        record.pid = Some(pid);
        record.started_at = Some(started_at);
        record.hash_rate_mhs = 0.0;
        record.output = OutputRing::new(OUTPUT_RING_CAP);
        record.epoch += 1;
        Ok(record.epoch)
    }

    /// Resets a worker to Stopped with pid, start time, and hash rate
    /// cleared. Used by stop and by self-healing status reads.
    pub fn reset_runtime(&self, name: &str) {
        let mut workers = self.workers.lock().unwrap();
        if let Some(record) = workers.get_mut(name) {
            record.clear_runtime(WorkerState::Stopped);
        }
    }

    /// Epoch-guarded reset used by output monitors on stream end. A stale
    /// monitor whose worker was already restarted leaves the record alone.
    pub fn reset_runtime_if_epoch(&self, name: &str, epoch: u64) -> bool {
        let mut workers = self.workers.lock().unwrap();
        match workers.get_mut(name) {
            Some(record) if record.epoch == epoch => {
                record.clear_runtime(WorkerState::Stopped);
                true
            }
            _ => false,
        }
    }

    /// Marks a worker Error (monitor read failure), clearing runtime fields.
    pub fn mark_error_if_epoch(&self, name: &str, epoch: u64) {
        let mut workers = self.workers.lock().unwrap();
        if let Some(record) = workers.get_mut(name) {
            if record.epoch == epoch {
                record.clear_runtime(WorkerState::Error);
            }
        }
    }

    /// Resets every record to Stopped (bulk kill recovery).
    pub fn reset_all_runtime(&self) {
        let mut workers = self.workers.lock().unwrap();
        for record in workers.values_mut() {
            record.clear_runtime(WorkerState::Stopped);
        }
    }

    /// Appends an output line. Ignored once the record left Running: a
    /// monitor draining the last lines of a stopped worker must not dirty
    /// the reset record.
    pub fn append_output(&self, name: &str, epoch: u64, line: &str) {
        let mut workers = self.workers.lock().unwrap();
        if let Some(record) = workers.get_mut(name) {
            if record.epoch == epoch && record.state == WorkerState::Running {
                record.output.push_line(line);
            }
        }
    }

    /// Records an extracted hash rate, under the same guard as
    /// `append_output`.
    pub fn set_hash_rate(&self, name: &str, epoch: u64, rate_mhs: f64) {
        let mut workers = self.workers.lock().unwrap();
        if let Some(record) = workers.get_mut(name) {
            if record.epoch == epoch && record.state == WorkerState::Running {
                record.hash_rate_mhs = rate_mhs;
            }
        }
    }

    pub fn snapshot(&self, name: &str) -> Result<StatusReport> {
        let workers = self.workers.lock().unwrap();
        workers
            .get(name)
            .map(|r| r.report())
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    pub fn snapshot_all(&self) -> Vec<StatusReport> {
        let workers = self.workers.lock().unwrap();
        let mut reports: Vec<StatusReport> = workers.values().map(|r| r.report()).collect();
        reports.sort_by(|a, b| a.name.cmp(&b.name));
        reports
    }

    /// All configured specs, name-ordered.
    pub fn specs(&self) -> Vec<WorkerSpec> {
        let workers = self.workers.lock().unwrap();
        let mut specs: Vec<WorkerSpec> = workers.values().map(|r| r.spec.clone()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Distinct tool names across all configured workers.
    pub fn tool_names(&self) -> Vec<String> {
        let workers = self.workers.lock().unwrap();
        let mut names: Vec<String> = workers
            .values()
            .map(|r| r.spec.tool_name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Names of Stopped workers with the per-worker auto-start flag set.
    pub fn auto_start_candidates(&self) -> Vec<String> {
        let workers = self.workers.lock().unwrap();
        let mut names: Vec<String> = workers
            .values()
            .filter(|r| r.spec.auto_start && r.state == WorkerState::Stopped)
            .map(|r| r.spec.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn auto_start_enabled(&self) -> bool {
        self.auto_start_enabled.load(Ordering::Relaxed)
    }

    pub fn set_auto_start_enabled(&self, enabled: bool) {
        self.auto_start_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn last_sync(&self) -> DateTime<Utc> {
        *self.last_sync.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitboss_core::domain::worker::ConfigPayload;
    use std::path::PathBuf;

    fn spec(name: &str, tool: &str, auto_start: bool) -> WorkerSpec {
        WorkerSpec {
            name: name.to_string(),
            coin_name: "vrsc".to_string(),
            tool_name: tool.to_string(),
            install_dir: PathBuf::from("/opt/miners/vrsc"),
            config_path: PathBuf::from("/opt/miners/vrsc/config.json"),
            required_files: vec![tool.to_string()],
            payload: ConfigPayload::RawArgs(String::new()),
            auto_start,
        }
    }

    #[test]
    fn test_output_ring_never_exceeds_cap() {
        let mut ring = OutputRing::new(100);
        for i in 0..1000 {
            ring.push_line(&format!("line number {i} with some padding"));
            assert!(ring.len() <= 100);
        }
        // Tail retention: the newest line survives
        assert!(ring.tail(100).contains("999"));
    }

    #[test]
    fn test_output_ring_tail_exposes_recent_bytes() {
        let mut ring = OutputRing::new(5000);
        ring.push_line("first");
        ring.push_line("second");
        assert_eq!(ring.tail(5000), "first\nsecond\n");
        assert_eq!(ring.tail(7), "second\n");
    }

    #[test]
    fn test_mark_running_sets_pid_and_start_time_together() {
        let registry = WorkerRegistry::new(vec![spec("w1", "ccminer", false)]);
        let epoch = registry.mark_running("w1", 4242, Utc::now()).unwrap();
        assert_eq!(epoch, 1);

        let report = registry.snapshot("w1").unwrap();
        assert_eq!(report.state, WorkerState::Running);
        assert_eq!(report.pid, Some(4242));
        assert!(report.started_at.is_some());
    }

    #[test]
    fn test_second_mark_running_is_rejected() {
        let registry = WorkerRegistry::new(vec![spec("w1", "ccminer", false)]);
        registry.mark_running("w1", 100, Utc::now()).unwrap();

        let err = registry.mark_running("w1", 200, Utc::now()).unwrap_err();
        assert!(matches!(err, EngineError::AlreadyRunning(_)));

        // The first pid is unaffected
        assert_eq!(registry.running_pid("w1"), Some(100));
    }

    #[test]
    fn test_reset_clears_runtime_fields() {
        let registry = WorkerRegistry::new(vec![spec("w1", "ccminer", false)]);
        let epoch = registry.mark_running("w1", 100, Utc::now()).unwrap();
        registry.set_hash_rate("w1", epoch, 25.5);

        registry.reset_runtime("w1");
        let report = registry.snapshot("w1").unwrap();
        assert_eq!(report.state, WorkerState::Stopped);
        assert_eq!(report.pid, None);
        assert_eq!(report.started_at, None);
        assert_eq!(report.hash_rate_mhs, 0.0);
    }

    #[test]
    fn test_stale_epoch_cannot_stomp_successor() {
        let registry = WorkerRegistry::new(vec![spec("w1", "ccminer", false)]);
        let first = registry.mark_running("w1", 100, Utc::now()).unwrap();
        registry.reset_runtime("w1");
        let second = registry.mark_running("w1", 200, Utc::now()).unwrap();
        assert!(second > first);

        // The first incarnation's monitor fires after the restart
        assert!(!registry.reset_runtime_if_epoch("w1", first));
        assert_eq!(registry.running_pid("w1"), Some(200));

        // The current incarnation's monitor still works
        assert!(registry.reset_runtime_if_epoch("w1", second));
        assert_eq!(registry.running_pid("w1"), None);
    }

    #[test]
    fn test_replace_all_discards_runtime_and_advances_sync() {
        let registry = WorkerRegistry::new(vec![spec("w1", "ccminer", false)]);
        registry.mark_running("w1", 100, Utc::now()).unwrap();
        let before = registry.last_sync();

        registry.replace_all(vec![spec("w1", "xmrig", true), spec("w2", "xmrig", false)]);

        let report = registry.snapshot("w1").unwrap();
        assert_eq!(report.state, WorkerState::Stopped);
        assert_eq!(report.tool_name, "xmrig");
        assert!(registry.snapshot("w2").is_ok());
        assert!(registry.last_sync() >= before);
    }

    #[test]
    fn test_tool_names_deduped() {
        let registry = WorkerRegistry::new(vec![
            spec("w1", "ccminer", false),
            spec("w2", "ccminer", false),
            spec("w3", "xmrig", false),
        ]);
        assert_eq!(registry.tool_names(), vec!["ccminer", "xmrig"]);
    }

    #[test]
    fn test_auto_start_candidates_skip_running_workers() {
        let registry = WorkerRegistry::new(vec![
            spec("a", "ccminer", true),
            spec("b", "ccminer", true),
            spec("c", "ccminer", false),
        ]);
        registry.mark_running("b", 100, Utc::now()).unwrap();

        assert_eq!(registry.auto_start_candidates(), vec!["a"]);
    }
}
