//! Process table access
//!
//! Thin seam over the OS process table used by the termination protocol and
//! the bulk reaper: tree discovery, signal delivery, survivor checks, and
//! name-pattern scans. Real access goes through sysinfo; tests inject a
//! fake backend so escalation logic runs without spawning anything.

use std::collections::HashSet;

use sysinfo::{Pid, Signal, System};

/// Severity-ordered signals used by the escalation stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// Polite Ctrl+C equivalent; confirmation prompts answer to this
    Interrupt,

    /// Standard termination request
    Terminate,

    /// Unconditional kill
    Kill,
}

/// Process-table operations the escalation stages need.
pub trait ProcessControl: Send + Sync {
    /// The process plus all of its descendants, discovered by walking the
    /// full process table's parent-pid links. Empty when the root is gone.
    fn process_tree(&self, root: u32) -> Vec<u32>;

    /// Sends a signal; `false` when the process is already gone or the
    /// platform cannot deliver this signal.
    fn signal(&self, pid: u32, signal: StopSignal) -> bool;

    /// The subset of `pids` still present in the process table.
    fn survivors(&self, pids: &[u32]) -> Vec<u32>;

    /// Pids whose executable name matches any pattern
    /// (case-insensitive substring or exact).
    fn matching(&self, patterns: &[String]) -> Vec<u32>;

    /// Last-resort kill through an OS command invocation rather than a
    /// process handle.
    fn kill_by_command(&self, pid: u32) -> std::io::Result<bool>;
}

/// `ProcessControl` backed by the live process table.
#[derive(Debug, Default)]
pub struct SystemProcesses;

impl SystemProcesses {
    fn refreshed() -> System {
        let mut sys = System::new();
        sys.refresh_processes();
        sys
    }
}

impl ProcessControl for SystemProcesses {
    fn process_tree(&self, root: u32) -> Vec<u32> {
        let sys = Self::refreshed();
        let root_pid = Pid::from_u32(root);
        if sys.process(root_pid).is_none() {
            return Vec::new();
        }

        // Transitive closure over parent-pid links; one pass per depth
        // level bounded by the table size.
        let mut tree: HashSet<Pid> = HashSet::from([root_pid]);
        loop {
            let mut grew = false;
            for (pid, proc) in sys.processes() {
                if tree.contains(pid) {
                    continue;
                }
                if let Some(parent) = proc.parent() {
                    if tree.contains(&parent) {
                        tree.insert(*pid);
                        grew = true;
                    }
                }
            }
            if !grew {
                break;
            }
        }

        let mut pids: Vec<u32> = tree.into_iter().map(|p| p.as_u32()).collect();
        pids.sort_unstable();
        pids
    }

    fn signal(&self, pid: u32, signal: StopSignal) -> bool {
        let sys = Self::refreshed();
        let Some(proc) = sys.process(Pid::from_u32(pid)) else {
            return false;
        };

        let sig = match signal {
            StopSignal::Interrupt => Signal::Interrupt,
            StopSignal::Terminate => Signal::Term,
            StopSignal::Kill => Signal::Kill,
        };

        match proc.kill_with(sig) {
            Some(delivered) => delivered,
            // Signal not supported on this platform; fall back to a plain
            // kill so escalation still makes progress.
            None => proc.kill(),
        }
    }

    fn survivors(&self, pids: &[u32]) -> Vec<u32> {
        let sys = Self::refreshed();
        pids.iter()
            .copied()
            .filter(|pid| sys.process(Pid::from_u32(*pid)).is_some())
            .collect()
    }

    fn matching(&self, patterns: &[String]) -> Vec<u32> {
        let sys = Self::refreshed();
        let mut pids: Vec<u32> = sys
            .processes()
            .iter()
            .filter(|(_, proc)| matches_patterns(proc.name(), patterns))
            .map(|(pid, _)| pid.as_u32())
            .collect();
        pids.sort_unstable();
        pids
    }

    fn kill_by_command(&self, pid: u32) -> std::io::Result<bool> {
        let status = if cfg!(windows) {
            std::process::Command::new("taskkill")
                .args(["/PID", &pid.to_string(), "/T", "/F"])
                .output()?
                .status
        } else {
            std::process::Command::new("kill")
                .args(["-9", &pid.to_string()])
                .output()?
                .status
        };
        Ok(status.success())
    }
}

/// Polls the table until every pid is gone or the timeout elapses.
/// Returns the survivors; an empty result means all exited in time.
pub async fn wait_until_gone<P: ProcessControl>(
    procs: &P,
    pids: &[u32],
    timeout: std::time::Duration,
    poll: std::time::Duration,
) -> Vec<u32> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let survivors = procs.survivors(pids);
        if survivors.is_empty() || tokio::time::Instant::now() >= deadline {
            return survivors;
        }
        tokio::time::sleep(poll).await;
    }
}

/// Whether a process name matches any pattern, case-insensitively, as a
/// substring or exact match.
pub fn matches_patterns(name: &str, patterns: &[String]) -> bool {
    let name = name.to_lowercase();
    patterns.iter().any(|pattern| {
        let pattern = pattern.to_lowercase();
        !pattern.is_empty() && (name == pattern || name.contains(&pattern))
    })
}

/// Whether a single pid is still present in the process table.
pub fn pid_alive(pid: u32) -> bool {
    let mut sys = System::new();
    sys.refresh_processes();
    sys.process(Pid::from_u32(pid)).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matching_is_case_insensitive() {
        let patterns = vec!["alpha".to_string(), "beta".to_string()];
        assert!(matches_patterns("alpha", &patterns));
        assert!(matches_patterns("ALPHA", &patterns));
        assert!(matches_patterns("alpha.exe", &patterns));
        assert!(matches_patterns("my-beta-fork", &patterns));
        assert!(!matches_patterns("gamma", &patterns));
        assert!(!matches_patterns("alph", &patterns));
    }

    #[test]
    fn test_empty_pattern_never_matches() {
        assert!(!matches_patterns("anything", &[String::new()]));
        assert!(!matches_patterns("anything", &[]));
    }

    #[cfg(unix)]
    #[test]
    fn test_current_process_is_alive() {
        assert!(pid_alive(std::process::id()));
        // A pid far beyond normal pid_max
        assert!(!pid_alive(u32::MAX - 1));
    }
}
