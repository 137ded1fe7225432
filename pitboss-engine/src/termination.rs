//! Termination protocol
//!
//! Escalating stop of one worker's process tree. Stages run strictly in
//! order, each only against the previous stage's survivors:
//! discover -> interrupt (multi-attempt) -> wait -> terminate -> kill ->
//! fallback (OS kill command, then a scoped reaper sweep).
//!
//! A process found missing at any stage counts as stopped. The protocol
//! never returns an error to callers; an unconfirmed survivor after the
//! last stage is logged as partial termination and reported in the
//! outcome.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::process::{ProcessControl, StopSignal, SystemProcesses, wait_until_gone};
use crate::reaper;
use crate::tools::{EscalationStyle, ToolProfile};

/// Named per-stage timing constants. Fixed in production; tests inject
/// short values so escalation runs in milliseconds.
#[derive(Debug, Clone)]
pub struct StageTimeouts {
    /// Pause after the first interrupt; the longest, giving confirmation
    /// prompts time to appear
    pub first_interrupt_pause: Duration,

    /// Pause after each subsequent interrupt
    pub interrupt_pause: Duration,

    /// Bounded wait for voluntary exit after the interrupt stage
    pub interrupt_wait: Duration,

    /// Bounded wait after the terminate stage
    pub terminate_wait: Duration,

    /// Bounded wait after the kill stage
    pub kill_wait: Duration,

    /// Process-table poll cadence inside each bounded wait
    pub poll_interval: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            first_interrupt_pause: Duration::from_secs(2),
            interrupt_pause: Duration::from_secs(1),
            interrupt_wait: Duration::from_secs(10),
            terminate_wait: Duration::from_secs(5),
            kill_wait: Duration::from_secs(2),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Which stage ended the process tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationOutcome {
    /// Nothing to do; the tree was gone before the first signal
    AlreadyGone,

    /// Everything exited during the interrupt stage
    Interrupted,

    /// Survivors needed a terminate request
    Terminated,

    /// Survivors needed an unconditional kill
    Killed,

    /// The name-pattern sweep finished the job after direct signaling
    /// failed
    Reaped,

    /// Every stage ran and these pids still could not be confirmed dead
    Partial { survivors: Vec<u32> },
}

impl TerminationOutcome {
    pub fn is_confirmed(&self) -> bool {
        !matches!(self, TerminationOutcome::Partial { .. })
    }

    pub fn describe(&self) -> &'static str {
        match self {
            TerminationOutcome::AlreadyGone => "process already exited",
            TerminationOutcome::Interrupted => "stopped gracefully",
            TerminationOutcome::Terminated => "stopped after terminate request",
            TerminationOutcome::Killed => "force killed",
            TerminationOutcome::Reaped => "killed via name sweep",
            TerminationOutcome::Partial { .. } => "termination incomplete",
        }
    }
}

/// Staged terminator over a pluggable process backend.
pub struct TerminationProtocol<P: ProcessControl = SystemProcesses> {
    timeouts: StageTimeouts,
    procs: P,
}

impl TerminationProtocol<SystemProcesses> {
    pub fn new() -> Self {
        Self::with_backend(StageTimeouts::default(), SystemProcesses)
    }
}

impl Default for TerminationProtocol<SystemProcesses> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ProcessControl> TerminationProtocol<P> {
    pub fn with_backend(timeouts: StageTimeouts, procs: P) -> Self {
        Self { timeouts, procs }
    }

    pub fn timeouts(&self) -> &StageTimeouts {
        &self.timeouts
    }

    pub fn backend(&self) -> &P {
        &self.procs
    }

    /// Runs the full escalation against `pid` and its descendants.
    pub async fn stop_tree(
        &self,
        pid: u32,
        tool: &str,
        profile: &ToolProfile,
    ) -> TerminationOutcome {
        let targets = self.procs.process_tree(pid);
        if targets.is_empty() {
            debug!("pid {} already gone before termination", pid);
            return TerminationOutcome::AlreadyGone;
        }

        info!(
            "stopping pid {} ({} process(es) in tree, tool {})",
            pid,
            targets.len(),
            tool
        );

        if profile.escalation == EscalationStyle::Immediate {
            return self.immediate(pid, tool, &targets).await;
        }

        // Interrupt: repeated attempts walk tools through their
        // confirmation prompts before they will exit.
        for attempt in 0..profile.interrupt_attempts {
            let alive = self.procs.survivors(&targets);
            if alive.is_empty() {
                break;
            }
            debug!(
                "interrupt attempt {}/{} against {} process(es)",
                attempt + 1,
                profile.interrupt_attempts,
                alive.len()
            );
            for target in alive {
                self.procs.signal(target, StopSignal::Interrupt);
            }
            let pause = if attempt == 0 {
                self.timeouts.first_interrupt_pause
            } else {
                self.timeouts.interrupt_pause
            };
            sleep(pause).await;
        }

        let survivors = wait_until_gone(
            &self.procs,
            &targets,
            self.timeouts.interrupt_wait,
            self.timeouts.poll_interval,
        )
        .await;
        if survivors.is_empty() {
            info!("pid {} exited after interrupt", pid);
            return TerminationOutcome::Interrupted;
        }

        warn!(
            "{} survivor(s) after interrupt stage, sending terminate",
            survivors.len()
        );
        for target in &survivors {
            self.procs.signal(*target, StopSignal::Terminate);
        }
        let survivors = wait_until_gone(
            &self.procs,
            &survivors,
            self.timeouts.terminate_wait,
            self.timeouts.poll_interval,
        )
        .await;
        if survivors.is_empty() {
            info!("pid {} exited after terminate", pid);
            return TerminationOutcome::Terminated;
        }

        warn!(
            "{} survivor(s) after terminate stage, force killing",
            survivors.len()
        );
        for target in &survivors {
            self.procs.signal(*target, StopSignal::Kill);
        }
        let survivors = wait_until_gone(
            &self.procs,
            &survivors,
            self.timeouts.kill_wait,
            self.timeouts.poll_interval,
        )
        .await;
        if survivors.is_empty() {
            info!("pid {} force killed", pid);
            return TerminationOutcome::Killed;
        }

        self.fallback(survivors, tool).await
    }

    /// Profiled signal-ignorers skip the polite stages entirely.
    async fn immediate(&self, pid: u32, tool: &str, targets: &[u32]) -> TerminationOutcome {
        info!(
            "tool {} is profiled uncooperative, killing pid {} directly",
            tool, pid
        );
        for target in targets {
            self.procs.signal(*target, StopSignal::Kill);
        }
        reaper::kill_matching(&self.procs, &[tool.to_string()], &self.timeouts).await;

        let survivors = wait_until_gone(
            &self.procs,
            targets,
            self.timeouts.kill_wait,
            self.timeouts.poll_interval,
        )
        .await;
        if survivors.is_empty() {
            TerminationOutcome::Reaped
        } else {
            error!(
                "partial termination of pid {}: survivors {:?}",
                pid, survivors
            );
            TerminationOutcome::Partial { survivors }
        }
    }

    /// Direct signaling could not confirm the tree dead: retry through an
    /// OS kill command by pid, then a name sweep scoped to this tool.
    async fn fallback(&self, survivors: Vec<u32>, tool: &str) -> TerminationOutcome {
        error!(
            "escalation exhausted with {} survivor(s), engaging fallback",
            survivors.len()
        );

        for pid in &survivors {
            match self.procs.kill_by_command(*pid) {
                Ok(true) => debug!("kill command dispatched for pid {}", pid),
                Ok(false) => warn!("kill command reported failure for pid {}", pid),
                Err(e) => warn!("kill command could not run for pid {}: {}", pid, e),
            }
        }
        let remaining = wait_until_gone(
            &self.procs,
            &survivors,
            self.timeouts.kill_wait,
            self.timeouts.poll_interval,
        )
        .await;
        if remaining.is_empty() {
            return TerminationOutcome::Killed;
        }

        reaper::kill_matching(&self.procs, &[tool.to_string()], &self.timeouts).await;
        let remaining = self.procs.survivors(&remaining);
        if remaining.is_empty() {
            TerminationOutcome::Reaped
        } else {
            error!(
                "partial termination: pids {:?} could not be confirmed dead",
                remaining
            );
            TerminationOutcome::Partial {
                survivors: remaining,
            }
        }
    }
}
