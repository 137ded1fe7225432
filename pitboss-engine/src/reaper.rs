//! Bulk process reaper
//!
//! Registry-independent kill-by-name used for crash recovery: scans the
//! process table for executables matching a pattern set and runs the same
//! staged escalation as a single-worker stop against the whole union at
//! once. Tools profiled as resistant get one more scan-and-kill pass.

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::process::{ProcessControl, StopSignal, wait_until_gone};
use crate::termination::StageTimeouts;
use crate::tools::profile_for;

/// Fallback pattern set when nothing is configured at all
pub const DEFAULT_TOOL_PATTERNS: &[&str] = &["ccminer", "xmrig"];

/// Resolves the effective pattern set: explicit patterns win, then the
/// configured tool names, then the built-in defaults.
pub fn resolve_patterns(explicit: Option<Vec<String>>, configured: Vec<String>) -> Vec<String> {
    match explicit {
        Some(patterns) if !patterns.is_empty() => patterns,
        _ if !configured.is_empty() => configured,
        _ => DEFAULT_TOOL_PATTERNS
            .iter()
            .map(|s| s.to_string())
            .collect(),
    }
}

/// Staged escalation against every process matching the pattern set.
/// Returns the number of processes confirmed terminated.
pub async fn sweep<P: ProcessControl>(
    procs: &P,
    patterns: &[String],
    timeouts: &StageTimeouts,
) -> usize {
    let targets = procs.matching(patterns);
    if targets.is_empty() {
        debug!("reaper: no processes match {:?}", patterns);
        return 0;
    }
    info!(
        "reaper: {} process(es) match {:?}",
        targets.len(),
        patterns
    );

    // The most demanding profile among the targeted tools decides how many
    // interrupts the whole union gets.
    let attempts = patterns
        .iter()
        .map(|p| profile_for(p).interrupt_attempts)
        .max()
        .unwrap_or(2);

    for attempt in 0..attempts {
        let alive = procs.survivors(&targets);
        if alive.is_empty() {
            break;
        }
        for pid in alive {
            procs.signal(pid, StopSignal::Interrupt);
        }
        let pause = if attempt == 0 {
            timeouts.first_interrupt_pause
        } else {
            timeouts.interrupt_pause
        };
        sleep(pause).await;
    }

    let survivors = wait_until_gone(
        procs,
        &targets,
        timeouts.interrupt_wait,
        timeouts.poll_interval,
    )
    .await;

    let survivors = if survivors.is_empty() {
        survivors
    } else {
        for pid in &survivors {
            procs.signal(*pid, StopSignal::Terminate);
        }
        wait_until_gone(
            procs,
            &survivors,
            timeouts.terminate_wait,
            timeouts.poll_interval,
        )
        .await
    };

    let survivors = if survivors.is_empty() {
        survivors
    } else {
        for pid in &survivors {
            procs.signal(*pid, StopSignal::Kill);
        }
        wait_until_gone(procs, &survivors, timeouts.kill_wait, timeouts.poll_interval).await
    };

    let mut confirmed = targets.len() - survivors.len();
    if !survivors.is_empty() {
        warn!("reaper: {:?} survived all stages", survivors);
    }

    // Extra pass for tools that keep respawning or shrug off the first kill
    let resistant: Vec<String> = patterns
        .iter()
        .filter(|p| profile_for(p).resistant)
        .cloned()
        .collect();
    if !resistant.is_empty() {
        confirmed += kill_matching(procs, &resistant, timeouts).await;
    }

    info!("reaper: {} process(es) confirmed terminated", confirmed);
    confirmed
}

/// Direct scan-and-kill pass (no polite stages). Returns the number of
/// matched processes confirmed gone.
pub async fn kill_matching<P: ProcessControl>(
    procs: &P,
    patterns: &[String],
    timeouts: &StageTimeouts,
) -> usize {
    let targets = procs.matching(patterns);
    if targets.is_empty() {
        return 0;
    }
    info!(
        "reaper: direct kill pass against {} process(es) matching {:?}",
        targets.len(),
        patterns
    );
    for pid in &targets {
        procs.signal(*pid, StopSignal::Kill);
    }
    let survivors =
        wait_until_gone(procs, &targets, timeouts.kill_wait, timeouts.poll_interval).await;
    targets.len() - survivors.len()
}
