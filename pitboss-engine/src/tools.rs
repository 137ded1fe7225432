//! Tool profile table
//!
//! Per-tool behavior lives here as data, not as branches: the ordered rate
//! pattern list, the extraction gate, how many interrupts the tool needs to
//! get through its confirmation prompt, and which escalation style its
//! termination uses. Adding a tool means adding a table entry.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

/// When the output monitor offers a line to the telemetry extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionGate {
    /// Only lines carrying a share-accepted marker; the tool prints
    /// speculative rate numbers on other lines
    AcceptedOnly,

    /// Any line containing a rate indicator keyword
    RateKeyword,
}

impl ExtractionGate {
    pub fn admits(&self, line: &str) -> bool {
        let lower = line.to_lowercase();
        match self {
            ExtractionGate::AcceptedOnly => lower.contains("accepted"),
            ExtractionGate::RateKeyword => {
                lower.contains("h/s") || lower.contains("hashrate") || lower.contains("speed")
            }
        }
    }
}

/// How the termination protocol approaches this tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationStyle {
    /// Full staged escalation: interrupt, terminate, kill
    Staged,

    /// Known to ignore polite signals; go straight to kill plus a scoped
    /// reaper sweep
    Immediate,
}

/// Behavior table entry for one tool identity.
pub struct ToolProfile {
    /// Ordered rate patterns, most specific first; capture 1 is the
    /// magnitude, capture 2 the unit
    patterns: &'static Lazy<Vec<Regex>>,

    pub gate: ExtractionGate,

    /// SIGINT attempts before waiting for voluntary exit. Tools with an
    /// interactive confirmation prompt need extra presses.
    pub interrupt_attempts: u32,

    pub escalation: EscalationStyle,

    /// Gets the reaper's extra re-scan-and-kill pass
    pub resistant: bool,
}

impl ToolProfile {
    pub fn patterns(&self) -> &[Regex] {
        self.patterns.as_slice()
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .expect("invalid rate pattern")
        })
        .collect()
}

static CCMINER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"accepted:\s*\d+/\d+\s*\(diff\s*\d+\.\d+\),\s*(\d+\.?\d*)\s*([kmgt]?H/s)\s*yes!",
        r"GPU #\d+:.*?(\d+\.?\d*)\s*([kmgt]?H/s)",
        r"total:\s*(\d+\.?\d*)\s*([kmgt]?H/s)",
        r"(\d+\.?\d*)\s*([kmgt]?H/s)",
    ])
});

static XMRIG_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"speed\s+\S+\s+(\d+\.?\d*)\s+\d+\.?\d*\s+\d+\.?\d*\s*([kmgt]?H/s)",
        r"(\d+\.?\d*)\s*([kmgt]?H/s)",
    ])
});

static GENERIC_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"hashrate[:\s]+(\d+\.?\d*)\s*([kmgt]?H/s)",
        r"speed[:\s]+(\d+\.?\d*)\s*([kmgt]?H/s)",
        r"(\d+\.?\d*)\s*([kmgt]?H/s)",
    ])
});

static CCMINER: ToolProfile = ToolProfile {
    patterns: &CCMINER_PATTERNS,
    gate: ExtractionGate::AcceptedOnly,
    // ccminer asks "really quit?" on the first Ctrl+C
    interrupt_attempts: 4,
    escalation: EscalationStyle::Staged,
    resistant: false,
};

static XMRIG: ToolProfile = ToolProfile {
    patterns: &XMRIG_PATTERNS,
    gate: ExtractionGate::RateKeyword,
    interrupt_attempts: 2,
    escalation: EscalationStyle::Staged,
    resistant: false,
};

static PHOENIXMINER: ToolProfile = ToolProfile {
    patterns: &GENERIC_PATTERNS,
    gate: ExtractionGate::RateKeyword,
    interrupt_attempts: 2,
    escalation: EscalationStyle::Immediate,
    resistant: true,
};

static GENERIC: ToolProfile = ToolProfile {
    patterns: &GENERIC_PATTERNS,
    gate: ExtractionGate::RateKeyword,
    interrupt_attempts: 2,
    escalation: EscalationStyle::Staged,
    resistant: false,
};

/// Profile for a tool identity; unknown tools get the generic profile.
pub fn profile_for(tool: &str) -> &'static ToolProfile {
    match tool.to_lowercase().as_str() {
        "ccminer" => &CCMINER,
        "xmrig" => &XMRIG,
        "phoenixminer" => &PHOENIXMINER,
        _ => &GENERIC,
    }
}

/// Default artifact file list for a tool, per platform.
pub fn default_files(tool: &str) -> Vec<String> {
    if cfg!(windows) {
        match tool.to_lowercase().as_str() {
            "ccminer" => vec!["ccminer.exe".into(), "libcrypto-1_1-x64.dll".into()],
            "xmrig" => vec!["xmrig.exe".into()],
            _ => vec![format!("{tool}.exe")],
        }
    } else {
        vec![tool.to_lowercase()]
    }
}
