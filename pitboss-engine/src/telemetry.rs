//! Telemetry extraction
//!
//! Stateless mapping from one line of worker console output to a hash rate
//! in the canonical unit (MH/s). ANSI escapes are stripped, then the tool's
//! ordered pattern table is tried first match wins. Magnitudes scale by
//! powers of 1000 per unit prefix.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::tools::profile_for;

static ANSI_ESCAPES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("invalid ANSI pattern"));

/// Removes ANSI escape sequences from a line of console output.
pub fn strip_ansi(line: &str) -> Cow<'_, str> {
    ANSI_ESCAPES.replace_all(line, "")
}

/// Extracts a hash rate from one output line, normalized to MH/s.
///
/// Returns `None` when no pattern for the tool matches or the matched
/// magnitude does not parse.
pub fn extract_rate_mhs(line: &str, tool: &str) -> Option<f64> {
    let clean = strip_ansi(line);

    for pattern in profile_for(tool).patterns() {
        let Some(caps) = pattern.captures(&clean) else {
            continue;
        };
        let Some(magnitude) = caps.get(1) else {
            continue;
        };
        let Ok(value) = magnitude.as_str().parse::<f64>() else {
            continue;
        };
        let unit = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        return Some(scale_to_mhs(value, unit));
    }

    None
}

/// Scales a magnitude with a unit prefix (none/k/M/G/T + "H/s") to MH/s.
fn scale_to_mhs(value: f64, unit: &str) -> f64 {
    match unit.to_lowercase().chars().next() {
        Some('k') => value / 1_000.0,
        Some('m') => value,
        Some('g') => value * 1_000.0,
        Some('t') => value * 1_000_000.0,
        // bare H/s
        _ => value / 1_000_000.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi() {
        let colored = "\x1b[32maccepted\x1b[0m: 1/1 (diff 0.01), 4.95 kH/s \x1b[1myes!\x1b[0m";
        assert_eq!(
            strip_ansi(colored),
            "accepted: 1/1 (diff 0.01), 4.95 kH/s yes!"
        );
    }

    #[test]
    fn test_kilo_unit_scales_down() {
        // Kilo-unit source: canonical output is magnitude / 1000
        let rate = extract_rate_mhs("Hashrate 1.179KH/s", "generic-kilo-tool").unwrap();
        assert!((rate - 1.179 / 1000.0).abs() < 1e-12);
    }

    #[test]
    fn test_scaling_is_linear() {
        let one = extract_rate_mhs("Hashrate 1.179KH/s", "sometool").unwrap();
        let two = extract_rate_mhs("Hashrate 2.358KH/s", "sometool").unwrap();
        assert!((two - 2.0 * one).abs() < 1e-12);
    }

    #[test]
    fn test_ccminer_accepted_line() {
        let line = "accepted: 123/124 (diff 0.01), 4.95 kH/s yes!";
        let rate = extract_rate_mhs(line, "ccminer").unwrap();
        assert!((rate - 4.95 / 1000.0).abs() < 1e-12);
    }

    #[test]
    fn test_ccminer_gpu_line() {
        let line = "GPU #0: GeForce GTX 1080, 25.50 MH/s";
        let rate = extract_rate_mhs(line, "ccminer").unwrap();
        assert!((rate - 25.50).abs() < 1e-12);
    }

    #[test]
    fn test_xmrig_speed_line() {
        let line = "speed 10s/60s/15m 1000.0 995.3 990.1 H/s";
        let rate = extract_rate_mhs(line, "xmrig").unwrap();
        // Bare H/s scales down to MH/s; the first (10s) sample wins
        assert!((rate - 1000.0 / 1_000_000.0).abs() < 1e-12);
    }

    #[test]
    fn test_unit_prefix_table() {
        assert!((extract_rate_mhs("total: 2 H/s", "x").unwrap() - 2e-6).abs() < 1e-15);
        assert!((extract_rate_mhs("total: 2 kH/s", "x").unwrap() - 2e-3).abs() < 1e-12);
        assert!((extract_rate_mhs("total: 2 MH/s", "x").unwrap() - 2.0).abs() < 1e-12);
        assert!((extract_rate_mhs("total: 2 GH/s", "x").unwrap() - 2e3).abs() < 1e-9);
        assert!((extract_rate_mhs("total: 2 TH/s", "x").unwrap() - 2e6).abs() < 1e-6);
    }

    #[test]
    fn test_no_match_yields_none() {
        assert!(extract_rate_mhs("connecting to stratum+tcp://pool:4444", "ccminer").is_none());
        assert!(extract_rate_mhs("", "xmrig").is_none());
    }
}
