//! Server configuration
//!
//! All tunables for the daemon: bind address, config file location,
//! artifact source, and the cadence of the background sweeps.

use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the admin API binds to (e.g. "0.0.0.0:5000")
    pub bind_addr: String,

    /// Path of the persisted worker configuration file
    pub config_file: PathBuf,

    /// Base URL worker artifacts are downloaded from (trailing slash)
    pub artifact_base_url: String,

    /// Directory worker install dirs are created under
    pub miners_dir: PathBuf,

    /// Cadence of the periodic status log sweep
    pub status_log_interval: Duration,

    /// Delay between daemon boot and the auto-start sweep
    pub auto_start_delay: Duration,
}

impl Config {
    /// Creates configuration from environment variables, falling back to
    /// defaults per field.
    ///
    /// Recognized variables:
    /// - PITBOSS_BIND_ADDR (default: 0.0.0.0:5000)
    /// - PITBOSS_CONFIG_FILE (default: mining_config.json)
    /// - PITBOSS_ARTIFACT_URL (default: http://localhost:8000/artifacts/)
    /// - PITBOSS_MINERS_DIR (default: miners)
    /// - PITBOSS_STATUS_LOG_INTERVAL (optional, seconds, default: 30)
    /// - PITBOSS_AUTO_START_DELAY (optional, seconds, default: 5)
    pub fn from_env() -> Self {
        let bind_addr =
            std::env::var("PITBOSS_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".to_string());

        let config_file = std::env::var("PITBOSS_CONFIG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("mining_config.json"));

        let artifact_base_url = std::env::var("PITBOSS_ARTIFACT_URL")
            .unwrap_or_else(|_| "http://localhost:8000/artifacts/".to_string());

        let miners_dir = std::env::var("PITBOSS_MINERS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("miners"));

        let status_log_interval = std::env::var("PITBOSS_STATUS_LOG_INTERVAL")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        let auto_start_delay = std::env::var("PITBOSS_AUTO_START_DELAY")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(5));

        Self {
            bind_addr,
            config_file,
            artifact_base_url,
            miners_dir,
            status_log_interval,
            auto_start_delay,
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if !self.artifact_base_url.starts_with("http://")
            && !self.artifact_base_url.starts_with("https://")
        {
            anyhow::bail!("artifact_base_url must start with http:// or https://");
        }

        if self.status_log_interval.as_secs() == 0 {
            anyhow::bail!("status_log_interval must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
            config_file: PathBuf::from("mining_config.json"),
            artifact_base_url: "http://localhost:8000/artifacts/".to_string(),
            miners_dir: PathBuf::from("miners"),
            status_log_interval: Duration::from_secs(30),
            auto_start_delay: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.status_log_interval, Duration::from_secs(30));
        assert_eq!(config.auto_start_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_validation_rejects_bad_artifact_url() {
        let mut config = Config::default();
        config.artifact_base_url = "not-a-url".to_string();
        assert!(config.validate().is_err());

        config.artifact_base_url = "https://cdn.example.com/minings/".to_string();
        assert!(config.validate().is_ok());
    }
}
