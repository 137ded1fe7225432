//! Configuration persistence
//!
//! The full worker set lives in one JSON file. Load is tolerant: a missing
//! file means an empty registry, and a corrupt file is logged and treated
//! as empty rather than refusing to boot. Save always rewrites the whole
//! set.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pitboss_core::domain::worker::WorkerSpec;
use tracing::{info, warn};

/// On-disk store for the worker configuration set
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted worker set.
    pub fn load(&self) -> Vec<WorkerSpec> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "no configuration file at {}, starting empty",
                    self.path.display()
                );
                return Vec::new();
            }
            Err(e) => {
                warn!(
                    "failed to read configuration file {}: {}",
                    self.path.display(),
                    e
                );
                return Vec::new();
            }
        };

        match serde_json::from_str(&text) {
            Ok(specs) => specs,
            Err(e) => {
                warn!(
                    "configuration file {} is corrupt ({}), starting empty",
                    self.path.display(),
                    e
                );
                Vec::new()
            }
        }
    }

    /// Persists the full worker set, pretty-printed.
    pub fn save(&self, specs: &[WorkerSpec]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create config directory {}", parent.display())
                })?;
            }
        }
        let text = serde_json::to_string_pretty(specs).context("failed to serialize workers")?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}
