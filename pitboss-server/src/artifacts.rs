//! Artifact provisioning
//!
//! Downloads a worker's required files into its per-coin install directory
//! before the supervisor is allowed to start it. Files already on disk are
//! skipped; downloaded executables get the exec bit on Unix (shared
//! libraries excepted).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

/// Fetches worker artifacts from a remote base URL
#[derive(Debug, Clone)]
pub struct ArtifactFetcher {
    client: reqwest::Client,
    base_url: String,
    miners_dir: PathBuf,
}

impl ArtifactFetcher {
    pub fn new(base_url: impl Into<String>, miners_dir: impl Into<PathBuf>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            client: reqwest::Client::new(),
            base_url,
            miners_dir: miners_dir.into(),
        }
    }

    /// Install directory for one coin
    pub fn worker_dir(&self, coin_name: &str) -> PathBuf {
        self.miners_dir.join(coin_name)
    }

    /// Ensures every required file exists in the coin's install directory,
    /// downloading the missing ones. Returns the absolute install dir.
    pub async fn ensure_files(&self, coin_name: &str, files: &[String]) -> Result<PathBuf> {
        let dir = self.worker_dir(coin_name);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;

        for file in files {
            let target = dir.join(file);
            if target.exists() {
                debug!("{} already present, skipping download", target.display());
                mark_executable(&target, file)?;
                continue;
            }

            let url = format!("{}{}", self.base_url, file);
            info!("downloading {} from {}", file, url);

            let response = self
                .client
                .get(&url)
                .send()
                .await
                .with_context(|| format!("request for {url} failed"))?;
            if !response.status().is_success() {
                anyhow::bail!("download of {} failed with status {}", url, response.status());
            }
            let bytes = response
                .bytes()
                .await
                .with_context(|| format!("download of {url} was interrupted"))?;

            std::fs::write(&target, &bytes)
                .with_context(|| format!("failed to write {}", target.display()))?;
            mark_executable(&target, file)?;

            info!("downloaded {} ({} bytes)", target.display(), bytes.len());
        }

        let dir = std::path::absolute(&dir)
            .with_context(|| format!("failed to resolve {}", dir.display()))?;
        Ok(dir)
    }
}

/// Sets the exec bit on Unix; shared libraries keep their plain mode.
#[cfg(unix)]
fn mark_executable(path: &Path, file_name: &str) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if file_name.ends_with(".dll") || file_name.ends_with(".so") {
        return Ok(());
    }
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .with_context(|| format!("failed to mark {} executable", path.display()))?;
    Ok(())
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path, _file_name: &str) -> Result<()> {
    Ok(())
}
