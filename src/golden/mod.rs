use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::models::DeployTarget;
use crate::session::{DeviceProfile, SessionFactory};
use crate::store::CredentialStore;
use crate::utils::is_valid_hostname;

/// Separates hostname and timestamp in snapshot file names
pub const SNAPSHOT_MARKER: &str = "_golden_config_";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
const RUNNING_CONFIG_COMMAND: &str = "show running-config";

/// GoldenSnapshotManager captures running configurations as rollback
/// points and picks the newest one per device when rolling back.
pub struct GoldenSnapshotManager {
    golden_dir: PathBuf,
    archive_dir: PathBuf,
    timezone: FixedOffset,
    factory: Arc<dyn SessionFactory>,
    profile: DeviceProfile,
}

impl GoldenSnapshotManager {
    pub fn new(
        golden_dir: PathBuf,
        archive_dir: PathBuf,
        timezone: FixedOffset,
        factory: Arc<dyn SessionFactory>,
        profile: DeviceProfile,
    ) -> Self {
        Self {
            golden_dir,
            archive_dir,
            timezone,
            factory,
            profile,
        }
    }

    /// Snapshot file name for a device at a given run timestamp
    pub fn snapshot_name(hostname: &str, timestamp: &str) -> String {
        format!("{}{}{}.txt", hostname, SNAPSHOT_MARKER, timestamp)
    }

    /// Pull the running config of every device into a fresh generation.
    /// Returns the files written and the run timestamp. Once `cancel`
    /// fires no further device is pulled.
    pub async fn snapshot_all(
        &self,
        devices: &[(String, String)],
        creds: &CredentialStore,
        cancel: &CancellationToken,
    ) -> Result<(Vec<String>, String)> {
        self.snapshot_all_at(devices, creds, cancel, Utc::now()).await
    }

    pub async fn snapshot_all_at(
        &self,
        devices: &[(String, String)],
        creds: &CredentialStore,
        cancel: &CancellationToken,
        now: DateTime<Utc>,
    ) -> Result<(Vec<String>, String)> {
        tokio::fs::create_dir_all(&self.golden_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.golden_dir.display()))?;
        tokio::fs::create_dir_all(&self.archive_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.archive_dir.display()))?;

        let archived = self.rotate().await?;
        if archived > 0 {
            tracing::info!("Archived {} previous snapshots to {}", archived, self.archive_dir.display());
        }

        let timestamp = now.with_timezone(&self.timezone).format(TIMESTAMP_FORMAT).to_string();
        let mut written = Vec::new();

        for (index, (hostname, address)) in devices.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::warn!(
                    "Golden pull interrupted, {} devices not pulled",
                    devices.len() - index
                );
                break;
            }
            if !is_valid_hostname(hostname) {
                tracing::warn!("Skipping snapshot for unsafe hostname '{}'", hostname);
                continue;
            }

            let config = match self.pull_running_config(hostname, address, creds).await {
                Ok(config) => config,
                Err(e) => {
                    tracing::error!("Golden pull failed: {}", e);
                    continue;
                }
            };

            let filename = Self::snapshot_name(hostname, &timestamp);
            let path = self.golden_dir.join(&filename);
            if let Err(e) = tokio::fs::write(&path, &config).await {
                tracing::error!("Failed to write {}: {}", path.display(), e);
                continue;
            }
            tracing::info!("Saved golden config for {} ({} bytes)", hostname, config.len());
            written.push(filename);
        }

        Ok((written, timestamp))
    }

    /// Move everything currently in the golden directory into the archive.
    /// An archive directory nested inside the golden directory stays put.
    async fn rotate(&self) -> Result<usize> {
        let archive = tokio::fs::canonicalize(&self.archive_dir).await.ok();
        let mut entries = tokio::fs::read_dir(&self.golden_dir).await?;
        let mut moved = 0;
        while let Some(entry) = entries.next_entry().await? {
            if archive.is_some() && tokio::fs::canonicalize(entry.path()).await.ok() == archive {
                continue;
            }
            let dest = self.archive_dir.join(entry.file_name());
            tokio::fs::rename(entry.path(), &dest)
                .await
                .with_context(|| format!("Failed to archive {}", entry.path().display()))?;
            moved += 1;
        }
        Ok(moved)
    }

    async fn pull_running_config(
        &self,
        hostname: &str,
        address: &str,
        creds: &CredentialStore,
    ) -> Result<String, PipelineError> {
        let cred = creds.require(hostname)?;
        let mut session = self
            .factory
            .open(address, &cred, &self.profile)
            .await
            .map_err(|e| PipelineError::session(hostname, format!("{:#}", e)))?;

        let output = match session.enable().await {
            Ok(()) => session.send_command(RUNNING_CONFIG_COMMAND).await,
            Err(e) => Err(e),
        };
        session.close().await;

        output.map_err(|e| PipelineError::session(hostname, format!("{:#}", e)))
    }

    /// Newest snapshot for a hostname by modification time
    pub fn select_rollback_target(&self, hostname: &str) -> Result<PathBuf, PipelineError> {
        let not_found = || PipelineError::NoSnapshotFound {
            hostname: hostname.to_string(),
        };
        let prefix = format!("{}{}", hostname, SNAPSHOT_MARKER);

        let entries = std::fs::read_dir(&self.golden_dir).map_err(|_| not_found())?;
        entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                if !name.starts_with(&prefix) || !name.ends_with(".txt") {
                    return None;
                }
                let mtime = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                Some((mtime, name, entry.path()))
            })
            .max_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)))
            .map(|(_, _, path)| path)
            .ok_or_else(not_found)
    }

    /// Rollback targets for every device that has a snapshot; the rest are
    /// returned as `NoSnapshotFound`.
    pub fn rollback_plan(
        &self,
        addresses: &[(String, String)],
    ) -> (Vec<DeployTarget>, BTreeMap<String, PipelineError>) {
        let mut targets = Vec::new();
        let mut missing = BTreeMap::new();
        for (hostname, address) in addresses {
            match self.select_rollback_target(hostname) {
                Ok(path) => {
                    tracing::info!("Rollback target for {}: {}", hostname, display_name(&path));
                    targets.push(DeployTarget::new(hostname, address, path));
                }
                Err(e) => {
                    tracing::warn!("No rollback file found for {}", hostname);
                    missing.insert(hostname.clone(), e);
                }
            }
        }
        (targets, missing)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
