use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::models::{Credential, DeployReport, DeployTarget};
use crate::session::{DeviceProfile, DeviceSession, SessionFactory};
use crate::store::CredentialStore;

/// DeployEngine pushes configuration files to many devices at once, one
/// task per device, at most `workers` sessions open at a time.
pub struct DeployEngine {
    factory: Arc<dyn SessionFactory>,
    profile: DeviceProfile,
    workers: usize,
}

impl DeployEngine {
    pub fn new(factory: Arc<dyn SessionFactory>, profile: DeviceProfile, workers: usize) -> Self {
        Self {
            factory,
            profile,
            workers: workers.max(1),
        }
    }

    /// Apply each target's config file to its device.
    ///
    /// Targets whose file is missing are skipped before any connection.
    /// Every other target gets a result; per-device failures never affect
    /// sibling tasks. Once `cancel` fires, tasks still waiting for a worker
    /// are not started; tasks already talking to a device finish.
    pub async fn deploy(
        &self,
        targets: Vec<DeployTarget>,
        creds: &CredentialStore,
        cancel: &CancellationToken,
    ) -> DeployReport {
        let mut report = DeployReport::default();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut join_set = JoinSet::new();
        let mut task_hosts = HashMap::new();

        for target in targets {
            if !target.config_path.exists() {
                tracing::warn!(
                    "No config file found for {} ({}), skipping",
                    target.hostname,
                    target.config_path.display()
                );
                report.skipped.insert(
                    target.hostname.clone(),
                    PipelineError::ConfigFileMissing {
                        hostname: target.hostname.clone(),
                        path: target.config_path.clone(),
                    },
                );
                continue;
            }

            let credential = creds.require(&target.hostname);
            let factory = self.factory.clone();
            let profile = self.profile.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();

            let task_host = target.hostname.clone();
            let handle = join_set.spawn(async move {
                let hostname = target.hostname.clone();
                let permit = tokio::select! {
                    _ = cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let Some(_permit) = permit.filter(|_| !cancel.is_cancelled()) else {
                    return (hostname.clone(), Err(PipelineError::Cancelled { hostname }));
                };

                let result = match credential {
                    Ok(cred) => apply_config(factory.as_ref(), &profile, &target, &cred).await,
                    Err(e) => Err(e),
                };
                (hostname, result)
            });
            task_hosts.insert(handle.id(), task_host);
        }

        while let Some(joined) = join_set.join_next_with_id().await {
            match joined {
                Ok((_, (hostname, result))) => {
                    match &result {
                        Ok(_) => tracing::info!("{} configured", hostname),
                        Err(e) => tracing::warn!("Deployment failed: {}", e),
                    }
                    report.results.insert(hostname, result);
                }
                Err(e) => {
                    let Some(hostname) = task_hosts.remove(&e.id()) else {
                        tracing::error!("Deploy task aborted: {}", e);
                        continue;
                    };
                    tracing::error!("Deploy task for {} aborted: {}", hostname, e);
                    let error = PipelineError::session(&hostname, format!("deploy task aborted: {}", e));
                    report.results.insert(hostname, Err(error));
                }
            }
        }

        tracing::info!(
            "Deployment finished: {} succeeded, {} failed, {} skipped",
            report.succeeded(),
            report.failed(),
            report.skipped.len()
        );
        report
    }
}

/// Build one target per device from its candidate config file
pub fn candidate_targets(addresses: &[(String, String)], candidate_dir: &Path) -> Vec<DeployTarget> {
    addresses
        .iter()
        .map(|(hostname, address)| {
            DeployTarget::new(hostname, address, candidate_dir.join(format!("{}.txt", hostname)))
        })
        .collect()
}

async fn apply_config(
    factory: &dyn SessionFactory,
    profile: &DeviceProfile,
    target: &DeployTarget,
    cred: &Credential,
) -> Result<String, PipelineError> {
    let hostname = target.hostname.as_str();
    let content = tokio::fs::read_to_string(&target.config_path)
        .await
        .map_err(|_| PipelineError::ConfigFileMissing {
            hostname: hostname.to_string(),
            path: target.config_path.clone(),
        })?;
    let lines: Vec<String> = content
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect();

    let mut session = factory
        .open(&target.address, cred, profile)
        .await
        .map_err(|e| PipelineError::session(hostname, format!("{:#}", e)))?;
    tracing::info!("Logged in to {} ({})", hostname, target.address);

    let outcome = push_lines(session.as_mut(), &lines).await;
    session.close().await;

    outcome.map_err(|e| PipelineError::session(hostname, format!("{:#}", e)))
}

async fn push_lines(session: &mut dyn DeviceSession, lines: &[String]) -> anyhow::Result<String> {
    session.enable().await?;
    session.send_config(lines).await
}
