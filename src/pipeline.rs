//! One pipeline run: wires the store, compiler, renderers, deployment
//! engine and snapshot manager together for each CLI action.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::compiler::{compile, DeviceGroups};
use crate::config::Config;
use crate::deploy::{candidate_targets, DeployEngine};
use crate::error::PipelineError;
use crate::golden::GoldenSnapshotManager;
use crate::health::{deploy_verified, HealthChecker, ProbePlan, ProbeResult, VerifiedRun};
use crate::inventory::{build_inventory, management_addresses, write_inventory, write_role_vars};
use crate::models::{DeployReport, DeviceSummary, Row};
use crate::render::playbook::{write_playbook, PlaybookRunner};
use crate::render::{render_candidates, TeraRenderer};
use crate::session::{DeviceProfile, SessionFactory};
use crate::store::{CredentialStore, MergePolicy, TableStore};

/// Printable outcome of one action
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub action: String,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<DeviceSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub probes: Vec<ProbeResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<Vec<DeviceSummary>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

impl RunSummary {
    pub fn from_report(action: &str, report: &DeployReport) -> Self {
        Self {
            action: action.to_string(),
            succeeded: report.succeeded(),
            failed: report.failed(),
            skipped: report.skipped.len(),
            devices: report.summary(),
            ..Default::default()
        }
    }

    pub fn from_verified(action: &str, run: &VerifiedRun) -> Self {
        Self {
            probes: run.probes.clone(),
            rollback: run.rollback.as_ref().map(|r| r.summary()),
            ..Self::from_report(action, &run.deploy)
        }
    }

    /// Plain-text table for terminals
    pub fn to_table(&self) -> String {
        let mut out = format!(
            "{}: {} succeeded, {} failed, {} skipped\n",
            self.action, self.succeeded, self.failed, self.skipped
        );
        for d in &self.devices {
            out.push_str(&format!(
                "  {:<20} {:<8} {}\n",
                d.hostname,
                d.status,
                d.detail.as_deref().unwrap_or("")
            ));
        }
        for p in &self.probes {
            let status = if p.passed { "pass" } else { "FAIL" };
            out.push_str(&format!(
                "  {:<20} {:<8} {} ({})\n",
                p.hostname, status, p.probe, p.detail
            ));
        }
        if let Some(rollback) = &self.rollback {
            out.push_str("rollback:\n");
            for d in rollback {
                out.push_str(&format!(
                    "  {:<20} {:<8} {}\n",
                    d.hostname,
                    d.status,
                    d.detail.as_deref().unwrap_or("")
                ));
            }
        }
        for f in &self.files {
            out.push_str(&format!("  {}\n", f));
        }
        out
    }
}

/// Pipeline holds the configuration and collaborators for one run
pub struct Pipeline {
    cfg: Config,
    store: TableStore,
    factory: Arc<dyn SessionFactory>,
    profile: DeviceProfile,
}

impl Pipeline {
    pub fn new(cfg: Config, factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            store: TableStore::new(&cfg.requirements_csv),
            profile: DeviceProfile::from_config(&cfg),
            cfg,
            factory,
        }
    }

    fn engine(&self) -> DeployEngine {
        DeployEngine::new(self.factory.clone(), self.profile.clone(), self.cfg.deploy_workers)
    }

    fn golden(&self) -> GoldenSnapshotManager {
        GoldenSnapshotManager::new(
            self.cfg.golden_dir.clone(),
            self.cfg.archive_dir.clone(),
            self.cfg.golden_timezone(),
            self.factory.clone(),
            self.profile.clone(),
        )
    }

    fn checker(&self) -> HealthChecker {
        HealthChecker::new(self.factory.clone(), self.profile.clone())
    }

    /// Rows, credentials and management addresses of the current store
    fn load(&self) -> Result<(Vec<Row>, CredentialStore, Vec<(String, String)>)> {
        let rows = self.store.read_rows()?;
        let creds = CredentialStore::resolve(&rows);
        let addresses = management_addresses(&rows);
        tracing::info!(
            "Loaded {} rows from {}: {} devices with credentials, {} with management addresses",
            rows.len(),
            self.store.path().display(),
            creds.len(),
            addresses.len()
        );
        if creds.is_empty() && !rows.is_empty() {
            tracing::warn!("No row carries both a username and a password");
        }
        Ok((rows, creds, addresses))
    }

    /// Compile the store and write inventory, role vars and playbook files
    pub async fn build_artifacts(&self, rows: &[Row]) -> Result<DeviceGroups> {
        let groups = compile(rows);
        write_inventory(&build_inventory(rows), &self.cfg.inventory_path).await?;
        write_role_vars(&groups, &self.cfg).await?;
        write_playbook(&self.cfg).await?;
        Ok(groups)
    }

    /// Produce candidate configs with the configured renderer
    pub async fn render(&self, groups: &DeviceGroups) -> Result<()> {
        match self.cfg.renderer.as_str() {
            "tera" => {
                let renderer = TeraRenderer::load(&self.cfg.templates_dir)?;
                render_candidates(&renderer, groups, &self.cfg.candidate_dir).await?;
                Ok(())
            }
            "ansible" => PlaybookRunner::from_config(&self.cfg).run().await,
            other => Err(PipelineError::InvalidArgument(format!("unknown renderer: {}", other)).into()),
        }
    }

    /// Push every device's candidate config
    pub async fn topology_config(&self, cancel: &CancellationToken) -> Result<DeployReport> {
        let (_, creds, addresses) = self.load()?;
        if addresses.is_empty() {
            tracing::warn!("No devices found to configure");
            return Ok(DeployReport::default());
        }
        let targets = candidate_targets(&addresses, &self.cfg.candidate_dir);
        Ok(self.engine().deploy(targets, &creds, cancel).await)
    }

    /// Push every device's latest golden snapshot
    pub async fn rollback_config(&self, cancel: &CancellationToken) -> Result<DeployReport> {
        let (_, creds, addresses) = self.load()?;
        if addresses.is_empty() {
            tracing::warn!("No devices found for rollback");
            return Ok(DeployReport::default());
        }
        let (targets, missing) = self.golden().rollback_plan(&addresses);
        let mut report = self.engine().deploy(targets, &creds, cancel).await;
        report.skipped.extend(missing);
        Ok(report)
    }

    /// Capture a new golden generation; returns the files and run timestamp
    pub async fn golden_pull(&self, cancel: &CancellationToken) -> Result<(Vec<String>, String)> {
        let (_, creds, addresses) = self.load()?;
        self.golden().snapshot_all(&addresses, &creds, cancel).await
    }

    /// Merge submitted rows into the store, one edit per hostname
    pub fn merge(&self, rows_path: &Path, policy: MergePolicy) -> Result<Vec<(String, usize)>> {
        if !rows_path.exists() {
            return Err(PipelineError::InvalidArgument(format!(
                "rows file not found: {}",
                rows_path.display()
            ))
            .into());
        }
        let submitted = TableStore::new(rows_path)
            .read_rows()
            .with_context(|| format!("Failed to read submitted rows {}", rows_path.display()))?;

        let mut edits: Vec<(String, Vec<Row>)> = Vec::new();
        for row in submitted {
            let hostname = row.hostname.trim().to_string();
            if hostname.is_empty() {
                tracing::warn!("Ignoring submitted row without hostname");
                continue;
            }
            match edits.iter_mut().find(|(h, _)| *h == hostname) {
                Some((_, rows)) => rows.push(row),
                None => edits.push((hostname, vec![row])),
            }
        }

        let mut applied = Vec::new();
        for (hostname, rows) in edits {
            let total = self.store.apply_edit(rows, policy)?;
            applied.push((hostname, total));
        }
        Ok(applied)
    }

    /// Deploy, verify with pings, roll everything back on failure
    pub async fn verified_config(
        &self,
        ping_targets: &[String],
        cancel: &CancellationToken,
    ) -> Result<VerifiedRun> {
        let (_, creds, addresses) = self.load()?;
        let run = deploy_verified(
            &self.engine(),
            &self.checker(),
            &self.golden(),
            &addresses,
            &self.cfg.candidate_dir,
            &creds,
            ping_targets,
            cancel,
        )
        .await;
        Ok(run)
    }

    /// Run probes only
    pub async fn health_check(
        &self,
        plan: &ProbePlan,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProbeResult>> {
        let (_, creds, addresses) = self.load()?;
        Ok(self.checker().check_all(&addresses, &creds, plan, cancel).await)
    }

    /// compile → write artifacts → render → deploy
    pub async fn full(&self, cancel: &CancellationToken) -> Result<DeployReport> {
        let rows = self.store.read_rows()?;
        let groups = self.build_artifacts(&rows).await?;
        self.render(&groups).await?;
        self.topology_config(cancel).await
    }
}
