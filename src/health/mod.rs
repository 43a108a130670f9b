//! Post-deployment health probes and the verified deployment workflow.

use regex_lite::Regex;
use serde::Serialize;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::deploy::{candidate_targets, DeployEngine};
use crate::error::PipelineError;
use crate::golden::GoldenSnapshotManager;
use crate::models::DeployReport;
use crate::session::{DeviceProfile, DeviceSession, SessionFactory};
use crate::store::CredentialStore;
use crate::utils::truncate_lines;

/// Outcome of one probe on one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub hostname: String,
    pub probe: String,
    pub passed: bool,
    pub detail: String,
}

/// Which probes to run on every device
#[derive(Debug, Clone, Default)]
pub struct ProbePlan {
    pub ping_targets: Vec<String>,
    pub bgp_neighbors: bool,
    pub route_term: Option<String>,
}

impl ProbePlan {
    pub fn is_empty(&self) -> bool {
        self.ping_targets.is_empty() && !self.bgp_neighbors && self.route_term.is_none()
    }
}

/// True when ping output shows at least one reply
pub fn ping_succeeded(output: &str) -> bool {
    let re = Regex::new(r"(\d+) (?:packets )?received").ok();
    if let Some(caps) = re.as_ref().and_then(|re| re.captures(output)) {
        return caps[1].parse::<u32>().map(|n| n > 0).unwrap_or(false);
    }
    !output.trim().is_empty() && !output.contains("100% packet loss")
}

/// Neighbor addresses from `show ip bgp summary`. The router identifier
/// line is not a neighbor and is ignored.
pub fn bgp_neighbors(output: &str) -> Vec<Ipv4Addr> {
    let Ok(re) = Regex::new(r"^\s*(\d{1,3}(?:\.\d{1,3}){3})\s") else {
        return Vec::new();
    };
    output
        .lines()
        .filter(|line| !line.to_lowercase().contains("identifier"))
        .filter_map(|line| re.captures(line))
        .filter_map(|caps| caps[1].parse().ok())
        .collect()
}

fn route_command(term: &str) -> String {
    if term.trim().is_empty() {
        "show ip route".to_string()
    } else {
        format!("show ip route | include {}", term.trim())
    }
}

/// Runs probes over device sessions, one device at a time
pub struct HealthChecker {
    factory: Arc<dyn SessionFactory>,
    profile: DeviceProfile,
}

impl HealthChecker {
    pub fn new(factory: Arc<dyn SessionFactory>, profile: DeviceProfile) -> Self {
        Self { factory, profile }
    }

    /// Probe every device. A device that cannot be reached yields one
    /// failed `session` result instead of its probes. Once `cancel` fires,
    /// devices not yet probed get a failed `cancelled` result.
    pub async fn check_all(
        &self,
        devices: &[(String, String)],
        creds: &CredentialStore,
        plan: &ProbePlan,
        cancel: &CancellationToken,
    ) -> Vec<ProbeResult> {
        let mut results = Vec::new();
        if plan.is_empty() {
            return results;
        }
        for (hostname, address) in devices {
            if cancel.is_cancelled() {
                let e = PipelineError::Cancelled {
                    hostname: hostname.clone(),
                };
                results.push(ProbeResult {
                    hostname: hostname.clone(),
                    probe: "cancelled".to_string(),
                    passed: false,
                    detail: e.to_string(),
                });
                continue;
            }
            match self.check_device(hostname, address, creds, plan).await {
                Ok(probes) => results.extend(probes),
                Err(e) => {
                    tracing::error!("Health check failed: {}", e);
                    results.push(ProbeResult {
                        hostname: hostname.clone(),
                        probe: "session".to_string(),
                        passed: false,
                        detail: e.to_string(),
                    });
                }
            }
        }
        let failed = results.iter().filter(|r| !r.passed).count();
        tracing::info!("Ran {} probes, {} failed", results.len(), failed);
        results
    }

    async fn check_device(
        &self,
        hostname: &str,
        address: &str,
        creds: &CredentialStore,
        plan: &ProbePlan,
    ) -> Result<Vec<ProbeResult>, PipelineError> {
        let cred = creds.require(hostname)?;
        let mut session = self
            .factory
            .open(address, &cred, &self.profile)
            .await
            .map_err(|e| PipelineError::session(hostname, format!("{:#}", e)))?;

        let results = run_probes(session.as_mut(), hostname, plan).await;
        session.close().await;
        results.map_err(|e| PipelineError::session(hostname, format!("{:#}", e)))
    }
}

async fn run_probes(
    session: &mut dyn DeviceSession,
    hostname: &str,
    plan: &ProbePlan,
) -> anyhow::Result<Vec<ProbeResult>> {
    session.enable().await?;
    let mut results = Vec::new();
    let result = |probe: String, passed: bool, detail: String| ProbeResult {
        hostname: hostname.to_string(),
        probe,
        passed,
        detail,
    };

    for target in &plan.ping_targets {
        let output = session.send_command(&format!("ping {}", target)).await?;
        let passed = ping_succeeded(&output);
        let detail = output
            .lines()
            .find(|l| l.contains("packet loss"))
            .map(|l| l.trim().to_string())
            .unwrap_or_else(|| truncate_lines(output.trim(), 3));
        if !passed {
            tracing::warn!("{} cannot reach {}", hostname, target);
        }
        results.push(result(format!("ping {}", target), passed, detail));
    }

    if plan.bgp_neighbors {
        let output = session.send_command("show ip bgp summary").await?;
        let neighbors = bgp_neighbors(&output);
        let detail = if neighbors.is_empty() {
            "no bgp neighbors found".to_string()
        } else {
            neighbors.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(", ")
        };
        results.push(result("bgp neighbors".to_string(), !neighbors.is_empty(), detail));
    }

    if let Some(term) = &plan.route_term {
        let output = session.send_command(&route_command(term)).await?;
        let passed = !output.trim().is_empty();
        results.push(result(
            format!("route {}", term),
            passed,
            truncate_lines(output.trim(), 10),
        ));
    }

    Ok(results)
}

/// Result of a deploy-then-verify run
#[derive(Debug)]
pub struct VerifiedRun {
    pub deploy: DeployReport,
    pub probes: Vec<ProbeResult>,
    /// Present when verification failed and every device was rolled back
    pub rollback: Option<DeployReport>,
}

impl VerifiedRun {
    pub fn passed(&self) -> bool {
        self.rollback.is_none()
    }
}

/// Deploy candidates, ping `ping_targets` from every device that took its
/// config, and roll every device back to its latest golden snapshot if
/// any deployment or probe failed.
#[allow(clippy::too_many_arguments)]
pub async fn deploy_verified(
    engine: &DeployEngine,
    checker: &HealthChecker,
    golden: &GoldenSnapshotManager,
    addresses: &[(String, String)],
    candidate_dir: &Path,
    creds: &CredentialStore,
    ping_targets: &[String],
    cancel: &CancellationToken,
) -> VerifiedRun {
    let deploy = engine
        .deploy(candidate_targets(addresses, candidate_dir), creds, cancel)
        .await;

    let deployed: Vec<(String, String)> = addresses
        .iter()
        .filter(|(h, _)| matches!(deploy.results.get(h), Some(Ok(_))))
        .cloned()
        .collect();
    let plan = ProbePlan {
        ping_targets: ping_targets.to_vec(),
        ..Default::default()
    };
    let probes = checker.check_all(&deployed, creds, &plan, cancel).await;

    let failed = deploy.failed() > 0 || probes.iter().any(|p| !p.passed);
    if !failed {
        tracing::info!("Verification passed on {} devices", deployed.len());
        return VerifiedRun {
            deploy,
            probes,
            rollback: None,
        };
    }

    let undeployed = deploy.failed_hostnames();
    if !undeployed.is_empty() {
        tracing::warn!("Deployment failed on {}", undeployed.join(", "));
    }
    tracing::warn!("Verification failed, rolling back {} devices", addresses.len());
    let (targets, missing) = golden.rollback_plan(addresses);
    let mut rollback = engine.deploy(targets, creds, cancel).await;
    rollback.skipped.extend(missing);

    VerifiedRun {
        deploy,
        probes,
        rollback: Some(rollback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Row;
    use crate::session::mock::{test_profile, Event, ScriptedFactory};
    use chrono::FixedOffset;

    const BGP_SUMMARY: &str = "BGP summary information for VRF default\n\
Router identifier 1.1.1.1, local AS number 65001\n\
Neighbor Status Codes: m - Under maintenance\n\
  Neighbor         V  AS           MsgRcvd   MsgSent  InQ OutQ  Up/Down State   PfxRcd PfxAcc\n\
  10.0.0.2         4  65002             12        14    0    0 00:05:11 Estab   3      3\n\
  1.0.0.5          4  65005              9         9    0    0 00:04:50 Estab   1      1\n";

    fn creds(hosts: &[&str]) -> CredentialStore {
        let rows: Vec<Row> = hosts
            .iter()
            .map(|h| Row {
                hostname: h.to_string(),
                username: "admin".into(),
                password: "admin".into(),
                ..Default::default()
            })
            .collect();
        CredentialStore::resolve(&rows)
    }

    fn addrs(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter().map(|(h, a)| (h.to_string(), a.to_string())).collect()
    }

    #[test]
    fn test_ping_succeeded() {
        assert!(ping_succeeded(
            "5 packets transmitted, 5 received, 0% packet loss, time 41ms"
        ));
        assert!(!ping_succeeded(
            "5 packets transmitted, 0 received, 100% packet loss, time 4047ms"
        ));
        assert!(!ping_succeeded("100% packet loss"));
        assert!(!ping_succeeded(""));
        assert!(ping_succeeded("64 bytes from 8.8.8.8: icmp_seq=1 ttl=117"));
    }

    #[test]
    fn test_bgp_neighbors_skips_router_id() {
        let neighbors = bgp_neighbors(BGP_SUMMARY);
        assert_eq!(
            neighbors,
            vec![Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(1, 0, 0, 5)]
        );
        assert!(bgp_neighbors("% BGP inactive").is_empty());
    }

    #[test]
    fn test_route_command() {
        assert_eq!(route_command("10.1.0.0"), "show ip route | include 10.1.0.0");
        assert_eq!(route_command(""), "show ip route");
    }

    #[tokio::test]
    async fn test_check_all_runs_each_probe() {
        let factory = ScriptedFactory::new()
            .with_output("10.0.0.1", "ping 8.8.8.8", "5 packets transmitted, 5 received, 0% packet loss")
            .with_output("10.0.0.1", "show ip bgp summary", BGP_SUMMARY)
            .with_output("10.0.0.1", "show ip route | include 10.9", "O 10.9.0.0/24 via 10.0.0.2")
            .refusing("10.0.0.2");
        let checker = HealthChecker::new(Arc::new(factory.clone()), test_profile());
        let plan = ProbePlan {
            ping_targets: vec!["8.8.8.8".into()],
            bgp_neighbors: true,
            route_term: Some("10.9".into()),
        };

        let results = checker
            .check_all(
                &addrs(&[("R1", "10.0.0.1"), ("R2", "10.0.0.2")]),
                &creds(&["R1", "R2"]),
                &plan,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(results.len(), 4);
        assert!(results[..3].iter().all(|r| r.passed && r.hostname == "R1"));
        assert_eq!(results[0].detail, "5 packets transmitted, 5 received, 0% packet loss");
        assert_eq!(results[1].detail, "10.0.0.2, 1.0.0.5");
        assert_eq!(results[3].probe, "session");
        assert!(!results[3].passed);
        assert_eq!(factory.count(|e| matches!(e, Event::Closed(_))), 1);
    }

    #[tokio::test]
    async fn test_check_all_after_cancel_opens_nothing() {
        let factory = ScriptedFactory::new();
        let checker = HealthChecker::new(Arc::new(factory.clone()), test_profile());
        let plan = ProbePlan {
            bgp_neighbors: true,
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let results = checker
            .check_all(&addrs(&[("R1", "10.0.0.1")]), &creds(&["R1"]), &plan, &cancel)
            .await;

        assert!(factory.opened_addresses().is_empty());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].probe, "cancelled");
        assert!(!results[0].passed);
    }

    fn golden(dir: &Path, factory: &ScriptedFactory) -> GoldenSnapshotManager {
        GoldenSnapshotManager::new(
            dir.join("golden"),
            dir.join("archive"),
            FixedOffset::east_opt(0).unwrap(),
            Arc::new(factory.clone()),
            test_profile(),
        )
    }

    fn setup(dir: &Path) {
        let candidates = dir.join("candidates");
        std::fs::create_dir_all(&candidates).unwrap();
        std::fs::create_dir_all(dir.join("golden")).unwrap();
        for host in ["R1", "R2"] {
            std::fs::write(candidates.join(format!("{}.txt", host)), "hostname new\n").unwrap();
            std::fs::write(
                dir.join("golden").join(format!("{}_golden_config_t.txt", host)),
                "hostname golden\n",
            )
            .unwrap();
        }
    }

    #[tokio::test]
    async fn test_deploy_verified_passes_without_rollback() {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path());
        let factory = ScriptedFactory::new()
            .with_output("10.0.0.1", "ping 8.8.8.8", "5 received")
            .with_output("10.0.0.2", "ping 8.8.8.8", "5 received");
        let shared: Arc<dyn SessionFactory> = Arc::new(factory.clone());

        let run = deploy_verified(
            &DeployEngine::new(shared.clone(), test_profile(), 2),
            &HealthChecker::new(shared, test_profile()),
            &golden(dir.path(), &factory),
            &addrs(&[("R1", "10.0.0.1"), ("R2", "10.0.0.2")]),
            &dir.path().join("candidates"),
            &creds(&["R1", "R2"]),
            &["8.8.8.8".to_string()],
            &CancellationToken::new(),
        )
        .await;

        assert!(run.passed());
        assert_eq!(run.deploy.succeeded(), 2);
        assert_eq!(run.probes.len(), 2);
    }

    #[tokio::test]
    async fn test_deploy_verified_rolls_back_every_device_on_failed_probe() {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path());
        let factory = ScriptedFactory::new()
            .with_output("10.0.0.1", "ping 8.8.8.8", "5 received")
            .with_output("10.0.0.2", "ping 8.8.8.8", "0 received, 100% packet loss");
        let shared: Arc<dyn SessionFactory> = Arc::new(factory.clone());

        let run = deploy_verified(
            &DeployEngine::new(shared.clone(), test_profile(), 2),
            &HealthChecker::new(shared, test_profile()),
            &golden(dir.path(), &factory),
            &addrs(&[("R1", "10.0.0.1"), ("R2", "10.0.0.2")]),
            &dir.path().join("candidates"),
            &creds(&["R1", "R2"]),
            &["8.8.8.8".to_string()],
            &CancellationToken::new(),
        )
        .await;

        assert!(!run.passed());
        let rollback = run.rollback.unwrap();
        assert_eq!(rollback.succeeded(), 2);

        let golden_pushes = factory.count(|e| {
            matches!(e, Event::Config { lines, .. } if lines == &vec!["hostname golden".to_string()])
        });
        assert_eq!(golden_pushes, 2);
    }
}
