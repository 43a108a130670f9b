//! Playbook files for the external runner and the runner invocation itself.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::config::Config;
use crate::inventory::write_file;
use crate::models::DeviceClass;
use crate::utils::truncate_lines;

#[derive(Serialize)]
struct Play {
    name: String,
    hosts: &'static str,
    connection: &'static str,
    gather_facts: bool,
    roles: Vec<RoleRef>,
}

#[derive(Serialize)]
struct RoleRef {
    role: &'static str,
}

#[derive(Serialize)]
struct LoadVarsTask {
    name: &'static str,
    include_vars: IncludeVars,
}

#[derive(Serialize)]
struct IncludeVars {
    file: String,
}

#[derive(Serialize)]
struct TemplateTask {
    name: &'static str,
    template: TemplateArgs,
    #[serde(rename = "loop")]
    loop_over: &'static str,
    when: &'static str,
}

#[derive(Serialize)]
struct TemplateArgs {
    src: String,
    dest: String,
}

fn play_name(class: DeviceClass) -> &'static str {
    match class {
        DeviceClass::Router => "Configure Routers",
        DeviceClass::EdgeRouter => "Configure Edge Routers",
        DeviceClass::Switch => "Configure Switches",
    }
}

/// `site.yml`: one local play per device class applying its role
pub fn site_yml() -> Result<String> {
    let plays: Vec<Play> = DeviceClass::ALL
        .into_iter()
        .map(|class| Play {
            name: play_name(class).to_string(),
            hosts: class.as_str(),
            connection: "local",
            gather_facts: false,
            roles: vec![RoleRef { role: class.as_str() }],
        })
        .collect();
    Ok(serde_yaml::to_string(&plays)?)
}

/// `roles/<class>/tasks/main.yml`: load the class vars, then render the
/// class template once per device into the candidate directory
pub fn role_tasks_yml(class: DeviceClass, cfg: &Config) -> Result<String> {
    let tasks = (
        LoadVarsTask {
            name: "Load Variables",
            include_vars: IncludeVars {
                file: cfg.role_vars_path(class.as_str()).display().to_string(),
            },
        },
        TemplateTask {
            name: "Generate configuration files",
            template: TemplateArgs {
                src: format!("{}.j2", class),
                dest: format!("{}/{{{{item.hostname}}}}.txt", cfg.candidate_dir.display()),
            },
            loop_over: "{{ devices | default([]) }}",
            when: "devices is defined",
        },
    );
    Ok(serde_yaml::to_string(&tasks)?)
}

/// Write `site.yml` and every role task file
pub async fn write_playbook(cfg: &Config) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    let site = cfg.site_yml_path();
    write_file(&site, &site_yml()?).await?;
    tracing::info!("Created {}", site.display());
    written.push(site);

    for class in DeviceClass::ALL {
        let path = cfg.role_tasks_path(class.as_str());
        write_file(&path, &role_tasks_yml(class, cfg)?).await?;
        tracing::info!("Created {} tasks in {}", class, path.display());
        written.push(path);
    }
    Ok(written)
}

/// Invokes `ansible-playbook -i <inventory> <site.yml>`
pub struct PlaybookRunner {
    bin: String,
    inventory: PathBuf,
    site: PathBuf,
}

impl PlaybookRunner {
    pub fn new(bin: impl Into<String>, inventory: &Path, site: &Path) -> Self {
        Self {
            bin: bin.into(),
            inventory: inventory.to_path_buf(),
            site: site.to_path_buf(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(&cfg.ansible_playbook_bin, &cfg.inventory_path, &cfg.site_yml_path())
    }

    /// Run the playbook to completion. Only exit status 0 counts as success.
    pub async fn run(&self) -> Result<()> {
        tracing::info!("Running {}", self.bin);
        let output = Command::new(&self.bin)
            .arg("-i")
            .arg(&self.inventory)
            .arg(&self.site)
            .output()
            .await
            .with_context(|| format!("Failed to start {}", self.bin))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            tracing::info!("{}", truncate_lines(stdout.trim_end(), 40));
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "{} exited with {}: {}",
                self.bin,
                output.status,
                truncate_lines(stderr.trim(), 10)
            );
        }
        tracing::info!("Playbook completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_yml_has_one_play_per_class() {
        let parsed: serde_yaml::Value = serde_yaml::from_str(&site_yml().unwrap()).unwrap();
        let plays = parsed.as_sequence().unwrap();
        assert_eq!(plays.len(), 3);
        assert_eq!(plays[1]["name"], "Configure Edge Routers");
        assert_eq!(plays[1]["hosts"], "edge_router");
        assert_eq!(plays[1]["connection"], "local");
        assert_eq!(plays[1]["gather_facts"], false);
        assert_eq!(plays[1]["roles"][0]["role"], "edge_router");
    }

    #[test]
    fn test_role_tasks_point_at_vars_and_candidates() {
        let cfg = Config::for_dir(Path::new("/srv/ansible"));
        let text = role_tasks_yml(DeviceClass::Switch, &cfg).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&text).unwrap();

        assert_eq!(
            parsed[0]["include_vars"]["file"],
            "/srv/ansible/roles/switch/vars/switch.yml"
        );
        assert_eq!(parsed[1]["template"]["src"], "switch.j2");
        assert_eq!(
            parsed[1]["template"]["dest"],
            "/srv/ansible/candidate_configs/{{item.hostname}}.txt"
        );
        assert_eq!(parsed[1]["loop"], "{{ devices | default([]) }}");
        assert_eq!(parsed[1]["when"], "devices is defined");
    }

    #[tokio::test]
    async fn test_write_playbook_creates_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::for_dir(dir.path());
        let written = write_playbook(&cfg).await.unwrap();
        assert_eq!(written.len(), 4);
        assert!(cfg.site_yml_path().exists());
        assert!(cfg.role_tasks_path("edge_router").exists());
    }

    #[tokio::test]
    async fn test_runner_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let inv = dir.path().join("inventory.yml");
        let site = dir.path().join("site.yml");

        assert!(PlaybookRunner::new("true", &inv, &site).run().await.is_ok());
        assert!(PlaybookRunner::new("false", &inv, &site).run().await.is_err());
        assert!(PlaybookRunner::new("/nonexistent/ansible-playbook", &inv, &site)
            .run()
            .await
            .is_err());
    }
}
