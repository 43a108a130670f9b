use std::env;
use std::path::PathBuf;

use chrono::{FixedOffset, Offset, Utc};

/// Config holds all pipeline configuration for one run
#[derive(Debug, Clone)]
pub struct Config {
    pub requirements_csv: PathBuf,
    pub inventory_path: PathBuf,
    pub playbook_dir: PathBuf,
    pub candidate_dir: PathBuf,
    pub golden_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub renderer: String,
    pub ansible_playbook_bin: String,
    pub deploy_workers: usize,
    pub ssh_port: u16,
    pub ssh_timeout_secs: u64,
    pub device_profile: String,
    pub enable_secret: Option<String>,
    pub golden_utc_offset_minutes: i32,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn load() -> Self {
        let base = get_env("FORGE_BASE_DIR", "./Ansible");
        let base = PathBuf::from(base);

        Self {
            requirements_csv: get_path("REQUIREMENTS_CSV", base.join("requirements.csv")),
            inventory_path: get_path("INVENTORY_PATH", base.join("inventory.yml")),
            playbook_dir: get_path("PLAYBOOK_DIR", base.clone()),
            candidate_dir: get_path("CANDIDATE_DIR", base.join("candidate_configs")),
            golden_dir: get_path("GOLDEN_DIR", base.join("golden_configs")),
            archive_dir: get_path("ARCHIVE_DIR", base.join("archive_configs")),
            templates_dir: get_path("TEMPLATES_DIR", base.join("templates")),
            renderer: get_env("RENDERER", "ansible").to_lowercase(),
            ansible_playbook_bin: get_env("ANSIBLE_PLAYBOOK_BIN", "ansible-playbook"),
            deploy_workers: get_env("DEPLOY_WORKERS", "4").parse().unwrap_or(4).max(1),
            ssh_port: get_env("SSH_PORT", "22").parse().unwrap_or(22),
            ssh_timeout_secs: get_env("SSH_TIMEOUT_SECS", "30").parse().unwrap_or(30),
            device_profile: get_env("DEVICE_PROFILE", "arista_eos"),
            enable_secret: env::var("ENABLE_SECRET").ok().filter(|s| !s.is_empty()),
            golden_utc_offset_minutes: get_env("GOLDEN_UTC_OFFSET_MINUTES", "0")
                .parse()
                .unwrap_or(0),
        }
    }

    /// Fixed time zone used to stamp golden snapshots.
    /// Out-of-range offsets fall back to UTC.
    pub fn golden_timezone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.golden_utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }

    /// Path of the per-class role variable file consumed by the playbook
    pub fn role_vars_path(&self, class: &str) -> PathBuf {
        self.playbook_dir
            .join("roles")
            .join(class)
            .join("vars")
            .join(format!("{}.yml", class))
    }

    /// Path of the per-class role task file
    pub fn role_tasks_path(&self, class: &str) -> PathBuf {
        self.playbook_dir
            .join("roles")
            .join(class)
            .join("tasks")
            .join("main.yml")
    }

    pub fn site_yml_path(&self) -> PathBuf {
        self.playbook_dir.join("site.yml")
    }

    /// Candidate config file for a hostname
    pub fn candidate_path(&self, hostname: &str) -> PathBuf {
        self.candidate_dir.join(format!("{}.txt", hostname))
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn get_path(key: &str, default: PathBuf) -> PathBuf {
    env::var(key).map(PathBuf::from).unwrap_or(default)
}

#[cfg(test)]
impl Config {
    /// Config rooted in a scratch directory
    pub fn for_dir(dir: &std::path::Path) -> Self {
        Self {
            requirements_csv: dir.join("requirements.csv"),
            inventory_path: dir.join("inventory.yml"),
            playbook_dir: dir.to_path_buf(),
            candidate_dir: dir.join("candidate_configs"),
            golden_dir: dir.join("golden_configs"),
            archive_dir: dir.join("archive_configs"),
            templates_dir: dir.join("templates"),
            renderer: "tera".to_string(),
            ansible_playbook_bin: "ansible-playbook".to_string(),
            deploy_workers: 4,
            ssh_port: 22,
            ssh_timeout_secs: 5,
            device_profile: "arista_eos".to_string(),
            enable_secret: None,
            golden_utc_offset_minutes: 0,
        }
    }
}
