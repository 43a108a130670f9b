//! Inventory and role-variable files consumed by the playbook runner,
//! plus management address resolution for deployment targets.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::compiler::DeviceGroups;
use crate::config::Config;
use crate::models::{Device, Row};
use crate::utils::check_management_ipv4;

/// Hostnames grouped by lowercased device type, in first-encounter order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    groups: Vec<(String, Vec<String>)>,
}

impl Inventory {
    pub fn groups(&self) -> &[(String, Vec<String>)] {
        &self.groups
    }

    #[cfg(test)]
    pub fn hosts(&self, class: &str) -> Option<&[String]> {
        self.groups
            .iter()
            .find(|(c, _)| c == class)
            .map(|(_, hosts)| hosts.as_slice())
    }

    /// `all: children: <class>: hosts: <hostname>: ""`
    pub fn to_yaml(&self) -> Value {
        let mut children = Mapping::new();
        for (class, hosts) in &self.groups {
            let mut host_map = Mapping::new();
            for host in hosts {
                host_map.insert(Value::from(host.as_str()), Value::from(""));
            }
            let mut group = Mapping::new();
            group.insert(Value::from("hosts"), Value::Mapping(host_map));
            children.insert(Value::from(class.as_str()), Value::Mapping(group));
        }

        let mut all = Mapping::new();
        all.insert(Value::from("children"), Value::Mapping(children));
        let mut root = Mapping::new();
        root.insert(Value::from("all"), Value::Mapping(all));
        Value::Mapping(root)
    }
}

/// Group hostnames by device type. Rows with an empty hostname are skipped;
/// repeated hostnames collapse into one entry.
pub fn build_inventory(rows: &[Row]) -> Inventory {
    let mut inventory = Inventory::default();
    for row in rows {
        let hostname = row.hostname.trim();
        if hostname.is_empty() {
            continue;
        }
        let class = row.device_type.trim().to_lowercase();

        let pos = match inventory.groups.iter().position(|(c, _)| *c == class) {
            Some(pos) => pos,
            None => {
                inventory.groups.push((class, Vec::new()));
                inventory.groups.len() - 1
            }
        };
        let hosts = &mut inventory.groups[pos].1;
        if !hosts.iter().any(|h| h == hostname) {
            hosts.push(hostname.to_string());
        }
    }
    inventory
}

pub async fn write_inventory(inventory: &Inventory, path: &Path) -> Result<()> {
    let yaml = serde_yaml::to_string(&inventory.to_yaml())?;
    write_file(path, &yaml).await?;
    tracing::info!(
        "Wrote inventory {} ({} groups)",
        path.display(),
        inventory.groups().len()
    );
    Ok(())
}

#[derive(Serialize)]
struct RoleVars<'a> {
    devices: &'a [Device],
}

/// Write one `roles/<class>/vars/<class>.yml` per non-empty class
pub async fn write_role_vars(groups: &DeviceGroups, cfg: &Config) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for (class, devices) in groups {
        if devices.is_empty() {
            continue;
        }
        let path = cfg.role_vars_path(class.as_str());
        let yaml = serde_yaml::to_string(&RoleVars { devices })
            .with_context(|| format!("Failed to encode {} vars", class))?;
        write_file(&path, &yaml).await?;
        tracing::info!("Wrote {} {} devices to {}", devices.len(), class, path.display());
        written.push(path);
    }
    Ok(written)
}

/// Management address per hostname, in first-encounter order. The last
/// non-empty address seen for a hostname wins; unusable addresses are
/// logged and ignored.
pub fn management_addresses(rows: &[Row]) -> Vec<(String, String)> {
    let mut order: Vec<String> = Vec::new();
    let mut addresses: HashMap<String, String> = HashMap::new();

    for row in rows {
        let hostname = row.hostname.trim();
        let addr = row.management_ip.trim();
        if hostname.is_empty() || addr.is_empty() {
            continue;
        }
        if let Err(problem) = check_management_ipv4(addr) {
            tracing::warn!(
                "Ignoring management address '{}' for {}: {}",
                addr,
                hostname,
                problem.describe()
            );
            continue;
        }
        if addresses.insert(hostname.to_string(), addr.to_string()).is_none() {
            order.push(hostname.to_string());
        }
    }

    tracing::debug!("Parsed {} unique devices with management addresses", order.len());
    order
        .into_iter()
        .filter_map(|h| addresses.remove(&h).map(|a| (h, a)))
        .collect()
}

pub(crate) async fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}
