use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical device classes, each with its own role and template
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Router,
    EdgeRouter,
    Switch,
}

impl DeviceClass {
    pub const ALL: [DeviceClass; 3] = [Self::Router, Self::EdgeRouter, Self::Switch];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Router => "router",
            Self::EdgeRouter => "edge_router",
            Self::Switch => "switch",
        }
    }

    /// Classify a raw `device_type` column; unknown types yield None
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "router" => Some(Self::Router),
            "edge_router" => Some(Self::EdgeRouter),
            "switch" => Some(Self::Switch),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized routing attribute value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoutingValue {
    Flag(bool),
    List(Vec<String>),
    Text(String),
}

impl RoutingValue {
    /// Encode back into the tabular string form
    #[cfg(test)]
    pub fn to_cell(&self) -> String {
        match self {
            Self::Flag(true) => "TRUE".to_string(),
            Self::Flag(false) => "FALSE".to_string(),
            Self::List(items) => items.join(";"),
            Self::Text(s) => s.clone(),
        }
    }
}

/// Interface is one port of a compiled device. Only materially-set
/// attributes are present; `no_switchport` is either `Some(true)` or absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_vlan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_switchport: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encapsulation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ospf_area: Option<String>,
}

/// Device is the compiled model of one hostname
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub device_type: DeviceClass,
    pub hostname: String,
    pub username: String,
    pub password: String,
    pub vlan_list: Vec<String>,
    pub interfaces: Vec<Interface>,
    pub routing: BTreeMap<String, RoutingValue>,
}

/// Credential is the login secret pair for one hostname
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}
