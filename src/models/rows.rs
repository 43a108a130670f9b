use serde::{Deserialize, Serialize};

/// Ordered column header of the tabular store
pub const HEADERS: &[&str] = &[
    "device_type",
    "hostname",
    "username",
    "password",
    "vlan_list",
    "intf_name",
    "intf_desc",
    "intf_switchport_mode",
    "intf_access_vlan",
    "intf_no_switchport",
    "intf_encapsulation",
    "intf_ipv4",
    "intf_ipv6",
    "ospf_process",
    "intf_ospf_area",
    "bgp_asn",
    "router_id",
    "bgp_neighbors_ipv4",
    "bgp_networks_ipv4",
    "bgp_neighbors_ipv6",
    "bgp_networks_ipv6",
    "bgp_redistribute_ospf",
    "bgp_redistribute_ospfv3",
    "ospf_default_info",
    "ospf_redistribute_bgp",
    "ospf_networks",
    "static_ipv4_network",
    "static_ipv4_nexthop",
    "static_ipv6_network",
    "static_ipv6_nexthop",
    "rip_networks",
    "rip_enabled",
    "management_ip",
];

/// Row is one flat record of the tabular store: a device, or one of its
/// interfaces. Every column is kept as the raw string found in the file;
/// typing happens in the compiler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Row {
    pub device_type: String,
    pub hostname: String,
    pub username: String,
    pub password: String,
    pub vlan_list: String,
    pub intf_name: String,
    pub intf_desc: String,
    pub intf_switchport_mode: String,
    pub intf_access_vlan: String,
    pub intf_no_switchport: String,
    pub intf_encapsulation: String,
    pub intf_ipv4: String,
    pub intf_ipv6: String,
    pub ospf_process: String,
    pub intf_ospf_area: String,
    pub bgp_asn: String,
    pub router_id: String,
    pub bgp_neighbors_ipv4: String,
    pub bgp_networks_ipv4: String,
    pub bgp_neighbors_ipv6: String,
    pub bgp_networks_ipv6: String,
    pub bgp_redistribute_ospf: String,
    pub bgp_redistribute_ospfv3: String,
    pub ospf_default_info: String,
    pub ospf_redistribute_bgp: String,
    pub ospf_networks: String,
    pub static_ipv4_network: String,
    pub static_ipv4_nexthop: String,
    pub static_ipv6_network: String,
    pub static_ipv6_nexthop: String,
    pub rip_networks: String,
    pub rip_enabled: String,
    pub management_ip: String,
}

impl Row {
    #[cfg(test)]
    pub fn new(hostname: &str, intf_name: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            intf_name: intf_name.to_string(),
            ..Default::default()
        }
    }

    /// Trim the key columns so `(hostname, intf_name)` compares the same
    /// way everywhere rows are matched
    pub fn trim_keys(&mut self) {
        let hostname = self.hostname.trim();
        if hostname.len() != self.hostname.len() {
            self.hostname = hostname.to_string();
        }
        let intf_name = self.intf_name.trim();
        if intf_name.len() != self.intf_name.len() {
            self.intf_name = intf_name.to_string();
        }
    }

    /// Look up a column by its header name
    pub fn field(&self, name: &str) -> Option<&str> {
        let value = match name {
            "device_type" => &self.device_type,
            "hostname" => &self.hostname,
            "username" => &self.username,
            "password" => &self.password,
            "vlan_list" => &self.vlan_list,
            "intf_name" => &self.intf_name,
            "intf_desc" => &self.intf_desc,
            "intf_switchport_mode" => &self.intf_switchport_mode,
            "intf_access_vlan" => &self.intf_access_vlan,
            "intf_no_switchport" => &self.intf_no_switchport,
            "intf_encapsulation" => &self.intf_encapsulation,
            "intf_ipv4" => &self.intf_ipv4,
            "intf_ipv6" => &self.intf_ipv6,
            "ospf_process" => &self.ospf_process,
            "intf_ospf_area" => &self.intf_ospf_area,
            "bgp_asn" => &self.bgp_asn,
            "router_id" => &self.router_id,
            "bgp_neighbors_ipv4" => &self.bgp_neighbors_ipv4,
            "bgp_networks_ipv4" => &self.bgp_networks_ipv4,
            "bgp_neighbors_ipv6" => &self.bgp_neighbors_ipv6,
            "bgp_networks_ipv6" => &self.bgp_networks_ipv6,
            "bgp_redistribute_ospf" => &self.bgp_redistribute_ospf,
            "bgp_redistribute_ospfv3" => &self.bgp_redistribute_ospfv3,
            "ospf_default_info" => &self.ospf_default_info,
            "ospf_redistribute_bgp" => &self.ospf_redistribute_bgp,
            "ospf_networks" => &self.ospf_networks,
            "static_ipv4_network" => &self.static_ipv4_network,
            "static_ipv4_nexthop" => &self.static_ipv4_nexthop,
            "static_ipv6_network" => &self.static_ipv6_network,
            "static_ipv6_nexthop" => &self.static_ipv6_nexthop,
            "rip_networks" => &self.rip_networks,
            "rip_enabled" => &self.rip_enabled,
            "management_ip" => &self.management_ip,
            _ => return None,
        };
        Some(value.as_str())
    }

    /// Mutable access to a column by its header name
    pub fn field_mut(&mut self, name: &str) -> Option<&mut String> {
        let value = match name {
            "device_type" => &mut self.device_type,
            "hostname" => &mut self.hostname,
            "username" => &mut self.username,
            "password" => &mut self.password,
            "vlan_list" => &mut self.vlan_list,
            "intf_name" => &mut self.intf_name,
            "intf_desc" => &mut self.intf_desc,
            "intf_switchport_mode" => &mut self.intf_switchport_mode,
            "intf_access_vlan" => &mut self.intf_access_vlan,
            "intf_no_switchport" => &mut self.intf_no_switchport,
            "intf_encapsulation" => &mut self.intf_encapsulation,
            "intf_ipv4" => &mut self.intf_ipv4,
            "intf_ipv6" => &mut self.intf_ipv6,
            "ospf_process" => &mut self.ospf_process,
            "intf_ospf_area" => &mut self.intf_ospf_area,
            "bgp_asn" => &mut self.bgp_asn,
            "router_id" => &mut self.router_id,
            "bgp_neighbors_ipv4" => &mut self.bgp_neighbors_ipv4,
            "bgp_networks_ipv4" => &mut self.bgp_networks_ipv4,
            "bgp_neighbors_ipv6" => &mut self.bgp_neighbors_ipv6,
            "bgp_networks_ipv6" => &mut self.bgp_networks_ipv6,
            "bgp_redistribute_ospf" => &mut self.bgp_redistribute_ospf,
            "bgp_redistribute_ospfv3" => &mut self.bgp_redistribute_ospfv3,
            "ospf_default_info" => &mut self.ospf_default_info,
            "ospf_redistribute_bgp" => &mut self.ospf_redistribute_bgp,
            "ospf_networks" => &mut self.ospf_networks,
            "static_ipv4_network" => &mut self.static_ipv4_network,
            "static_ipv4_nexthop" => &mut self.static_ipv4_nexthop,
            "static_ipv6_network" => &mut self.static_ipv6_network,
            "static_ipv6_nexthop" => &mut self.static_ipv6_nexthop,
            "rip_networks" => &mut self.rip_networks,
            "rip_enabled" => &mut self.rip_enabled,
            "management_ip" => &mut self.management_ip,
            _ => return None,
        };
        Some(value)
    }

    /// Column values in header order, as written to the store
    pub fn record(&self) -> Vec<&str> {
        HEADERS
            .iter()
            .map(|name| self.field(name).unwrap_or_default())
            .collect()
    }
}
