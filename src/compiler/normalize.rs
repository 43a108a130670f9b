use crate::models::{Interface, Row, RoutingValue};

/// Routing columns copied into every device's routing map
pub const ROUTING_FIELDS: &[&str] = &[
    "rip_enabled",
    "rip_networks",
    "router_id",
    "ospf_process",
    "bgp_asn",
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
];

/// Routing columns that hold `;`-joined lists
pub const LIST_FIELDS: &[&str] = &["rip_networks", "bgp_networks_ipv4", "bgp_networks_ipv6"];

/// Normalize one scalar cell: TRUE/FALSE (any case) become flags, blank
/// becomes absent, anything else is trimmed text.
pub fn normalize_value(raw: &str) -> Option<RoutingValue> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.eq_ignore_ascii_case("TRUE") {
        return Some(RoutingValue::Flag(true));
    }
    if trimmed.eq_ignore_ascii_case("FALSE") {
        return Some(RoutingValue::Flag(false));
    }
    Some(RoutingValue::Text(trimmed.to_string()))
}

/// Split a `;`-joined cell, dropping empty segments
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split the comma-joined VLAN column
pub fn split_vlans(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Normalize a routing field by name, applying list splitting where the
/// column holds a list. Absent values yield None.
pub fn normalize_routing_field(name: &str, raw: &str) -> Option<RoutingValue> {
    if LIST_FIELDS.contains(&name) {
        let items = split_list(raw);
        return (!items.is_empty()).then_some(RoutingValue::List(items));
    }
    normalize_value(raw)
}

/// Keep a cell only when it carries a material value
fn present(raw: &str) -> Option<String> {
    if raw.is_empty() || raw == "FALSE" {
        None
    } else {
        Some(raw.to_string())
    }
}

/// Build the sparse interface for a row that names one
pub fn interface_from_row(row: &Row) -> Option<Interface> {
    let name = present(&row.intf_name)?;
    Some(Interface {
        name,
        description: present(&row.intf_desc),
        mode: present(&row.intf_switchport_mode),
        access_vlan: present(&row.intf_access_vlan),
        no_switchport: (row.intf_no_switchport == "TRUE").then_some(true),
        encapsulation: present(&row.intf_encapsulation),
        ipv4: present(&row.intf_ipv4),
        ipv6: present(&row.intf_ipv6),
        ospf_area: present(&row.intf_ospf_area),
    })
}
