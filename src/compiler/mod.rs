//! Folds the flat row set into one `Device` per hostname, grouped by
//! device class, ready for template rendering.

pub mod normalize;

use std::collections::{BTreeMap, HashMap};

use crate::models::{Device, DeviceClass, Row};
use normalize::{interface_from_row, normalize_routing_field, split_vlans, ROUTING_FIELDS};

/// Compiled devices per class, each list in first-encounter order
pub type DeviceGroups = BTreeMap<DeviceClass, Vec<Device>>;

/// Compile rows into per-class device lists.
///
/// Device-level fields come from the first row seen for a hostname; every
/// row naming an interface contributes one interface, in row order. Rows
/// with an unknown device type or an empty hostname are dropped.
pub fn compile(rows: &[Row]) -> DeviceGroups {
    let mut groups: DeviceGroups = DeviceClass::ALL.iter().map(|c| (*c, Vec::new())).collect();
    let mut seen: HashMap<(DeviceClass, String), usize> = HashMap::new();
    let mut dropped = 0usize;

    for row in rows {
        let hostname = row.hostname.trim();
        if hostname.is_empty() {
            continue;
        }
        let Some(class) = DeviceClass::parse(&row.device_type) else {
            dropped += 1;
            continue;
        };

        let devices = groups.entry(class).or_default();
        let key = (class, hostname.to_string());
        let idx = match seen.get(&key) {
            Some(&idx) => idx,
            None => {
                devices.push(new_device(class, hostname, row));
                seen.insert(key, devices.len() - 1);
                devices.len() - 1
            }
        };

        if let Some(iface) = interface_from_row(row) {
            devices[idx].interfaces.push(iface);
        }
    }

    if dropped > 0 {
        tracing::debug!("Dropped {} rows with an unknown device type", dropped);
    }
    groups
}

fn new_device(class: DeviceClass, hostname: &str, row: &Row) -> Device {
    let routing = ROUTING_FIELDS
        .iter()
        .filter_map(|name| {
            let raw = row.field(name)?;
            normalize_routing_field(name, raw).map(|v| (name.to_string(), v))
        })
        .collect();

    Device {
        device_type: class,
        hostname: hostname.to_string(),
        username: row.username.clone(),
        password: row.password.clone(),
        vlan_list: split_vlans(&row.vlan_list),
        interfaces: Vec::new(),
        routing,
    }
}

/// Flatten a compiled device back into store rows: one row per interface,
/// or a single device-level row when it has none.
#[cfg(test)]
pub fn device_to_rows(device: &Device) -> Vec<Row> {
    let mut base = Row {
        device_type: device.device_type.as_str().to_string(),
        hostname: device.hostname.clone(),
        username: device.username.clone(),
        password: device.password.clone(),
        vlan_list: device.vlan_list.join(","),
        ..Default::default()
    };
    for (name, value) in &device.routing {
        if let Some(slot) = base.field_mut(name) {
            *slot = value.to_cell();
        }
    }

    if device.interfaces.is_empty() {
        return vec![base];
    }

    device
        .interfaces
        .iter()
        .map(|iface| {
            let mut row = base.clone();
            row.intf_name = iface.name.clone();
            row.intf_desc = iface.description.clone().unwrap_or_default();
            row.intf_switchport_mode = iface.mode.clone().unwrap_or_default();
            row.intf_access_vlan = iface.access_vlan.clone().unwrap_or_default();
            row.intf_no_switchport = match iface.no_switchport {
                Some(true) => "TRUE".to_string(),
                _ => String::new(),
            };
            row.intf_encapsulation = iface.encapsulation.clone().unwrap_or_default();
            row.intf_ipv4 = iface.ipv4.clone().unwrap_or_default();
            row.intf_ipv6 = iface.ipv6.clone().unwrap_or_default();
            row.intf_ospf_area = iface.ospf_area.clone().unwrap_or_default();
            row
        })
        .collect()
}

/// Every compiled device across classes, class by class
pub fn all_devices(groups: &DeviceGroups) -> impl Iterator<Item = &Device> {
    groups.values().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RoutingValue;

    fn row(class: &str, hostname: &str, intf: &str) -> Row {
        Row {
            device_type: class.into(),
            hostname: hostname.into(),
            username: "admin".into(),
            password: "admin".into(),
            intf_name: intf.into(),
            ..Default::default()
        }
    }

    fn sample_rows() -> Vec<Row> {
        let mut r1 = row("router", "R1", "Ethernet1");
        r1.vlan_list = "10,20".into();
        r1.bgp_asn = "65001".into();
        r1.rip_enabled = "true".into();
        r1.bgp_networks_ipv4 = "10.0.0.0/24;10.0.1.0/24".into();
        r1.intf_ipv4 = "10.0.0.1/30".into();
        r1.intf_desc = "to S1".into();

        let mut s1 = row("switch", "S1", "Ethernet1");
        s1.intf_switchport_mode = "access".into();
        s1.intf_access_vlan = "10".into();

        let mut r1_eth2 = row("router", "R1", "Ethernet2");
        // device-level fields on later rows are ignored
        r1_eth2.bgp_asn = "65999".into();
        r1_eth2.intf_no_switchport = "TRUE".into();

        vec![
            r1,
            s1,
            row("edge_router", "E1", ""),
            r1_eth2,
            row("firewall", "F1", "Ethernet1"),
            row("switch", "S0", "Ethernet9"),
            row("router", "", "Ethernet1"),
        ]
    }

    #[test]
    fn test_groups_preserve_first_encounter_order() {
        let groups = compile(&sample_rows());
        let hosts = |c: DeviceClass| -> Vec<String> {
            groups[&c].iter().map(|d| d.hostname.clone()).collect()
        };
        assert_eq!(hosts(DeviceClass::Router), vec!["R1"]);
        assert_eq!(hosts(DeviceClass::Switch), vec!["S1", "S0"]);
        assert_eq!(hosts(DeviceClass::EdgeRouter), vec!["E1"]);
        assert_eq!(all_devices(&groups).count(), 4);
    }

    #[test]
    fn test_device_fields_and_routing() {
        let groups = compile(&sample_rows());
        let r1 = &groups[&DeviceClass::Router][0];

        assert_eq!(r1.vlan_list, vec!["10", "20"]);
        assert_eq!(r1.routing.get("bgp_asn"), Some(&RoutingValue::Text("65001".into())));
        assert_eq!(r1.routing.get("rip_enabled"), Some(&RoutingValue::Flag(true)));
        assert_eq!(
            r1.routing.get("bgp_networks_ipv4"),
            Some(&RoutingValue::List(vec!["10.0.0.0/24".into(), "10.0.1.0/24".into()]))
        );
        assert!(!r1.routing.contains_key("rip_networks"));
        assert!(!r1.routing.contains_key("router_id"));

        let names: Vec<_> = r1.interfaces.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Ethernet1", "Ethernet2"]);
        assert_eq!(r1.interfaces[1].no_switchport, Some(true));
    }

    #[test]
    fn test_device_without_interfaces() {
        let groups = compile(&sample_rows());
        let e1 = &groups[&DeviceClass::EdgeRouter][0];
        assert!(e1.interfaces.is_empty());
    }

    #[test]
    fn test_no_interface_carries_empty_or_false_values() {
        let groups = compile(&sample_rows());
        for device in all_devices(&groups) {
            for iface in &device.interfaces {
                let value = serde_json::to_value(iface).unwrap();
                for (key, v) in value.as_object().unwrap() {
                    assert!(!v.is_null(), "{} is null", key);
                    assert_ne!(v, "", "{} is empty", key);
                    assert_ne!(v, "FALSE", "{} is FALSE", key);
                    assert_ne!(v, false, "{} is false", key);
                }
            }
        }
    }

    #[test]
    fn test_compile_is_idempotent_through_rows() {
        let first = compile(&sample_rows());
        let rows: Vec<Row> = all_devices(&first).flat_map(device_to_rows).collect();
        let second = compile(&rows);
        assert_eq!(first, second);
    }

    #[test]
    fn test_compile_twice_is_identical() {
        let rows = sample_rows();
        assert_eq!(compile(&rows), compile(&rows));
    }
}
