use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;
use crate::models::{Row, HEADERS};

/// How a submitted row set for one hostname is reconciled with the store.
///
/// `Overwrite` treats the submission as the complete, authoritative set of
/// rows for that hostname: every stored row for it is discarded, including
/// interfaces the submission does not mention. `Update` only touches the
/// interfaces it names, never blanks a field with an empty value and never
/// deletes anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    Overwrite,
    Update,
}

impl MergePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overwrite => "overwrite",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergePolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overwrite" => Ok(Self::Overwrite),
            "update" => Ok(Self::Update),
            other => Err(PipelineError::InvalidArgument(format!(
                "unknown merge policy: {}",
                other
            ))),
        }
    }
}

/// Merge `new_rows` (all for the hostname of the first new row) into
/// `existing_rows` under `policy`. An empty submission changes nothing.
pub fn merge_rows(existing_rows: Vec<Row>, new_rows: Vec<Row>, policy: MergePolicy) -> Vec<Row> {
    let existing_rows = trimmed(existing_rows);
    let new_rows = trimmed(new_rows);
    let Some(hostname) = new_rows.first().map(|r| r.hostname.clone()) else {
        return existing_rows;
    };

    match policy {
        MergePolicy::Overwrite => {
            let mut merged: Vec<Row> = existing_rows
                .into_iter()
                .filter(|r| r.hostname != hostname)
                .collect();
            merged.extend(new_rows);
            merged
        }
        MergePolicy::Update => update_rows(existing_rows, new_rows, &hostname),
    }
}

fn update_rows(existing_rows: Vec<Row>, new_rows: Vec<Row>, hostname: &str) -> Vec<Row> {
    // Pending submissions keyed by interface name, in first-seen key order.
    // A repeated interface name keeps its slot but takes the later row.
    let mut pending: Vec<Option<Row>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for row in new_rows {
        match index.get(&row.intf_name) {
            Some(&slot) => pending[slot] = Some(row),
            None => {
                index.insert(row.intf_name.clone(), pending.len());
                pending.push(Some(row));
            }
        }
    }

    let mut merged = Vec::with_capacity(existing_rows.len() + pending.len());
    for row in existing_rows {
        let slot = if row.hostname == hostname {
            index.get(&row.intf_name).copied()
        } else {
            None
        };

        match slot.and_then(|s| pending[s].take()) {
            Some(submitted) => merged.push(overlay(row, &submitted)),
            None => merged.push(row),
        }
    }

    merged.extend(pending.into_iter().flatten());
    merged
}

fn trimmed(mut rows: Vec<Row>) -> Vec<Row> {
    rows.iter_mut().for_each(Row::trim_keys);
    rows
}

/// Copy every non-empty field of `submitted` over `base`
fn overlay(mut base: Row, submitted: &Row) -> Row {
    for name in HEADERS {
        let Some(value) = submitted.field(name).filter(|v| !v.is_empty()) else {
            continue;
        };
        if let Some(slot) = base.field_mut(name) {
            *slot = value.to_string();
        }
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(hostname: &str, intf: &str) -> Row {
        Row::new(hostname, intf)
    }

    fn with_desc(mut r: Row, desc: &str) -> Row {
        r.intf_desc = desc.into();
        r
    }

    fn names(rows: &[Row]) -> Vec<(String, String)> {
        rows.iter()
            .map(|r| (r.hostname.clone(), r.intf_name.clone()))
            .collect()
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("overwrite".parse::<MergePolicy>().unwrap(), MergePolicy::Overwrite);
        assert_eq!("update".parse::<MergePolicy>().unwrap(), MergePolicy::Update);
        let err = "replace".parse::<MergePolicy>().unwrap_err();
        assert_eq!(
            err,
            PipelineError::InvalidArgument("unknown merge policy: replace".into())
        );
    }

    #[test]
    fn test_empty_submission_is_identity() {
        let existing = vec![row("R1", "Ethernet1"), row("R2", "Ethernet1")];
        for policy in [MergePolicy::Overwrite, MergePolicy::Update] {
            assert_eq!(merge_rows(existing.clone(), vec![], policy), existing);
        }
    }

    #[test]
    fn test_update_changes_only_submitted_fields() {
        let mut existing = with_desc(row("R1", "Eth1"), "old");
        existing.intf_ipv4 = "10.0.0.1/30".into();
        existing.username = "admin".into();

        let merged = merge_rows(
            vec![existing.clone()],
            vec![with_desc(row("R1", "Eth1"), "updated")],
            MergePolicy::Update,
        );

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].intf_desc, "updated");
        let mut expected = existing;
        expected.intf_desc = "updated".into();
        assert_eq!(merged[0], expected);
    }

    #[test]
    fn test_update_never_blanks_fields() {
        let mut existing = row("R1", "Eth1");
        existing.intf_ipv6 = "2001:db8::1/64".into();
        existing.bgp_asn = "65001".into();

        let submitted = row("R1", "Eth1");
        let merged = merge_rows(vec![existing.clone()], vec![submitted], MergePolicy::Update);
        assert_eq!(merged, vec![existing]);
    }

    #[test]
    fn test_update_keeps_unmentioned_interfaces_and_appends_new() {
        let existing = vec![
            with_desc(row("R1", "Eth1"), "a"),
            with_desc(row("R2", "Eth1"), "other host"),
            with_desc(row("R1", "Eth2"), "b"),
        ];
        let submitted = vec![
            with_desc(row("R1", "Eth3"), "new"),
            with_desc(row("R1", "Eth2"), "b2"),
        ];

        let merged = merge_rows(existing, submitted, MergePolicy::Update);
        assert_eq!(
            names(&merged),
            vec![
                ("R1".into(), "Eth1".into()),
                ("R2".into(), "Eth1".into()),
                ("R1".into(), "Eth2".into()),
                ("R1".into(), "Eth3".into()),
            ]
        );
        assert_eq!(merged[0].intf_desc, "a");
        assert_eq!(merged[1].intf_desc, "other host");
        assert_eq!(merged[2].intf_desc, "b2");
        assert_eq!(merged[3].intf_desc, "new");
    }

    #[test]
    fn test_update_ignores_other_hostnames_with_same_interface() {
        let existing = vec![with_desc(row("R2", "Eth1"), "r2")];
        let merged = merge_rows(
            existing,
            vec![with_desc(row("R1", "Eth1"), "r1")],
            MergePolicy::Update,
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].intf_desc, "r2");
        assert_eq!(merged[1].hostname, "R1");
    }

    #[test]
    fn test_update_device_level_row_does_not_duplicate() {
        let mut base = row("R1", "");
        base.bgp_asn = "65000".into();
        let mut edit = row("R1", "");
        edit.router_id = "1.1.1.1".into();

        let merged = merge_rows(vec![base], vec![edit], MergePolicy::Update);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].bgp_asn, "65000");
        assert_eq!(merged[0].router_id, "1.1.1.1");
    }

    #[test]
    fn test_overwrite_replaces_whole_hostname() {
        let existing = vec![row("R1", "Eth1"), row("S1", "Eth1"), row("R1", "Eth2")];
        let merged = merge_rows(existing, vec![row("R1", "Eth3")], MergePolicy::Overwrite);
        assert_eq!(
            names(&merged),
            vec![("S1".into(), "Eth1".into()), ("R1".into(), "Eth3".into())]
        );
    }

    #[test]
    fn test_update_matches_padded_keys() {
        let existing = vec![with_desc(row("R1", "Ethernet1"), "old")];
        let submitted = vec![with_desc(row(" R1", "Ethernet1 "), "new")];

        let merged = merge_rows(existing, submitted, MergePolicy::Update);
        assert_eq!(names(&merged), vec![("R1".into(), "Ethernet1".into())]);
        assert_eq!(merged[0].intf_desc, "new");
    }

    #[test]
    fn test_overwrite_matches_padded_hostname() {
        let existing = vec![row("R1 ", "Eth1"), row("S1", "Eth1")];
        let merged = merge_rows(existing, vec![row(" R1", "Eth2")], MergePolicy::Overwrite);
        assert_eq!(
            names(&merged),
            vec![("S1".into(), "Eth1".into()), ("R1".into(), "Eth2".into())]
        );
    }

    #[test]
    fn test_overwrite_only_host() {
        let existing = vec![row("R1", "Eth1"), row("R1", "Eth2")];
        let merged = merge_rows(existing, vec![row("R1", "Eth3")], MergePolicy::Overwrite);
        assert_eq!(merged, vec![row("R1", "Eth3")]);
    }
}
