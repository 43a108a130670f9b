use std::net::Ipv4Addr;

/// Validate a hostname before it is used in a file name.
/// Allows alphanumeric, hyphens, dots, and underscores. No path separators or shell metacharacters.
pub fn is_valid_hostname(hostname: &str) -> bool {
    if hostname.is_empty() || hostname.len() > 253 {
        return false;
    }
    hostname.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_')
}

/// Why an address cannot be used to reach a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressProblem {
    NotIpv4,
    Unspecified,
    Loopback,
    LinkLocal,
    Multicast,
    Broadcast,
    Experimental,
}

impl AddressProblem {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::NotIpv4 => "not a dotted-decimal IPv4 address",
            Self::Unspecified => "unspecified address",
            Self::Loopback => "loopback address",
            Self::LinkLocal => "link local address",
            Self::Multicast => "multicast address",
            Self::Broadcast => "broadcast address",
            Self::Experimental => "address in the experimental range",
        }
    }
}

/// Check that a management address is a unicast IPv4 host address
pub fn check_management_ipv4(addr: &str) -> Result<Ipv4Addr, AddressProblem> {
    let ip: Ipv4Addr = addr.trim().parse().map_err(|_| AddressProblem::NotIpv4)?;
    let first = ip.octets()[0];

    if ip.is_unspecified() {
        Err(AddressProblem::Unspecified)
    } else if ip.is_loopback() {
        Err(AddressProblem::Loopback)
    } else if ip.is_link_local() {
        Err(AddressProblem::LinkLocal)
    } else if ip.is_multicast() {
        Err(AddressProblem::Multicast)
    } else if ip.is_broadcast() {
        Err(AddressProblem::Broadcast)
    } else if first >= 240 {
        Err(AddressProblem::Experimental)
    } else {
        Ok(ip)
    }
}

/// Truncate output to a maximum number of lines
pub fn truncate_lines(s: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = s.lines().collect();
    if lines.len() <= max_lines {
        s.to_string()
    } else {
        let truncated: Vec<&str> = lines[..max_lines].to_vec();
        format!("{}\n... ({} more lines)", truncated.join("\n"), lines.len() - max_lines)
    }
}
