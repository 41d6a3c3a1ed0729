use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;

/// A partner's `permitted_ips` entries may be exact addresses
/// (`"203.0.113.7"`) or CIDR ranges (`"203.0.113.0/24"`). An empty set means no
/// restriction at all — that case is handled by the caller before reaching here.
pub fn ip_allowed(permitted: &[String], caller: IpAddr) -> bool {
    permitted.iter().any(|entry| entry_matches(entry, caller))
}

fn entry_matches(entry: &str, caller: IpAddr) -> bool {
    if let Ok(net) = IpNet::from_str(entry) {
        return net.contains(&caller);
    }
    if let Ok(addr) = IpAddr::from_str(entry) {
        return addr == caller;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_exact_address() {
        let list = vec!["203.0.113.7".to_string()];
        assert!(ip_allowed(&list, "203.0.113.7".parse().unwrap()));
        assert!(!ip_allowed(&list, "203.0.113.8".parse().unwrap()));
    }

    #[test]
    fn matches_cidr_range() {
        let list = vec!["203.0.113.0/24".to_string()];
        assert!(ip_allowed(&list, "203.0.113.250".parse().unwrap()));
        assert!(!ip_allowed(&list, "203.0.114.1".parse().unwrap()));
    }

    #[test]
    fn empty_entries_never_match() {
        let list: Vec<String> = vec![];
        assert!(!ip_allowed(&list, "1.2.3.4".parse().unwrap()));
    }

    #[test]
    fn malformed_entry_is_ignored_not_fatal() {
        let list = vec!["not-an-ip".to_string(), "10.0.0.1".to_string()];
        assert!(ip_allowed(&list, "10.0.0.1".parse().unwrap()));
    }
}
