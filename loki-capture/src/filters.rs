//! BPF (Berkeley Packet Filter) expressions for the traffic each module reads

/// ARP filter
pub fn arp_filter() -> String {
    "arp".to_string()
}

/// ARP plus IPv4, which the ARP relay needs to see
pub fn arp_relay_filter() -> String {
    "arp or ip".to_string()
}

/// DTP (Dynamic Trunking Protocol) filter
pub fn dtp_filter() -> String {
    "ether dst 01:00:0c:cc:cc:cc and ether[20:2] == 0x2004".to_string()
}

/// EIGRP filter (IP protocol 88)
pub fn eigrp_filter() -> String {
    "ip proto 88".to_string()
}

/// OSPF filter (IP protocol 89)
pub fn ospf_filter() -> String {
    "ip proto 89".to_string()
}

/// IS-IS filter: frames to the L1 or L2 all-IS multicast groups
pub fn isis_filter() -> String {
    "ether dst 01:80:c2:00:00:14 or ether dst 01:80:c2:00:00:15".to_string()
}

/// 802.1Q tagged frames
pub fn dot1q_filter() -> String {
    "vlan".to_string()
}

/// MPLS filter (unicast and multicast ethertypes)
pub fn mpls_filter() -> String {
    "ether proto 0x8847 or ether proto 0x8848".to_string()
}

/// Filter for a module by its short name
pub fn module_filter(module: &str) -> Option<String> {
    match module {
        "arp" => Some(arp_relay_filter()),
        "dot1q" => Some(dot1q_filter()),
        "dtp" => Some(dtp_filter()),
        "eigrp" => Some(eigrp_filter()),
        "isis" => Some(isis_filter()),
        "mpls" => Some(mpls_filter()),
        "ospf" => Some(ospf_filter()),
        _ => None,
    }
}

/// Combine filters with OR logic
pub fn combine_filters_or(filters: &[&str]) -> String {
    match filters {
        [] => String::new(),
        [single] => single.to_string(),
        _ => filters
            .iter()
            .map(|f| format!("({})", f))
            .collect::<Vec<_>>()
            .join(" or "),
    }
}

/// Filter matching the traffic of every listed module
pub fn modules_filter<S: AsRef<str>>(modules: &[S]) -> Option<String> {
    let filters: Vec<String> = modules
        .iter()
        .filter_map(|m| module_filter(m.as_ref()))
        .collect();
    if filters.is_empty() {
        return None;
    }
    let refs: Vec<&str> = filters.iter().map(String::as_str).collect();
    Some(combine_filters_or(&refs))
}
