//! Interface enumeration for `loki interfaces` and capture target checks

use loki_core::{Error, MacAddr, Result};
use pnet_datalink::{self, NetworkInterface};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

/// What the capture side needs to know about an interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    pub mac: Option<MacAddr>,
    /// First IPv4 address and its prefix length
    pub ipv4: Option<(Ipv4Addr, u8)>,
    /// Count of further addresses (IPv6 and secondary IPv4)
    pub other_addresses: usize,
    pub is_up: bool,
    pub is_loopback: bool,
}

impl From<&NetworkInterface> for InterfaceInfo {
    fn from(iface: &NetworkInterface) -> Self {
        let ipv4 = iface.ips.iter().find_map(|net| match net.ip() {
            IpAddr::V4(addr) => Some((addr, net.prefix())),
            IpAddr::V6(_) => None,
        });
        Self {
            name: iface.name.clone(),
            mac: iface.mac.map(|m| MacAddr::new([m.0, m.1, m.2, m.3, m.4, m.5])),
            ipv4,
            other_addresses: iface.ips.len() - usize::from(ipv4.is_some()),
            is_up: iface.is_up(),
            is_loopback: iface.is_loopback(),
        }
    }
}

impl InterfaceInfo {
    /// Up, not loopback, and with a hardware address to forge frames from
    pub fn can_inject(&self) -> bool {
        self.is_up && !self.is_loopback && self.mac.is_some_and(|mac| mac != MacAddr::zero())
    }
}

impl fmt::Display for InterfaceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mac = self.mac.map_or_else(|| "-".to_string(), |m| m.to_string());
        let ipv4 = self
            .ipv4
            .map_or_else(|| "-".to_string(), |(addr, prefix)| format!("{}/{}", addr, prefix));
        write!(
            f,
            "{:<12} {:<17} {:<18} {:<4}",
            self.name,
            mac,
            ipv4,
            if self.is_up { "up" } else { "down" }
        )?;
        if self.can_inject() {
            write!(f, " inject")?;
        }
        Ok(())
    }
}

/// Every interface the OS reports
pub fn list_interfaces() -> Result<Vec<InterfaceInfo>> {
    let interfaces = pnet_datalink::interfaces();
    if interfaces.is_empty() {
        return Err(Error::Capture(
            "no network interfaces visible, check privileges".to_string(),
        ));
    }
    Ok(interfaces.iter().map(InterfaceInfo::from).collect())
}

pub fn get_interface(name: &str) -> Result<InterfaceInfo> {
    pnet_datalink::interfaces()
        .iter()
        .find(|iface| iface.name == name)
        .map(InterfaceInfo::from)
        .ok_or_else(|| Error::InterfaceNotFound(name.to_string()))
}

/// First interface frames can be injected on
pub fn default_interface() -> Result<InterfaceInfo> {
    list_interfaces()?
        .into_iter()
        .find(InterfaceInfo::can_inject)
        .ok_or_else(|| Error::Capture("no interface suitable for injection".to_string()))
}
