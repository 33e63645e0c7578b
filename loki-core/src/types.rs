//! Common types used throughout Loki

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use uuid::Uuid;

/// MAC Address (6 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// Create a new MAC address
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Broadcast MAC address (ff:ff:ff:ff:ff:ff)
    pub const fn broadcast() -> Self {
        Self([0xff, 0xff, 0xff, 0xff, 0xff, 0xff])
    }

    /// Zero MAC address (00:00:00:00:00:00)
    pub const fn zero() -> Self {
        Self([0x00, 0x00, 0x00, 0x00, 0x00, 0x00])
    }

    /// Random unicast address used to stand in for a spoofed host.
    ///
    /// The first octet is kept at zero so the result is never a group address.
    pub fn ghost() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 6];
        rng.fill(&mut bytes[1..]);
        Self(bytes)
    }

    /// Read a MAC address from the first six bytes of `data`
    pub fn from_slice(data: &[u8]) -> Option<Self> {
        let bytes: [u8; 6] = data.get(..6)?.try_into().ok()?;
        Some(Self(bytes))
    }

    /// IPv4 multicast MAC (01:00:5e + low 23 bits of the group)
    pub fn ipv4_multicast(group: std::net::Ipv4Addr) -> Self {
        let o = group.octets();
        Self([0x01, 0x00, 0x5e, o[1] & 0x7f, o[2], o[3]])
    }

    /// Get bytes as slice
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Convert to array
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        self.0 == [0xff; 6]
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(crate::Error::protocol("Invalid MAC address format"));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            bytes[i] = u8::from_str_radix(part, 16)
                .map_err(|_| crate::Error::protocol("Invalid MAC address hex"))?;
        }

        Ok(MacAddr(bytes))
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

/// Identity of a running module instance, used as the owner of dispatch entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(Uuid);

impl ModuleId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ModuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ethertype constants
pub mod ethertypes {
    pub const IPV4: u16 = 0x0800;
    pub const ARP: u16 = 0x0806;
    pub const DOT1Q: u16 = 0x8100;
    pub const IPV6: u16 = 0x86DD;
    pub const MPLS_UNICAST: u16 = 0x8847;
    pub const MPLS_MULTICAST: u16 = 0x8848;

    /// Values up to this one are 802.3 length fields, not ethertypes
    pub const MAX_8023_LENGTH: u16 = 1500;
}

/// IP protocol numbers
pub mod ip_protocols {
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
    pub const EIGRP: u8 = 88;
    pub const OSPF: u8 = 89;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_parse_and_display() {
        let mac: MacAddr = "00:1a:2b:3c:4d:5e".parse().unwrap();
        assert_eq!(mac.octets(), [0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e]);
        assert_eq!(mac.to_string(), "00:1a:2b:3c:4d:5e");
        assert!("00:1a:2b".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_ghost_mac_is_unicast() {
        for _ in 0..32 {
            let ghost = MacAddr::ghost();
            assert_eq!(ghost.0[0], 0);
            assert!(!ghost.is_broadcast());
        }
    }

    #[test]
    fn test_ipv4_multicast_mac() {
        let mac = MacAddr::ipv4_multicast("224.0.0.5".parse().unwrap());
        assert_eq!(mac.to_string(), "01:00:5e:00:00:05");
    }

    #[test]
    fn test_module_ids_are_unique() {
        assert_ne!(ModuleId::new(), ModuleId::new());
    }
}
