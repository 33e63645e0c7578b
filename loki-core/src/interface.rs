//! Network interface types and the raw transmit primitive

use crate::{Error, MacAddr, Result};
use ipnetwork::{IpNetwork, Ipv4Network};
use pnet_datalink::{self, Channel, DataLinkSender, NetworkInterface};
use std::fmt;
use std::net::Ipv4Addr;

/// Network interface
#[derive(Debug, Clone)]
pub struct Interface {
    /// Interface name (e.g., "eth0", "en0")
    pub name: String,
    /// Interface index
    pub index: u32,
    /// MAC address
    pub mac_address: MacAddr,
    /// First IPv4 network configured on the interface
    pub ipv4: Option<Ipv4Network>,
    /// MTU (Maximum Transmission Unit)
    pub mtu: u32,
    /// Is interface up?
    pub is_up: bool,
}

impl Interface {
    /// Create a new interface
    pub fn new(name: impl Into<String>, index: u32, mac_address: MacAddr) -> Self {
        Self {
            name: name.into(),
            index,
            mac_address,
            ipv4: None,
            mtu: 1500, // Default Ethernet MTU
            is_up: true,
        }
    }

    pub fn with_ipv4(mut self, network: Ipv4Network) -> Self {
        self.ipv4 = Some(network);
        self
    }

    /// Get interface by name
    pub fn by_name(name: &str) -> Result<Self> {
        let iface = find_interface(name)?;
        Ok(Self::from_pnet(&iface))
    }

    /// List all available interfaces
    pub fn list_all() -> Result<Vec<Self>> {
        Ok(pnet_datalink::interfaces()
            .iter()
            .map(Self::from_pnet)
            .collect())
    }

    fn from_pnet(iface: &NetworkInterface) -> Self {
        let mac_bytes = match iface.mac {
            Some(mac) => [mac.0, mac.1, mac.2, mac.3, mac.4, mac.5],
            None => [0, 0, 0, 0, 0, 0],
        };
        let ipv4 = iface.ips.iter().find_map(|ip| match ip {
            IpNetwork::V4(net) => Some(*net),
            IpNetwork::V6(_) => None,
        });

        Self {
            name: iface.name.clone(),
            index: iface.index,
            mac_address: MacAddr(mac_bytes),
            ipv4,
            mtu: 1500, // pnet doesn't expose MTU directly
            is_up: iface.is_up(),
        }
    }

    /// IPv4 address of this interface, if any
    pub fn ipv4_addr(&self) -> Option<Ipv4Addr> {
        self.ipv4.map(|net| net.ip())
    }

    /// IPv4 netmask of this interface, if any
    pub fn ipv4_mask(&self) -> Option<Ipv4Addr> {
        self.ipv4.map(|net| net.mask())
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ipv4 {
            Some(net) => write!(f, "{} ({}, {}), MTU: {}", self.name, self.mac_address, net, self.mtu),
            None => write!(f, "{} ({}), MTU: {}", self.name, self.mac_address, self.mtu),
        }
    }
}

fn find_interface(name: &str) -> Result<NetworkInterface> {
    pnet_datalink::interfaces()
        .into_iter()
        .find(|iface| iface.name == name)
        .ok_or_else(|| Error::InterfaceNotFound(name.to_string()))
}

/// Raw link-layer transmit primitive used by the injection consumer
pub trait RawLink: Send {
    /// Put one complete Ethernet frame on the wire
    fn transmit(&mut self, frame: &[u8]) -> Result<()>;
}

/// `RawLink` over a pnet datalink channel
pub struct PnetLink {
    tx: Box<dyn DataLinkSender>,
}

impl PnetLink {
    /// Open a transmit channel on the named interface
    pub fn open(name: &str) -> Result<Self> {
        let interface = find_interface(name)?;
        let tx = match pnet_datalink::channel(&interface, Default::default()) {
            Ok(Channel::Ethernet(tx, _rx)) => tx,
            Ok(_) => return Err(Error::Interface("Unsupported channel type".to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(Error::InsufficientPrivileges(format!(
                    "cannot open raw channel on {}: {}",
                    name, e
                )))
            }
            Err(e) => return Err(Error::Interface(format!("Failed to create channel: {}", e))),
        };
        Ok(Self { tx })
    }
}

impl RawLink for PnetLink {
    fn transmit(&mut self, frame: &[u8]) -> Result<()> {
        self.tx
            .send_to(frame, None)
            .ok_or_else(|| Error::Injection("Failed to send packet".to_string()))?
            .map_err(|e| Error::Injection(format!("Send error: {}", e)))
    }
}
