//! ARP Packet Structure and Parsing

use bytes::{BufMut, BytesMut};
use loki_core::{Error, MacAddr, Result};
use loki_packet::{EtherType, EthernetFrame};
use std::net::Ipv4Addr;

/// Hardware types
pub const HTYPE_ETHERNET: u16 = 1;

/// Protocol types
pub const PTYPE_IPV4: u16 = 0x0800;

/// Ethernet/IPv4 ARP body length
pub const ARP_LEN: usize = 28;

/// ARP Operation Codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpOpcode {
    Request = 1,
    Reply = 2,
}

impl ArpOpcode {
    pub fn from_u16(val: u16) -> Option<Self> {
        match val {
            1 => Some(Self::Request),
            2 => Some(Self::Reply),
            _ => None,
        }
    }
}

/// Ethernet/IPv4 ARP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpPacket {
    pub operation: ArpOpcode,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    /// Who-has request for `target_ip`
    pub fn request(sender_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        Self {
            operation: ArpOpcode::Request,
            sender_mac,
            sender_ip,
            target_mac: MacAddr::zero(),
            target_ip,
        }
    }

    /// Is-at reply claiming `sender_ip` lives at `sender_mac`
    pub fn reply(
        sender_mac: MacAddr,
        sender_ip: Ipv4Addr,
        target_mac: MacAddr,
        target_ip: Ipv4Addr,
    ) -> Self {
        Self {
            operation: ArpOpcode::Reply,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < ARP_LEN {
            return Err(Error::truncated("arp", ARP_LEN, data.len()));
        }

        let htype = u16::from_be_bytes([data[0], data[1]]);
        let ptype = u16::from_be_bytes([data[2], data[3]]);
        if htype != HTYPE_ETHERNET || ptype != PTYPE_IPV4 || data[4] != 6 || data[5] != 4 {
            return Err(Error::parsing(format!(
                "unsupported ARP hardware/protocol {:#06x}/{:#06x}",
                htype, ptype
            )));
        }

        let op = u16::from_be_bytes([data[6], data[7]]);
        let operation = ArpOpcode::from_u16(op)
            .ok_or_else(|| Error::parsing(format!("invalid ARP opcode {}", op)))?;

        let mac_at = |offset: usize| MacAddr::from_slice(&data[offset..]).unwrap_or_else(MacAddr::zero);
        let ip_at = |offset: usize| {
            Ipv4Addr::new(data[offset], data[offset + 1], data[offset + 2], data[offset + 3])
        };

        Ok(Self {
            operation,
            sender_mac: mac_at(8),
            sender_ip: ip_at(14),
            target_mac: mac_at(18),
            target_ip: ip_at(24),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(ARP_LEN);

        buf.put_u16(HTYPE_ETHERNET);
        buf.put_u16(PTYPE_IPV4);
        buf.put_u8(6);
        buf.put_u8(4);
        buf.put_u16(self.operation as u16);
        buf.put_slice(self.sender_mac.as_bytes());
        buf.put_slice(&self.sender_ip.octets());
        buf.put_slice(self.target_mac.as_bytes());
        buf.put_slice(&self.target_ip.octets());

        buf.to_vec()
    }

    /// Wrap in an Ethernet frame
    pub fn to_frame(&self, destination: MacAddr, source: MacAddr) -> Vec<u8> {
        EthernetFrame::new(destination, source, EtherType::ARP, self.to_bytes()).to_bytes()
    }

    pub fn is_request(&self) -> bool {
        self.operation == ArpOpcode::Request
    }
}
