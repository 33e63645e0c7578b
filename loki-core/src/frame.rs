//! Captured frames and their per-layer views
//!
//! A [`Frame`] is immutable once captured. Header views borrow from it and are
//! parsed on demand, one layer at a time, so a frame that is claimed at the
//! Ethernet layer never pays for IP parsing.

use std::net::Ipv4Addr;
use std::time::SystemTime;

use bytes::Bytes;

use crate::types::{ethertypes, ip_protocols};
use crate::{Error, MacAddr, Result};

pub const ETHERNET_HEADER_LEN: usize = 14;
pub const IPV4_MIN_HEADER_LEN: usize = 20;

/// A captured or constructed frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// When the frame was captured/created
    pub timestamp: SystemTime,
    /// Frame data (including all headers)
    pub data: Bytes,
    /// Length on the wire (may differ from data.len() if truncated by snaplen)
    pub wire_len: usize,
}

impl Frame {
    /// Create a frame stamped with the current time
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let wire_len = data.len();
        Self {
            timestamp: SystemTime::now(),
            data,
            wire_len,
        }
    }

    /// Create a frame from a capture record
    pub fn captured(timestamp: SystemTime, data: impl Into<Bytes>, wire_len: usize) -> Self {
        Self {
            timestamp,
            data: data.into(),
            wire_len,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Parse the Ethernet header
    pub fn ethernet(&self) -> Result<EthernetHeader<'_>> {
        EthernetHeader::parse(&self.data)
    }

    /// Parse the IPv4 header carried by this frame
    pub fn ipv4(&self) -> Result<Ipv4Header<'_>> {
        let eth = self.ethernet()?;
        if eth.ethertype != ethertypes::IPV4 {
            return Err(Error::parsing(format!(
                "not an IPv4 frame (ethertype 0x{:04x})",
                eth.ethertype
            )));
        }
        Ipv4Header::parse(eth.payload)
    }
}

/// Ethernet II / 802.3 header view
#[derive(Debug, Clone, Copy)]
pub struct EthernetHeader<'a> {
    pub dst: MacAddr,
    pub src: MacAddr,
    /// Ethertype, or the 802.3 length when `<= 1500`
    pub ethertype: u16,
    pub payload: &'a [u8],
}

impl<'a> EthernetHeader<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < ETHERNET_HEADER_LEN {
            return Err(Error::truncated("ethernet header", ETHERNET_HEADER_LEN, data.len()));
        }
        let mut dst = [0u8; 6];
        let mut src = [0u8; 6];
        dst.copy_from_slice(&data[0..6]);
        src.copy_from_slice(&data[6..12]);
        Ok(Self {
            dst: MacAddr(dst),
            src: MacAddr(src),
            ethertype: u16::from_be_bytes([data[12], data[13]]),
            payload: &data[ETHERNET_HEADER_LEN..],
        })
    }

    /// True when the type field is an 802.3 length (LLC framing follows)
    pub fn is_8023(&self) -> bool {
        self.ethertype <= ethertypes::MAX_8023_LENGTH
    }
}

/// IPv4 header view
#[derive(Debug, Clone, Copy)]
pub struct Ipv4Header<'a> {
    pub tos: u8,
    pub total_length: u16,
    pub identification: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    /// Raw header bytes including options
    pub header: &'a [u8],
    /// Payload, bounded by the total length field
    pub payload: &'a [u8],
}

impl<'a> Ipv4Header<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < IPV4_MIN_HEADER_LEN {
            return Err(Error::truncated("ipv4 header", IPV4_MIN_HEADER_LEN, data.len()));
        }
        if data[0] >> 4 != 4 {
            return Err(Error::parsing(format!("bad IP version {}", data[0] >> 4)));
        }
        let header_len = ((data[0] & 0x0f) as usize) * 4;
        if header_len < IPV4_MIN_HEADER_LEN || data.len() < header_len {
            return Err(Error::truncated("ipv4 options", header_len, data.len()));
        }
        let total_length = u16::from_be_bytes([data[2], data[3]]);
        // Ethernet padding may follow the datagram; trust the length field when sane.
        let end = (total_length as usize).clamp(header_len, data.len());

        Ok(Self {
            tos: data[1],
            total_length,
            identification: u16::from_be_bytes([data[4], data[5]]),
            ttl: data[8],
            protocol: data[9],
            checksum: u16::from_be_bytes([data[10], data[11]]),
            src: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
            dst: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
            header: &data[..header_len],
            payload: &data[header_len..end],
        })
    }

    pub fn header_len(&self) -> usize {
        self.header.len()
    }
}

/// Transport protocol carried in IPv4
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
}

impl Transport {
    pub fn from_ip_protocol(protocol: u8) -> Option<Self> {
        match protocol {
            ip_protocols::TCP => Some(Self::Tcp),
            ip_protocols::UDP => Some(Self::Udp),
            _ => None,
        }
    }
}

/// TCP/UDP header view (ports and payload only)
#[derive(Debug, Clone, Copy)]
pub struct TransportHeader<'a> {
    pub transport: Transport,
    pub src_port: u16,
    pub dst_port: u16,
    pub payload: &'a [u8],
}

impl<'a> TransportHeader<'a> {
    pub fn parse(transport: Transport, data: &'a [u8]) -> Result<Self> {
        let header_len = match transport {
            Transport::Udp => 8,
            Transport::Tcp => {
                if data.len() < 20 {
                    return Err(Error::truncated("tcp header", 20, data.len()));
                }
                ((data[12] >> 4) as usize) * 4
            }
        };
        if header_len < 8 || data.len() < header_len {
            return Err(Error::truncated("transport header", header_len, data.len()));
        }
        Ok(Self {
            transport,
            src_port: u16::from_be_bytes([data[0], data[1]]),
            dst_port: u16::from_be_bytes([data[2], data[3]]),
            payload: &data[header_len..],
        })
    }
}

/// Dispatch layers, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Ethernet,
    Ip,
    Tcp,
    Udp,
}

impl Layer {
    pub const ALL: [Layer; 4] = [Layer::Ethernet, Layer::Ip, Layer::Tcp, Layer::Udp];
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Layer::Ethernet => "ethernet",
            Layer::Ip => "ip",
            Layer::Tcp => "tcp",
            Layer::Udp => "udp",
        };
        f.write_str(name)
    }
}

/// A frame together with the headers parsed so far by the dispatcher
#[derive(Debug, Clone, Copy)]
pub struct PacketView<'a> {
    pub frame: &'a Frame,
    pub ethernet: EthernetHeader<'a>,
    pub ip: Option<Ipv4Header<'a>>,
    pub transport: Option<TransportHeader<'a>>,
}

impl<'a> PacketView<'a> {
    /// Start a view with only the Ethernet layer parsed
    pub fn new(frame: &'a Frame) -> Result<Self> {
        Ok(Self {
            frame,
            ethernet: frame.ethernet()?,
            ip: None,
            transport: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn udp_frame() -> Vec<u8> {
        let mut data = vec![
            0x01, 0x00, 0x5e, 0x00, 0x00, 0x05, // dst
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, // src
            0x08, 0x00,
        ];
        data.extend_from_slice(&[
            0x45, 0x00, 0x00, 0x20, 0x00, 0x01, 0x00, 0x00, 0x40, 0x11, 0x00, 0x00, 10, 0, 0, 1,
            10, 0, 0, 2,
        ]);
        data.extend_from_slice(&[0x12, 0x34, 0x00, 0x35, 0x00, 0x0c, 0x00, 0x00]);
        data.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        // trailing ethernet padding
        data.extend_from_slice(&[0u8; 6]);
        data
    }

    #[test]
    fn test_parse_layers() {
        let frame = Frame::new(udp_frame());
        let eth = frame.ethernet().unwrap();
        assert_eq!(eth.src.to_string(), "00:11:22:33:44:55");
        assert_eq!(eth.ethertype, ethertypes::IPV4);
        assert!(!eth.is_8023());

        let ip = frame.ipv4().unwrap();
        assert_eq!(ip.protocol, ip_protocols::UDP);
        assert_eq!(ip.src, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(ip.payload.len(), 12);

        let udp = TransportHeader::parse(Transport::Udp, ip.payload).unwrap();
        assert_eq!(udp.src_port, 0x1234);
        assert_eq!(udp.dst_port, 53);
        assert_eq!(udp.payload, &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_truncated_frames_fail() {
        assert!(Frame::new(vec![0u8; 10]).ethernet().is_err());

        let mut data = udp_frame();
        data.truncate(20);
        assert!(Frame::new(data).ipv4().is_err());
    }

    #[test]
    fn test_non_ip_frame_has_no_ipv4_view() {
        let mut data = udp_frame();
        data[12] = 0x08;
        data[13] = 0x06;
        assert!(Frame::new(data).ipv4().is_err());
    }
}
