//! Ethernet frame construction
//!
//! Parsing lives in `loki_core::frame`; this module only builds frames.

use bytes::{BufMut, BytesMut};
use loki_core::{ethertypes, MacAddr};
use std::fmt;

/// Type field of a forged frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtherType {
    IPv4,
    ARP,
    MPLS,
    /// 802.3 framing: the field carries the payload length (DTP, IS-IS)
    LLC,
    Custom(u16),
}

impl EtherType {
    /// Wire value; `None` for 802.3 frames, whose field depends on the payload
    pub fn value(self) -> Option<u16> {
        match self {
            EtherType::IPv4 => Some(ethertypes::IPV4),
            EtherType::ARP => Some(ethertypes::ARP),
            EtherType::MPLS => Some(ethertypes::MPLS_UNICAST),
            EtherType::LLC => None,
            EtherType::Custom(value) => Some(value),
        }
    }
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value() {
            None => f.write_str("802.3"),
            Some(value) => write!(f, "0x{:04x}", value),
        }
    }
}

/// A frame ready to hand to an injector
#[derive(Debug, Clone)]
pub struct EthernetFrame {
    pub destination: MacAddr,
    pub source: MacAddr,
    pub ethertype: EtherType,
    pub payload: Vec<u8>,
}

impl EthernetFrame {
    /// Shortest frame on the wire, FCS excluded
    pub const MIN_FRAME_SIZE: usize = 60;
    pub const HEADER_SIZE: usize = 14;

    pub fn new(
        destination: MacAddr,
        source: MacAddr,
        ethertype: EtherType,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            destination,
            source,
            ethertype,
            payload,
        }
    }

    /// Serialize, zero-padding to [`Self::MIN_FRAME_SIZE`]
    pub fn to_bytes(&self) -> Vec<u8> {
        let len = (Self::HEADER_SIZE + self.payload.len()).max(Self::MIN_FRAME_SIZE);
        let mut buf = BytesMut::with_capacity(len);
        buf.put_slice(self.destination.as_bytes());
        buf.put_slice(self.source.as_bytes());
        let type_or_length = self
            .ethertype
            .value()
            .unwrap_or(self.payload.len() as u16);
        buf.put_u16(type_or_length);
        buf.put_slice(&self.payload);
        buf.resize(len, 0);
        buf.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loki_core::Frame;

    #[test]
    fn test_short_frame_is_padded() {
        let dst = MacAddr::broadcast();
        let src = MacAddr::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        let bytes = EthernetFrame::new(dst, src, EtherType::ARP, vec![1, 2, 3, 4]).to_bytes();
        assert_eq!(bytes.len(), EthernetFrame::MIN_FRAME_SIZE);
        assert_eq!(&bytes[18..20], &[0, 0]);

        let captured = Frame::new(bytes);
        let eth = captured.ethernet().unwrap();
        assert_eq!(eth.dst, dst);
        assert_eq!(eth.src, src);
        assert_eq!(eth.ethertype, 0x0806);
    }

    #[test]
    fn test_llc_frame_carries_length() {
        let bytes = EthernetFrame::new(
            MacAddr::broadcast(),
            MacAddr::zero(),
            EtherType::LLC,
            vec![0u8; 100],
        )
        .to_bytes();
        assert_eq!(u16::from_be_bytes([bytes[12], bytes[13]]), 100);
        assert_eq!(bytes.len(), 114);
        // padding does not change the announced length
        let short = EthernetFrame::new(MacAddr::zero(), MacAddr::zero(), EtherType::LLC, vec![1; 8])
            .to_bytes();
        assert_eq!(&short[12..14], &[0, 8]);
        assert_eq!(short.len(), 60);
    }

    #[test]
    fn test_display() {
        assert_eq!(EtherType::MPLS.to_string(), "0x8847");
        assert_eq!(EtherType::LLC.to_string(), "802.3");
    }
}
