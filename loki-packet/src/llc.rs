//! LLC (Logical Link Control) and SNAP (SubNetwork Access Protocol)
//!
//! DTP rides on LLC/SNAP with the Cisco OUI; IS-IS uses plain LLC with the
//! OSI network-layer SAP (0xFE).

use bytes::{BufMut, BytesMut};

/// SNAP SAP (0xAA)
pub const SAP_SNAP: u8 = 0xAA;
/// OSI network layer SAP (0xFE), used by IS-IS
pub const SAP_OSI: u8 = 0xFE;
/// Unnumbered information control field
pub const CONTROL_UI: u8 = 0x03;

/// Organizationally Unique Identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Oui(pub [u8; 3]);

impl Oui {
    /// Cisco Systems (00:00:0C)
    pub const CISCO: Oui = Oui([0x00, 0x00, 0x0C]);
}

/// SNAP protocol ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapProtocolId(pub u16);

impl SnapProtocolId {
    /// Dynamic Trunking Protocol
    pub const DTP: SnapProtocolId = SnapProtocolId(0x2004);
}

/// LLC header (3 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlcHeader {
    pub dsap: u8,
    pub ssap: u8,
    pub control: u8,
}

impl LlcHeader {
    /// LLC header size in bytes
    pub const SIZE: usize = 3;

    /// Standard SNAP LLC header (AA AA 03)
    pub const SNAP: LlcHeader = LlcHeader {
        dsap: SAP_SNAP,
        ssap: SAP_SNAP,
        control: CONTROL_UI,
    };

    /// OSI LLC header (FE FE 03)
    pub const OSI: LlcHeader = LlcHeader {
        dsap: SAP_OSI,
        ssap: SAP_OSI,
        control: CONTROL_UI,
    };

    pub fn to_bytes(&self) -> [u8; 3] {
        [self.dsap, self.ssap, self.control]
    }

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        match data {
            [dsap, ssap, control, ..] => Some(LlcHeader {
                dsap: *dsap,
                ssap: *ssap,
                control: *control,
            }),
            _ => None,
        }
    }
}

/// SNAP header (5 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapHeader {
    pub oui: Oui,
    pub protocol_id: SnapProtocolId,
}

impl SnapHeader {
    /// SNAP header size in bytes
    pub const SIZE: usize = 5;

    /// Cisco OUI + DTP protocol
    pub const DTP: SnapHeader = SnapHeader {
        oui: Oui::CISCO,
        protocol_id: SnapProtocolId::DTP,
    };

    pub fn to_bytes(&self) -> [u8; 5] {
        let mut bytes = [0u8; 5];
        bytes[0..3].copy_from_slice(&self.oui.0);
        bytes[3..5].copy_from_slice(&self.protocol_id.0.to_be_bytes());
        bytes
    }

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }
        Some(SnapHeader {
            oui: Oui([data[0], data[1], data[2]]),
            protocol_id: SnapProtocolId(u16::from_be_bytes([data[3], data[4]])),
        })
    }
}

/// LLC/SNAP encapsulated payload
#[derive(Debug, Clone)]
pub struct LlcSnapFrame {
    pub llc: LlcHeader,
    pub snap: SnapHeader,
    pub payload: Vec<u8>,
}

impl LlcSnapFrame {
    /// Total LLC/SNAP header size (LLC + SNAP)
    pub const HEADER_SIZE: usize = LlcHeader::SIZE + SnapHeader::SIZE;

    /// Create a DTP LLC/SNAP frame
    pub fn dtp(payload: Vec<u8>) -> Self {
        LlcSnapFrame {
            llc: LlcHeader::SNAP,
            snap: SnapHeader::DTP,
            payload,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = BytesMut::with_capacity(Self::HEADER_SIZE + self.payload.len());
        buffer.put_slice(&self.llc.to_bytes());
        buffer.put_slice(&self.snap.to_bytes());
        buffer.put_slice(&self.payload);
        buffer.to_vec()
    }

    /// Split an LLC/SNAP payload into headers and body (borrowed)
    pub fn split(data: &[u8]) -> Option<(LlcHeader, SnapHeader, &[u8])> {
        if data.len() < Self::HEADER_SIZE {
            return None;
        }
        let llc = LlcHeader::from_bytes(&data[0..3])?;
        let snap = SnapHeader::from_bytes(&data[3..8])?;
        Some((llc, snap, &data[Self::HEADER_SIZE..]))
    }
}

/// Prefix a payload with the OSI LLC header
pub fn osi_llc(payload: &[u8]) -> Vec<u8> {
    let mut buffer = BytesMut::with_capacity(LlcHeader::SIZE + payload.len());
    buffer.put_slice(&LlcHeader::OSI.to_bytes());
    buffer.put_slice(payload);
    buffer.to_vec()
}

/// Strip the OSI LLC header, if present
pub fn strip_osi_llc(data: &[u8]) -> Option<&[u8]> {
    match LlcHeader::from_bytes(data)? {
        LlcHeader::OSI => Some(&data[LlcHeader::SIZE..]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtp_prefix_bytes() {
        let bytes = LlcSnapFrame::dtp(vec![0x01]).to_bytes();
        assert_eq!(bytes, vec![0xAA, 0xAA, 0x03, 0x00, 0x00, 0x0C, 0x20, 0x04, 0x01]);
    }

    #[test]
    fn test_split() {
        let bytes = LlcSnapFrame::dtp(vec![0x01, 0x02]).to_bytes();
        let (llc, snap, body) = LlcSnapFrame::split(&bytes).unwrap();
        assert_eq!(llc, LlcHeader::SNAP);
        assert_eq!(snap, SnapHeader::DTP);
        assert_eq!(body, &[0x01, 0x02]);
        assert!(LlcSnapFrame::split(&bytes[..5]).is_none());
    }

    #[test]
    fn test_osi_llc() {
        let bytes = osi_llc(&[0x83, 0x1b]);
        assert_eq!(&bytes[..3], &[0xFE, 0xFE, 0x03]);
        assert_eq!(strip_osi_llc(&bytes), Some(&[0x83, 0x1b][..]));
        assert!(strip_osi_llc(&[0xAA, 0xAA, 0x03]).is_none());
    }
}
