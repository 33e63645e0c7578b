//! DTP Packet Structures and Parsing
//!
//! A DTP PDU rides in an 802.3 frame behind the Cisco LLC/SNAP header
//! `AA AA 03 00 00 0C 20 04`: one version byte followed by a TLV stream with
//! 16-bit type and 16-bit length (the length counts the 4-byte header).

use bytes::{BufMut, Bytes, BytesMut};
use loki_core::{EthernetHeader, Error, MacAddr, Result};
use loki_packet::{EtherType, EthernetFrame, LlcSnapFrame, RawTlv, SnapHeader, TlvCodec};
use std::fmt;

/// DTP multicast destination MAC address (01:00:0C:CC:CC:CC)
pub const DTP_MULTICAST_MAC: MacAddr = MacAddr([0x01, 0x00, 0x0C, 0xCC, 0xCC, 0xCC]);

/// DTP protocol version
pub const DTP_VERSION: u8 = 0x01;

pub mod tlv_types {
    /// VTP domain name
    pub const DOMAIN: u16 = 0x0001;
    /// Port status (trunk/access, on/off/desirable/auto)
    pub const STATUS: u16 = 0x0002;
    /// Trunk encapsulation
    pub const TYPE: u16 = 0x0003;
    /// MAC of the sending port
    pub const SENDER: u16 = 0x0004;
}

/// DTP Status byte
///
/// The high nibble is the trunk operating status (0x00 access, 0x80 trunk),
/// the low nibble the administrative status (on, off, desirable, auto).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtpStatus(pub u8);

impl DtpStatus {
    pub const TOS_ACCESS: u8 = 0x00;
    pub const TOS_TRUNK: u8 = 0x80;

    pub const TAS_ON: u8 = 0x01;
    pub const TAS_OFF: u8 = 0x02;
    pub const TAS_DESIRABLE: u8 = 0x03;
    pub const TAS_AUTO: u8 = 0x04;

    pub const ACCESS_DESIRABLE: u8 = Self::TOS_ACCESS | Self::TAS_DESIRABLE;
    pub const ACCESS_AUTO: u8 = Self::TOS_ACCESS | Self::TAS_AUTO;
    pub const TRUNK_ON: u8 = Self::TOS_TRUNK | Self::TAS_ON;
    pub const TRUNK_DESIRABLE: u8 = Self::TOS_TRUNK | Self::TAS_DESIRABLE;

    /// Status announced while poisoning
    pub fn trunk_on() -> Self {
        Self(Self::TRUNK_ON)
    }

    pub fn operating_status(&self) -> u8 {
        self.0 & 0xF0
    }

    pub fn admin_status(&self) -> u8 {
        self.0 & 0x0F
    }

    pub fn is_trunk(&self) -> bool {
        self.operating_status() == Self::TOS_TRUNK
    }
}

impl fmt::Display for DtpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tos = match self.operating_status() {
            Self::TOS_ACCESS => "ACCESS",
            Self::TOS_TRUNK => "TRUNK",
            _ => "UNKNOWN",
        };
        let tas = match self.admin_status() {
            Self::TAS_ON => "ON",
            Self::TAS_OFF => "OFF",
            Self::TAS_DESIRABLE => "DESIRABLE",
            Self::TAS_AUTO => "AUTO",
            _ => "UNKNOWN",
        };
        write!(f, "{}/{}", tos, tas)
    }
}

/// DTP Type byte
///
/// Bits 7-5 are the trunk operating type (native, ISL, 802.1Q), the low
/// nibble the administrative type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtpType(pub u8);

impl DtpType {
    pub const TOT_NATIVE: u8 = 0x20;
    pub const TOT_ISL: u8 = 0x40;
    pub const TOT_DOT1Q: u8 = 0xA0;

    pub const TAT_NEGOTIATED: u8 = 0x00;
    pub const TAT_NATIVE: u8 = 0x01;
    pub const TAT_ISL: u8 = 0x02;
    pub const TAT_DOT1Q: u8 = 0x05;

    pub const DOT1Q_DOT1Q: u8 = Self::TOT_DOT1Q | Self::TAT_DOT1Q;
    pub const ISL_ISL: u8 = Self::TOT_ISL | Self::TAT_ISL;

    /// 802.1Q operating and administrative type
    pub fn dot1q() -> Self {
        Self(Self::DOT1Q_DOT1Q)
    }

    pub fn operating_type(&self) -> u8 {
        self.0 & 0xE0
    }

    pub fn admin_type(&self) -> u8 {
        self.0 & 0x0F
    }
}

impl fmt::Display for DtpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tot = match self.operating_type() {
            Self::TOT_NATIVE => "NATIVE",
            Self::TOT_ISL => "ISL",
            Self::TOT_DOT1Q => "802.1Q",
            _ => "UNKNOWN",
        };
        let tat = match self.admin_type() {
            Self::TAT_NEGOTIATED => "NEGOTIATED",
            Self::TAT_NATIVE => "NATIVE",
            Self::TAT_ISL => "ISL",
            Self::TAT_DOT1Q => "802.1Q",
            _ => "UNKNOWN",
        };
        write!(f, "{}/{}", tot, tat)
    }
}

/// One decoded DTP TLV. Anything that does not decode cleanly is kept raw so
/// a parsed PDU renders back to the same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DtpTlv {
    /// Domain bytes as sent, usually NUL padded
    Domain(Bytes),
    Status(DtpStatus),
    Type(DtpType),
    Sender(MacAddr),
    Other(RawTlv),
}

impl DtpTlv {
    fn decode(raw: RawTlv) -> Self {
        match (raw.tlv_type, raw.value.len()) {
            (tlv_types::DOMAIN, _) => Self::Domain(raw.value),
            (tlv_types::STATUS, 1) => Self::Status(DtpStatus(raw.value[0])),
            (tlv_types::TYPE, 1) => Self::Type(DtpType(raw.value[0])),
            (tlv_types::SENDER, 6) => match MacAddr::from_slice(&raw.value) {
                Some(mac) => Self::Sender(mac),
                None => Self::Other(raw),
            },
            _ => Self::Other(raw),
        }
    }

    fn encode(&self) -> RawTlv {
        match self {
            Self::Domain(domain) => RawTlv::new(tlv_types::DOMAIN, domain.clone()),
            Self::Status(status) => RawTlv::new(tlv_types::STATUS, vec![status.0]),
            Self::Type(trunk) => RawTlv::new(tlv_types::TYPE, vec![trunk.0]),
            Self::Sender(mac) => RawTlv::new(tlv_types::SENDER, mac.as_bytes().to_vec()),
            Self::Other(raw) => raw.clone(),
        }
    }
}

/// Complete DTP PDU (without Ethernet/LLC/SNAP headers)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtpPacket {
    pub version: u8,
    pub tlvs: Vec<DtpTlv>,
}

impl DtpPacket {
    pub fn new() -> Self {
        Self {
            version: DTP_VERSION,
            tlvs: Vec::new(),
        }
    }

    pub fn add_tlv(mut self, tlv: DtpTlv) -> Self {
        self.tlvs.push(tlv);
        self
    }

    pub fn with_domain(self, domain: impl Into<Bytes>) -> Self {
        self.add_tlv(DtpTlv::Domain(domain.into()))
    }

    pub fn with_status(self, status: DtpStatus) -> Self {
        self.add_tlv(DtpTlv::Status(status))
    }

    pub fn with_type(self, trunk: DtpType) -> Self {
        self.add_tlv(DtpTlv::Type(trunk))
    }

    pub fn with_sender(self, mac: MacAddr) -> Self {
        self.add_tlv(DtpTlv::Sender(mac))
    }

    /// Raw domain bytes
    pub fn domain(&self) -> Option<&Bytes> {
        self.tlvs.iter().find_map(|tlv| match tlv {
            DtpTlv::Domain(d) => Some(d),
            _ => None,
        })
    }

    /// Domain as text, NUL padding stripped
    pub fn domain_name(&self) -> Option<String> {
        self.domain().map(|d| {
            let end = d.iter().position(|&b| b == 0).unwrap_or(d.len());
            String::from_utf8_lossy(&d[..end]).into_owned()
        })
    }

    pub fn status(&self) -> Option<DtpStatus> {
        self.tlvs.iter().find_map(|tlv| match tlv {
            DtpTlv::Status(s) => Some(*s),
            _ => None,
        })
    }

    pub fn trunk_type(&self) -> Option<DtpType> {
        self.tlvs.iter().find_map(|tlv| match tlv {
            DtpTlv::Type(t) => Some(*t),
            _ => None,
        })
    }

    pub fn sender(&self) -> Option<MacAddr> {
        self.tlvs.iter().find_map(|tlv| match tlv {
            DtpTlv::Sender(m) => Some(*m),
            _ => None,
        })
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let (&version, body) = data
            .split_first()
            .ok_or_else(|| Error::truncated("dtp version", 1, 0))?;
        let tlvs = TlvCodec::DTP
            .parse_all(body)?
            .into_iter()
            .map(DtpTlv::decode)
            .collect();
        Ok(Self { version, tlvs })
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        let raw: Vec<RawTlv> = self.tlvs.iter().map(DtpTlv::encode).collect();
        let body = TlvCodec::DTP.render_all(&raw)?;
        let mut buf = BytesMut::with_capacity(1 + body.len());
        buf.put_u8(self.version);
        buf.put_slice(&body);
        Ok(buf.freeze())
    }

    /// Decode the PDU carried by an 802.3 LLC/SNAP frame
    pub fn from_ethernet(eth: &EthernetHeader<'_>) -> Result<Self> {
        if !eth.is_8023() {
            return Err(Error::parsing(format!(
                "DTP needs 802.3 framing, got ethertype 0x{:04x}",
                eth.ethertype
            )));
        }
        // the length field excludes Ethernet padding
        let len = (eth.ethertype as usize).min(eth.payload.len());
        let (_, snap, body) = LlcSnapFrame::split(&eth.payload[..len])
            .ok_or_else(|| Error::truncated("dtp llc/snap", LlcSnapFrame::HEADER_SIZE, len))?;
        if snap != SnapHeader::DTP {
            return Err(Error::parsing(format!(
                "SNAP protocol 0x{:04x} is not DTP",
                snap.protocol_id.0
            )));
        }
        Self::parse(body)
    }

    /// Complete Ethernet frame to the DTP multicast address
    pub fn to_frame(&self, source: MacAddr) -> Result<Vec<u8>> {
        let snap = LlcSnapFrame::dtp(self.to_bytes()?.to_vec());
        Ok(EthernetFrame::new(DTP_MULTICAST_MAC, source, EtherType::LLC, snap.to_bytes()).to_bytes())
    }
}

impl Default for DtpPacket {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DtpPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DTP v{}", self.version)?;
        if let Some(domain) = self.domain_name() {
            write!(f, " domain \"{}\"", domain)?;
        }
        if let Some(status) = self.status() {
            write!(f, " status {}", status)?;
        }
        if let Some(trunk) = self.trunk_type() {
            write!(f, " trunk {}", trunk)?;
        }
        if let Some(sender) = self.sender() {
            write!(f, " sender {}", sender)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_split() {
        let status = DtpStatus(DtpStatus::TRUNK_DESIRABLE);
        assert_eq!(status.operating_status(), 0x80);
        assert_eq!(status.admin_status(), 0x03);
        assert!(status.is_trunk());
        assert!(!DtpStatus(DtpStatus::ACCESS_AUTO).is_trunk());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(DtpStatus::trunk_on().to_string(), "TRUNK/ON");
        assert_eq!(DtpStatus(DtpStatus::ACCESS_AUTO).to_string(), "ACCESS/AUTO");
    }

    #[test]
    fn test_type_display() {
        assert_eq!(DtpType::dot1q().0, 0xA5);
        assert_eq!(DtpType::dot1q().to_string(), "802.1Q/802.1Q");
        assert_eq!(DtpType(DtpType::ISL_ISL).to_string(), "ISL/ISL");
    }

    #[test]
    fn test_null_padded_domain() {
        let packet = DtpPacket::new().with_domain(&b"lab\0\0\0\0\0"[..]);
        assert_eq!(packet.domain_name().as_deref(), Some("lab"));
        assert_eq!(packet.domain().unwrap().len(), 8);
    }

    #[test]
    fn test_parse_empty_pdu() {
        let packet = DtpPacket::parse(&[0x01]).unwrap();
        assert_eq!(packet.version, 1);
        assert!(packet.tlvs.is_empty());
        assert!(DtpPacket::parse(&[]).is_err());
    }

    #[test]
    fn test_parse_rejects_short_tlv_length() {
        // length 2 is shorter than the TLV header
        assert!(DtpPacket::parse(&[0x01, 0x00, 0x01, 0x00, 0x02]).is_err());
    }
}
