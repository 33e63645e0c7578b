//! EIGRP Packet Structures
//!
//! A 20-byte fixed header followed by a TLV stream with 16-bit type and
//! 16-bit length (the length counts the 4-byte TLV header). The header
//! checksum is the Internet checksum over header and TLVs.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use loki_core::{Error, MacAddr, Result};
use loki_packet::checksum::fill_internet_checksum;
use loki_packet::{EtherType, EthernetFrame, IpProtocol, Ipv4Packet, RawTlv, TlvCodec};
use md5::{Digest, Md5};
use std::fmt;
use std::net::Ipv4Addr;

pub const EIGRP_MULTICAST: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 10);
pub const EIGRP_VERSION: u8 = 2;
pub const HEADER_LEN: usize = 20;
/// TTL of every emitted EIGRP datagram
pub const EIGRP_TTL: u8 = 2;

pub mod flags {
    pub const INIT: u32 = 0x0000_0001;
    pub const COND_RECV: u32 = 0x0000_0008;
}

pub mod tlv_types {
    pub const PARAMETERS: u16 = 0x0001;
    pub const AUTHENTICATION: u16 = 0x0002;
    pub const SEQUENCE: u16 = 0x0003;
    pub const SOFTWARE_VERSION: u16 = 0x0004;
    pub const NEXT_MULTICAST_SEQ: u16 = 0x0005;
    pub const INTERNAL_ROUTE: u16 = 0x0102;
    pub const EXTERNAL_ROUTE: u16 = 0x0103;
}

/// Authentication TLV type field for keyed MD5
const AUTH_MD5: u16 = 2;
const AUTH_VALUE_LEN: usize = 36;

/// EIGRP Opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EigrpOpcode {
    Update = 1,
    Request = 2,
    Query = 3,
    Reply = 4,
    Hello = 5,
    SiaQuery = 10,
    SiaReply = 11,
}

impl EigrpOpcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Update),
            2 => Some(Self::Request),
            3 => Some(Self::Query),
            4 => Some(Self::Reply),
            5 => Some(Self::Hello),
            10 => Some(Self::SiaQuery),
            11 => Some(Self::SiaReply),
            _ => None,
        }
    }
}

impl fmt::Display for EigrpOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Update => "UPDATE",
            Self::Request => "REQUEST",
            Self::Query => "QUERY",
            Self::Reply => "REPLY",
            Self::Hello => "HELLO",
            Self::SiaQuery => "SIA-QUERY",
            Self::SiaReply => "SIA-REPLY",
        };
        f.write_str(name)
    }
}

/// Composite metric carried by route TLVs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteMetric {
    /// Tens of microseconds
    pub delay: u32,
    pub bandwidth: u32,
    /// 24 bits on the wire
    pub mtu: u32,
    pub hop_count: u8,
    pub reliability: u8,
    pub load: u8,
}

impl Default for RouteMetric {
    fn default() -> Self {
        Self {
            delay: 2560,
            bandwidth: 256_000,
            mtu: 1500,
            hop_count: 0,
            reliability: 255,
            load: 1,
        }
    }
}

impl RouteMetric {
    const LEN: usize = 16;

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u32(self.delay);
        buf.put_u32(self.bandwidth);
        buf.put_u32((self.mtu << 8) | self.hop_count as u32);
        buf.put_u8(self.reliability);
        buf.put_u8(self.load);
        buf.put_u16(0);
    }

    /// None when the reserved bytes are set, so the TLV stays raw
    fn get(buf: &mut &[u8]) -> Option<Self> {
        let delay = buf.get_u32();
        let bandwidth = buf.get_u32();
        let mtu_and_hop = buf.get_u32();
        let reliability = buf.get_u8();
        let load = buf.get_u8();
        if buf.get_u16() != 0 {
            return None;
        }
        Some(Self {
            delay,
            bandwidth,
            mtu: mtu_and_hop >> 8,
            hop_count: mtu_and_hop as u8,
            reliability,
            load,
        })
    }
}

/// Destination prefix trailing a route TLV: length byte plus significant octets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutePrefix {
    pub len: u8,
    pub address: Ipv4Addr,
}

impl RoutePrefix {
    fn put(&self, buf: &mut BytesMut) {
        let octets = self.len.div_ceil(8) as usize;
        buf.put_u8(self.len);
        buf.put_slice(&self.address.octets()[..octets.min(4)]);
    }

    fn get(buf: &[u8]) -> Option<Self> {
        let (&len, rest) = buf.split_first()?;
        if len > 32 || rest.len() != len.div_ceil(8) as usize {
            return None;
        }
        let mut octets = [0u8; 4];
        octets[..rest.len()].copy_from_slice(rest);
        Some(Self {
            len,
            address: Ipv4Addr::from(octets),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalRoute {
    pub next_hop: Ipv4Addr,
    pub metric: RouteMetric,
    pub prefix: RoutePrefix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRoute {
    pub next_hop: Ipv4Addr,
    pub originating_router: Ipv4Addr,
    pub originating_as: u32,
    pub tag: u32,
    pub external_metric: u32,
    pub external_protocol: u8,
    pub flags: u8,
    pub metric: RouteMetric,
    pub prefix: RoutePrefix,
}

impl ExternalRoute {
    pub const PROTOCOL_OSPF: u8 = 6;
}

/// One EIGRP TLV; anything not decoded exactly is kept raw
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EigrpTlv {
    Parameters { k: [u8; 5], hold_time: u16 },
    Authentication { key_id: u32, digest: [u8; 16] },
    /// Address list of the conditional receive mechanism, kept opaque
    Sequence(Bytes),
    SoftwareVersion { ios: u16, eigrp: u16 },
    NextMulticastSeq(u32),
    Internal(InternalRoute),
    External(ExternalRoute),
    Other(RawTlv),
}

fn ipv4(buf: &mut &[u8]) -> Ipv4Addr {
    Ipv4Addr::from(buf.get_u32())
}

impl EigrpTlv {
    fn decode(raw: RawTlv) -> Self {
        Self::decode_typed(&raw).unwrap_or(Self::Other(raw))
    }

    fn decode_typed(raw: &RawTlv) -> Option<Self> {
        let mut v: &[u8] = &raw.value;
        let tlv = match (raw.tlv_type, v.len()) {
            (tlv_types::PARAMETERS, 8) => {
                let mut k = [0u8; 5];
                v.copy_to_slice(&mut k);
                if v.get_u8() != 0 {
                    return None;
                }
                Self::Parameters {
                    k,
                    hold_time: v.get_u16(),
                }
            }
            (tlv_types::AUTHENTICATION, AUTH_VALUE_LEN) => {
                if v.get_u16() != AUTH_MD5 || v.get_u16() != 16 {
                    return None;
                }
                let key_id = v.get_u32();
                if v[..12].iter().any(|b| *b != 0) {
                    return None;
                }
                v.advance(12);
                let mut digest = [0u8; 16];
                v.copy_to_slice(&mut digest);
                Self::Authentication { key_id, digest }
            }
            (tlv_types::SEQUENCE, _) => Self::Sequence(raw.value.clone()),
            (tlv_types::SOFTWARE_VERSION, 4) => Self::SoftwareVersion {
                ios: v.get_u16(),
                eigrp: v.get_u16(),
            },
            (tlv_types::NEXT_MULTICAST_SEQ, 4) => Self::NextMulticastSeq(v.get_u32()),
            (tlv_types::INTERNAL_ROUTE, n) if n > 4 + RouteMetric::LEN => {
                let next_hop = ipv4(&mut v);
                let metric = RouteMetric::get(&mut v)?;
                Self::Internal(InternalRoute {
                    next_hop,
                    metric,
                    prefix: RoutePrefix::get(v)?,
                })
            }
            (tlv_types::EXTERNAL_ROUTE, n) if n > 24 + RouteMetric::LEN => {
                let next_hop = ipv4(&mut v);
                let originating_router = ipv4(&mut v);
                let originating_as = v.get_u32();
                let tag = v.get_u32();
                let external_metric = v.get_u32();
                if v.get_u16() != 0 {
                    return None;
                }
                let external_protocol = v.get_u8();
                let flags = v.get_u8();
                let metric = RouteMetric::get(&mut v)?;
                Self::External(ExternalRoute {
                    next_hop,
                    originating_router,
                    originating_as,
                    tag,
                    external_metric,
                    external_protocol,
                    flags,
                    metric,
                    prefix: RoutePrefix::get(v)?,
                })
            }
            _ => return None,
        };
        Some(tlv)
    }

    fn encode(&self) -> RawTlv {
        let mut v = BytesMut::new();
        let tlv_type = match self {
            Self::Parameters { k, hold_time } => {
                v.put_slice(k);
                v.put_u8(0);
                v.put_u16(*hold_time);
                tlv_types::PARAMETERS
            }
            Self::Authentication { key_id, digest } => {
                v.put_u16(AUTH_MD5);
                v.put_u16(16);
                v.put_u32(*key_id);
                v.put_bytes(0, 12);
                v.put_slice(digest);
                tlv_types::AUTHENTICATION
            }
            Self::Sequence(addresses) => {
                v.put_slice(addresses);
                tlv_types::SEQUENCE
            }
            Self::SoftwareVersion { ios, eigrp } => {
                v.put_u16(*ios);
                v.put_u16(*eigrp);
                tlv_types::SOFTWARE_VERSION
            }
            Self::NextMulticastSeq(seq) => {
                v.put_u32(*seq);
                tlv_types::NEXT_MULTICAST_SEQ
            }
            Self::Internal(route) => {
                v.put_slice(&route.next_hop.octets());
                route.metric.put(&mut v);
                route.prefix.put(&mut v);
                tlv_types::INTERNAL_ROUTE
            }
            Self::External(route) => {
                v.put_slice(&route.next_hop.octets());
                v.put_slice(&route.originating_router.octets());
                v.put_u32(route.originating_as);
                v.put_u32(route.tag);
                v.put_u32(route.external_metric);
                v.put_u16(0);
                v.put_u8(route.external_protocol);
                v.put_u8(route.flags);
                route.metric.put(&mut v);
                route.prefix.put(&mut v);
                tlv_types::EXTERNAL_ROUTE
            }
            Self::Other(raw) => return raw.clone(),
        };
        RawTlv::new(tlv_type, v.freeze())
    }
}

/// A complete EIGRP packet (without the IP header)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EigrpPacket {
    pub version: u8,
    pub opcode: EigrpOpcode,
    pub flags: u32,
    pub sequence: u32,
    pub ack: u32,
    pub asn: u32,
    pub tlvs: Vec<EigrpTlv>,
}

impl EigrpPacket {
    pub fn new(opcode: EigrpOpcode, asn: u32) -> Self {
        Self {
            version: EIGRP_VERSION,
            opcode,
            flags: 0,
            sequence: 0,
            ack: 0,
            asn,
            tlvs: Vec::new(),
        }
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_sequence(mut self, seq: u32) -> Self {
        self.sequence = seq;
        self
    }

    pub fn with_ack(mut self, ack: u32) -> Self {
        self.ack = ack;
        self
    }

    pub fn add_tlv(mut self, tlv: EigrpTlv) -> Self {
        self.tlvs.push(tlv);
        self
    }

    /// Beacon hello: K1 = K3 = 1 and a 12.4 software version
    pub fn hello(asn: u32, hold_time: u16) -> Self {
        Self::new(EigrpOpcode::Hello, asn)
            .add_tlv(EigrpTlv::Parameters {
                k: [1, 0, 1, 0, 0],
                hold_time,
            })
            .add_tlv(EigrpTlv::SoftwareVersion {
                ios: 0x0c04,
                eigrp: 0x0102,
            })
    }

    /// Empty hello acknowledging `seq`
    pub fn ack_for(asn: u32, seq: u32) -> Self {
        Self::new(EigrpOpcode::Hello, asn).with_ack(seq)
    }

    /// Hello with every K value at 255, which tears the adjacency down
    pub fn goodbye(asn: u32, hold_time: u16) -> Self {
        Self::new(EigrpOpcode::Hello, asn).add_tlv(EigrpTlv::Parameters {
            k: [255; 5],
            hold_time,
        })
    }

    pub fn is_hello(&self) -> bool {
        self.opcode == EigrpOpcode::Hello
    }

    pub fn hold_time(&self) -> Option<u16> {
        self.tlvs.iter().find_map(|tlv| match tlv {
            EigrpTlv::Parameters { hold_time, .. } => Some(*hold_time),
            _ => None,
        })
    }

    pub fn routes(&self) -> impl Iterator<Item = &InternalRoute> {
        self.tlvs.iter().filter_map(|tlv| match tlv {
            EigrpTlv::Internal(route) => Some(route),
            _ => None,
        })
    }

    fn digest(&self) -> Option<[u8; 16]> {
        self.tlvs.iter().find_map(|tlv| match tlv {
            EigrpTlv::Authentication { digest, .. } => Some(*digest),
            _ => None,
        })
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(Error::truncated("eigrp header", HEADER_LEN, data.len()));
        }
        let mut header = &data[..HEADER_LEN];
        let version = header.get_u8();
        let opcode = header.get_u8();
        let opcode = EigrpOpcode::from_u8(opcode)
            .ok_or_else(|| Error::parsing(format!("unknown EIGRP opcode {}", opcode)))?;
        let _checksum = header.get_u16();
        let flags = header.get_u32();
        let sequence = header.get_u32();
        let ack = header.get_u32();
        let asn = header.get_u32();

        let tlvs = TlvCodec::EIGRP
            .parse_all(&data[HEADER_LEN..])?
            .into_iter()
            .map(EigrpTlv::decode)
            .collect();

        Ok(Self {
            version,
            opcode,
            flags,
            sequence,
            ack,
            asn,
            tlvs,
        })
    }

    /// Header and TLVs with a zero checksum field
    fn render(&self) -> Result<BytesMut> {
        let raw: Vec<RawTlv> = self.tlvs.iter().map(EigrpTlv::encode).collect();
        let body = TlvCodec::EIGRP.render_all(&raw)?;

        let mut buf = BytesMut::with_capacity(HEADER_LEN + body.len());
        buf.put_u8(self.version);
        buf.put_u8(self.opcode as u8);
        buf.put_u16(0);
        buf.put_u32(self.flags);
        buf.put_u32(self.sequence);
        buf.put_u32(self.ack);
        buf.put_u32(self.asn);
        buf.put_slice(&body);
        Ok(buf)
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = self.render()?;
        fill_internet_checksum(&mut buf, 2);
        Ok(buf.freeze())
    }

    /// MD5 over key, header and TLVs, computed with a zero checksum and a
    /// zero digest field
    fn keyed_digest(&self, key: &[u8]) -> Result<[u8; 16]> {
        let mut blank = self.clone();
        for tlv in &mut blank.tlvs {
            if let EigrpTlv::Authentication { digest, .. } = tlv {
                *digest = [0; 16];
            }
        }
        let mut hasher = Md5::new();
        hasher.update(key);
        hasher.update(&blank.render()?);
        Ok(hasher.finalize().into())
    }

    /// Put a keyed MD5 authentication TLV first, replacing any existing one
    pub fn authenticate(mut self, key_id: u32, key: &[u8]) -> Result<Self> {
        self.tlvs
            .retain(|tlv| !matches!(tlv, EigrpTlv::Authentication { .. }));
        self.tlvs.insert(
            0,
            EigrpTlv::Authentication {
                key_id,
                digest: [0; 16],
            },
        );
        let digest = self.keyed_digest(key)?;
        self.tlvs[0] = EigrpTlv::Authentication { key_id, digest };
        Ok(self)
    }

    pub fn is_authenticated(&self) -> bool {
        self.digest().is_some()
    }

    /// True when the packet carries an MD5 digest matching `key`
    pub fn verify(&self, key: &[u8]) -> Result<bool> {
        match self.digest() {
            Some(digest) => Ok(self.keyed_digest(key)? == digest),
            None => Ok(false),
        }
    }

    /// Wrap in IPv4 (ToS internetwork control, TTL 2) and Ethernet
    pub fn to_frame(
        &self,
        src_mac: MacAddr,
        dst_mac: MacAddr,
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
    ) -> Result<Vec<u8>> {
        let ip = Ipv4Packet::link_local(src_ip, dst_ip, IpProtocol::EIGRP, self.to_bytes()?.to_vec())
            .with_ttl(EIGRP_TTL);
        Ok(EthernetFrame::new(dst_mac, src_mac, EtherType::IPv4, ip.to_bytes()).to_bytes())
    }
}

impl fmt::Display for EigrpPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EIGRP {} as {} seq {} ack {}",
            self.opcode, self.asn, self.sequence, self.ack
        )?;
        if let Some(hold) = self.hold_time() {
            write!(f, " hold {}", hold)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loki_core::Frame;
    use loki_packet::checksum::internet_checksum;

    fn route() -> InternalRoute {
        InternalRoute {
            next_hop: Ipv4Addr::UNSPECIFIED,
            metric: RouteMetric::default(),
            prefix: RoutePrefix {
                len: 20,
                address: Ipv4Addr::new(172, 16, 16, 0),
            },
        }
    }

    fn generated_prefix(rng: &mut impl rand::Rng) -> RoutePrefix {
        let len: u8 = rng.gen_range(0..=32);
        let mut octets: [u8; 4] = rng.gen();
        for octet in octets.iter_mut().skip(len.div_ceil(8) as usize) {
            *octet = 0;
        }
        RoutePrefix {
            len,
            address: Ipv4Addr::from(octets),
        }
    }

    fn generated_metric(rng: &mut impl rand::Rng) -> RouteMetric {
        RouteMetric {
            delay: rng.gen(),
            bandwidth: rng.gen(),
            mtu: rng.gen_range(0..1 << 24),
            hop_count: rng.gen(),
            reliability: rng.gen(),
            load: rng.gen(),
        }
    }

    fn generated_tlv(rng: &mut impl rand::Rng) -> EigrpTlv {
        match rng.gen_range(0..8) {
            0 => EigrpTlv::Parameters {
                k: rng.gen(),
                hold_time: rng.gen(),
            },
            1 => EigrpTlv::Authentication {
                key_id: rng.gen(),
                digest: rng.gen(),
            },
            2 => {
                let len = rng.gen_range(0..24);
                let addresses: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
                EigrpTlv::Sequence(addresses.into())
            }
            3 => EigrpTlv::SoftwareVersion {
                ios: rng.gen(),
                eigrp: rng.gen(),
            },
            4 => EigrpTlv::NextMulticastSeq(rng.gen()),
            5 => EigrpTlv::Internal(InternalRoute {
                next_hop: Ipv4Addr::from(rng.gen::<u32>()),
                metric: generated_metric(rng),
                prefix: generated_prefix(rng),
            }),
            6 => EigrpTlv::External(ExternalRoute {
                next_hop: Ipv4Addr::from(rng.gen::<u32>()),
                originating_router: Ipv4Addr::from(rng.gen::<u32>()),
                originating_as: rng.gen(),
                tag: rng.gen(),
                external_metric: rng.gen(),
                external_protocol: rng.gen(),
                flags: rng.gen(),
                metric: generated_metric(rng),
                prefix: generated_prefix(rng),
            }),
            _ => {
                let len = rng.gen_range(0..16);
                let value: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
                EigrpTlv::Other(RawTlv::new(0x0ff0, value))
            }
        }
    }

    #[test]
    fn test_generated_packets_round_trip() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let opcodes = [
            EigrpOpcode::Update,
            EigrpOpcode::Query,
            EigrpOpcode::Reply,
            EigrpOpcode::Hello,
            EigrpOpcode::SiaReply,
        ];
        let mut rng = StdRng::seed_from_u64(88);
        for _ in 0..300 {
            let mut packet = EigrpPacket::new(opcodes[rng.gen_range(0..opcodes.len())], rng.gen())
                .with_flags(rng.gen())
                .with_sequence(rng.gen())
                .with_ack(rng.gen());
            for _ in 0..rng.gen_range(0..6) {
                packet = packet.add_tlv(generated_tlv(&mut rng));
            }
            let bytes = packet.to_bytes().unwrap();
            assert_eq!(internet_checksum(&bytes), 0);
            let parsed = EigrpPacket::parse(&bytes).unwrap();
            assert_eq!(parsed, packet);
            assert_eq!(parsed.to_bytes().unwrap(), bytes);
        }
    }

    #[test]
    fn test_hello_layout() {
        let bytes = EigrpPacket::hello(100, 15).to_bytes().unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + 12 + 8);
        assert_eq!(&bytes[0..2], &[EIGRP_VERSION, 5]);
        assert_eq!(&bytes[16..20], &100u32.to_be_bytes());
        assert_eq!(
            &bytes[20..32],
            &[0x00, 0x01, 0x00, 0x0c, 1, 0, 1, 0, 0, 0, 0x00, 0x0f]
        );
        assert_eq!(&bytes[32..40], &[0x00, 0x04, 0x00, 0x08, 0x0c, 0x04, 0x01, 0x02]);
        assert_eq!(internet_checksum(&bytes), 0);
    }

    #[test]
    fn test_render_reproduces_wire_bytes() {
        let packet = EigrpPacket::new(EigrpOpcode::Update, 1)
            .with_flags(flags::INIT)
            .with_sequence(7)
            .add_tlv(EigrpTlv::NextMulticastSeq(3))
            .add_tlv(EigrpTlv::Internal(route()))
            .add_tlv(EigrpTlv::External(ExternalRoute {
                next_hop: Ipv4Addr::UNSPECIFIED,
                originating_router: Ipv4Addr::new(10, 1, 1, 1),
                originating_as: 65000,
                tag: 0,
                external_metric: 20,
                external_protocol: ExternalRoute::PROTOCOL_OSPF,
                flags: 0,
                metric: RouteMetric::default(),
                prefix: RoutePrefix {
                    len: 32,
                    address: Ipv4Addr::new(192, 0, 2, 1),
                },
            }))
            .add_tlv(EigrpTlv::Other(RawTlv::new(0x0077, vec![1, 2, 3])));
        let wire = packet.to_bytes().unwrap();
        let parsed = EigrpPacket::parse(&wire).unwrap();
        assert_eq!(parsed, packet);
        assert_eq!(parsed.to_bytes().unwrap(), wire);
        assert_eq!(parsed.routes().next().unwrap().prefix.len, 20);
    }

    #[test]
    fn test_internal_route_prefix_octets() {
        let raw = EigrpTlv::Internal(route()).encode();
        // next hop, metric, prefix length and three significant octets
        assert_eq!(raw.value.len(), 4 + 16 + 1 + 3);
        assert_eq!(&raw.value[20..], &[20, 172, 16, 16]);
        assert_eq!(EigrpTlv::decode(raw.clone()), EigrpTlv::Internal(route()));

        let mut short = raw.value.to_vec();
        short.pop();
        let odd = RawTlv::new(tlv_types::INTERNAL_ROUTE, short);
        assert_eq!(EigrpTlv::decode(odd.clone()), EigrpTlv::Other(odd));
    }

    #[test]
    fn test_parse_errors() {
        assert!(EigrpPacket::parse(&[2, 5, 0]).is_err());
        let mut bytes = EigrpPacket::hello(1, 15).to_bytes().unwrap().to_vec();
        bytes[1] = 9;
        assert!(EigrpPacket::parse(&bytes).is_err());
        let mut bytes = EigrpPacket::hello(1, 15).to_bytes().unwrap().to_vec();
        bytes.truncate(bytes.len() - 2);
        assert!(EigrpPacket::parse(&bytes).is_err());
    }

    #[test]
    fn test_md5_authentication() {
        let signed = EigrpPacket::hello(100, 15).authenticate(1, b"secret").unwrap();
        assert!(matches!(
            signed.tlvs[0],
            EigrpTlv::Authentication { key_id: 1, .. }
        ));
        let wire = signed.to_bytes().unwrap();
        assert_eq!(u16::from_be_bytes([wire[22], wire[23]]), 40);

        let received = EigrpPacket::parse(&wire).unwrap();
        assert!(received.verify(b"secret").unwrap());
        assert!(!received.verify(b"guess").unwrap());

        let mut tampered = received.clone();
        tampered.sequence = 9;
        assert!(!tampered.verify(b"secret").unwrap());

        assert!(!EigrpPacket::hello(100, 15).verify(b"secret").unwrap());
        // signing twice keeps a single authentication TLV
        let resigned = signed.authenticate(2, b"other").unwrap();
        assert_eq!(resigned.tlvs.len(), 3);
    }

    #[test]
    fn test_goodbye_and_ack() {
        let goodbye = EigrpPacket::goodbye(10, 15);
        assert!(goodbye.is_hello());
        assert_eq!(
            goodbye.tlvs[0],
            EigrpTlv::Parameters {
                k: [255; 5],
                hold_time: 15
            }
        );
        let ack = EigrpPacket::ack_for(10, 42);
        assert_eq!(ack.ack, 42);
        assert!(ack.tlvs.is_empty());
        assert_eq!(ack.to_string(), "EIGRP HELLO as 10 seq 0 ack 42");
    }

    #[test]
    fn test_frame() {
        let src = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        let bytes = EigrpPacket::hello(1, 15)
            .to_frame(
                src,
                MacAddr::ipv4_multicast(EIGRP_MULTICAST),
                Ipv4Addr::new(10, 0, 0, 1),
                EIGRP_MULTICAST,
            )
            .unwrap();
        let frame = Frame::new(bytes);
        let ip = frame.ipv4().unwrap();
        assert_eq!(ip.protocol, 88);
        assert_eq!(ip.tos, 0xc0);
        assert_eq!(ip.ttl, EIGRP_TTL);
        assert_eq!(ip.dst, EIGRP_MULTICAST);
        assert_eq!(EigrpPacket::parse(ip.payload).unwrap(), EigrpPacket::hello(1, 15));
    }
}
