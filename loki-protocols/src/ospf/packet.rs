//! OSPF Packet Structures

use bytes::{Buf, BufMut, Bytes};
use loki_core::{Error, Result};
use loki_packet::checksum::{fill_internet_checksum, fletcher_checksum, OSPF_LSA_CHECKSUM_OFFSET};
use std::net::Ipv4Addr;

pub const OSPF_PROTOCOL: u8 = 89;
pub const OSPF_VERSION: u8 = 2;

/// AllSPFRouters multicast address (224.0.0.5)
pub const OSPF_MULTICAST_ALL_SPF: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 5);

pub const HEADER_LEN: usize = 24;
pub const LSA_HEADER_LEN: usize = 20;

/// Age stamped on every advertisement this module originates
pub const DEFAULT_LSA_AGE: u16 = 92;

/// Hello / DBD option bits
pub mod options {
    pub const TOS: u8 = 0x01;
    pub const EXTERNAL: u8 = 0x02;
    pub const LLS: u8 = 0x10;
    pub const DEMAND_CIRCUITS: u8 = 0x20;
    pub const ZERO: u8 = 0x40;
}

/// Database-description flag bits
pub mod dbd_flags {
    pub const INIT: u8 = 0x04;
    pub const MORE: u8 = 0x02;
    pub const MASTER: u8 = 0x01;
}

/// Router-LSA link types
pub mod link_types {
    pub const POINT_TO_POINT: u8 = 1;
    pub const TRANSIT: u8 = 2;
    pub const STUB: u8 = 3;
    pub const VIRTUAL: u8 = 4;
}

/// Authentication types
pub mod auth_types {
    pub const NONE: u16 = 0;
    pub const SIMPLE: u16 = 1;
}

/// OSPF Packet Types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OspfPacketType {
    Hello = 1,
    DatabaseDescription = 2,
    LinkStateRequest = 3,
    LinkStateUpdate = 4,
    LinkStateAck = 5,
}

impl OspfPacketType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Hello),
            2 => Some(Self::DatabaseDescription),
            3 => Some(Self::LinkStateRequest),
            4 => Some(Self::LinkStateUpdate),
            5 => Some(Self::LinkStateAck),
            _ => None,
        }
    }
}

/// OSPF LSA Types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OspfLsaType {
    RouterLsa = 1,
    NetworkLsa = 2,
    SummaryLsa = 3,
    AsbrSummaryLsa = 4,
    ExternalLsa = 5,
}

impl OspfLsaType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::RouterLsa),
            2 => Some(Self::NetworkLsa),
            3 => Some(Self::SummaryLsa),
            4 => Some(Self::AsbrSummaryLsa),
            5 => Some(Self::ExternalLsa),
            _ => None,
        }
    }
}

fn need(buf: &[u8], len: usize, what: &str) -> Result<()> {
    if buf.len() < len {
        return Err(Error::truncated(what, len, buf.len()));
    }
    Ok(())
}

fn get_addr(buf: &mut &[u8]) -> Ipv4Addr {
    Ipv4Addr::from(buf.get_u32())
}

/// Common OSPF header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OspfHeader {
    pub version: u8,
    pub packet_type: OspfPacketType,
    pub router_id: Ipv4Addr,
    pub area: u32,
    pub auth_type: u16,
    pub auth_data: u64,
}

impl OspfHeader {
    pub fn new(packet_type: OspfPacketType, router_id: Ipv4Addr, area: u32) -> Self {
        Self {
            version: OSPF_VERSION,
            packet_type,
            router_id,
            area,
            auth_type: auth_types::NONE,
            auth_data: 0,
        }
    }

    pub fn with_auth(mut self, auth_type: u16, auth_data: u64) -> Self {
        self.auth_type = auth_type;
        self.auth_data = auth_data;
        self
    }
}

/// OSPF LSA Header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OspfLsaHeader {
    pub age: u16,
    pub options: u8,
    pub ls_type: u8,
    pub link_state_id: Ipv4Addr,
    pub advertising_router: Ipv4Addr,
    pub sequence: u32,
    pub checksum: u16,
    pub length: u16,
}

impl OspfLsaHeader {
    pub fn new(
        lsa_type: OspfLsaType,
        link_state_id: Ipv4Addr,
        advertising_router: Ipv4Addr,
        sequence: u32,
    ) -> Self {
        Self {
            age: DEFAULT_LSA_AGE,
            options: options::EXTERNAL,
            ls_type: lsa_type as u8,
            link_state_id,
            advertising_router,
            sequence,
            checksum: 0,
            length: LSA_HEADER_LEN as u16,
        }
    }

    pub fn lsa_type(&self) -> Option<OspfLsaType> {
        OspfLsaType::from_u8(self.ls_type)
    }

    /// Writes the stored fields verbatim
    pub fn write(&self, out: &mut impl BufMut) {
        out.put_u16(self.age);
        out.put_u8(self.options);
        out.put_u8(self.ls_type);
        out.put_slice(&self.link_state_id.octets());
        out.put_slice(&self.advertising_router.octets());
        out.put_u32(self.sequence);
        out.put_u16(self.checksum);
        out.put_u16(self.length);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(LSA_HEADER_LEN);
        self.write(&mut bytes);
        bytes
    }

    /// Copy with length and checksum set as for an advertisement without body
    pub fn sealed(&self) -> Self {
        let mut sealed = Self {
            checksum: 0,
            length: LSA_HEADER_LEN as u16,
            ..self.clone()
        };
        let mut bytes = sealed.to_bytes();
        sealed.checksum = fletcher_checksum(&mut bytes[2..], OSPF_LSA_CHECKSUM_OFFSET);
        sealed
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        need(data, LSA_HEADER_LEN, "OSPF LSA header")?;
        let mut buf = data;
        Ok(Self {
            age: buf.get_u16(),
            options: buf.get_u8(),
            ls_type: buf.get_u8(),
            link_state_id: get_addr(&mut buf),
            advertising_router: get_addr(&mut buf),
            sequence: buf.get_u32(),
            checksum: buf.get_u16(),
            length: buf.get_u16(),
        })
    }
}

/// One link of a router-LSA
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterLink {
    pub link_id: Ipv4Addr,
    pub link_data: Ipv4Addr,
    pub link_type: u8,
    pub metric: u16,
    /// Additional `(tos, metric)` pairs
    pub tos: Vec<(u8, u16)>,
}

impl RouterLink {
    pub fn new(link_id: Ipv4Addr, link_data: Ipv4Addr, link_type: u8, metric: u16) -> Self {
        Self {
            link_id,
            link_data,
            link_type,
            metric,
            tos: Vec::new(),
        }
    }
}

/// Type-specific body of an advertisement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LsaBody {
    Router {
        flags: u16,
        links: Vec<RouterLink>,
    },
    Network {
        mask: Ipv4Addr,
        routers: Vec<Ipv4Addr>,
    },
    /// Type 3 and type 4 summaries; metrics are `(tos, 24-bit metric)`
    Summary {
        mask: Ipv4Addr,
        metrics: Vec<(u8, u32)>,
    },
    External {
        mask: Ipv4Addr,
        /// E bit and TOS
        flags: u8,
        metric: u32,
        forwarding: Ipv4Addr,
        tag: u32,
    },
    Unknown(Bytes),
}

impl LsaBody {
    fn write(&self, out: &mut Vec<u8>) {
        match self {
            LsaBody::Router { flags, links } => {
                out.put_u16(*flags);
                out.put_u16(links.len() as u16);
                for link in links {
                    out.put_slice(&link.link_id.octets());
                    out.put_slice(&link.link_data.octets());
                    out.put_u8(link.link_type);
                    out.put_u8(link.tos.len() as u8);
                    out.put_u16(link.metric);
                    for (tos, metric) in &link.tos {
                        out.put_u8(*tos);
                        out.put_u8(0);
                        out.put_u16(*metric);
                    }
                }
            }
            LsaBody::Network { mask, routers } => {
                out.put_slice(&mask.octets());
                for router in routers {
                    out.put_slice(&router.octets());
                }
            }
            LsaBody::Summary { mask, metrics } => {
                out.put_slice(&mask.octets());
                for (tos, metric) in metrics {
                    out.put_u32(((*tos as u32) << 24) | (metric & 0x00ff_ffff));
                }
            }
            LsaBody::External {
                mask,
                flags,
                metric,
                forwarding,
                tag,
            } => {
                out.put_slice(&mask.octets());
                out.put_u32(((*flags as u32) << 24) | (metric & 0x00ff_ffff));
                out.put_slice(&forwarding.octets());
                out.put_u32(*tag);
            }
            LsaBody::Unknown(data) => out.put_slice(data),
        }
    }

    fn parse(ls_type: u8, data: &[u8]) -> Result<Self> {
        let mut buf = data;
        match OspfLsaType::from_u8(ls_type) {
            Some(OspfLsaType::RouterLsa) => {
                need(buf, 4, "router-LSA")?;
                let flags = buf.get_u16();
                let count = buf.get_u16();
                let mut links = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    need(buf, 12, "router-LSA link")?;
                    let link_id = get_addr(&mut buf);
                    let link_data = get_addr(&mut buf);
                    let link_type = buf.get_u8();
                    let tos_count = buf.get_u8() as usize;
                    let metric = buf.get_u16();
                    need(buf, tos_count * 4, "router-LSA TOS")?;
                    let tos = (0..tos_count)
                        .map(|_| {
                            let tos = buf.get_u8();
                            buf.advance(1);
                            (tos, buf.get_u16())
                        })
                        .collect();
                    links.push(RouterLink {
                        link_id,
                        link_data,
                        link_type,
                        metric,
                        tos,
                    });
                }
                Ok(LsaBody::Router { flags, links })
            }
            Some(OspfLsaType::NetworkLsa) => {
                need(buf, 4, "network-LSA")?;
                let mask = get_addr(&mut buf);
                let mut routers = Vec::new();
                while buf.remaining() >= 4 {
                    routers.push(get_addr(&mut buf));
                }
                Ok(LsaBody::Network { mask, routers })
            }
            Some(OspfLsaType::SummaryLsa) | Some(OspfLsaType::AsbrSummaryLsa) => {
                need(buf, 4, "summary-LSA")?;
                let mask = get_addr(&mut buf);
                let mut metrics = Vec::new();
                while buf.remaining() >= 4 {
                    let word = buf.get_u32();
                    metrics.push(((word >> 24) as u8, word & 0x00ff_ffff));
                }
                Ok(LsaBody::Summary { mask, metrics })
            }
            Some(OspfLsaType::ExternalLsa) => {
                need(buf, 16, "AS-external-LSA")?;
                let mask = get_addr(&mut buf);
                let word = buf.get_u32();
                Ok(LsaBody::External {
                    mask,
                    flags: (word >> 24) as u8,
                    metric: word & 0x00ff_ffff,
                    forwarding: get_addr(&mut buf),
                    tag: buf.get_u32(),
                })
            }
            None => Ok(LsaBody::Unknown(Bytes::copy_from_slice(data))),
        }
    }
}

/// OSPF LSA (Link State Advertisement)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OspfLsa {
    pub header: OspfLsaHeader,
    pub body: LsaBody,
}

impl OspfLsa {
    pub fn new(header: OspfLsaHeader, body: LsaBody) -> Self {
        Self { header, body }
    }

    /// Router-LSA originated by `router_id` for itself
    pub fn router(router_id: Ipv4Addr, sequence: u32, links: Vec<RouterLink>) -> Self {
        Self::new(
            OspfLsaHeader::new(OspfLsaType::RouterLsa, router_id, router_id, sequence),
            LsaBody::Router { flags: 0, links },
        )
    }

    /// Serialize with the length and Fletcher checksum recomputed
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.header.to_bytes();
        self.body.write(&mut bytes);
        let length = bytes.len() as u16;
        bytes[18..20].copy_from_slice(&length.to_be_bytes());
        fletcher_checksum(&mut bytes[2..], OSPF_LSA_CHECKSUM_OFFSET);
        bytes
    }

    /// Parse one advertisement, returning the bytes that follow it
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8])> {
        let header = OspfLsaHeader::parse(data)?;
        let length = header.length as usize;
        if length < LSA_HEADER_LEN {
            return Err(Error::parsing(format!("OSPF LSA length {} too short", length)));
        }
        need(data, length, "OSPF LSA")?;
        let body = LsaBody::parse(header.ls_type, &data[LSA_HEADER_LEN..length])?;
        Ok((Self { header, body }, &data[length..]))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OspfHello {
    pub network_mask: Ipv4Addr,
    pub hello_interval: u16,
    pub options: u8,
    pub priority: u8,
    pub dead_interval: u32,
    pub designated_router: Ipv4Addr,
    pub backup_router: Ipv4Addr,
    pub neighbors: Vec<Ipv4Addr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OspfDatabaseDescription {
    pub mtu: u16,
    pub options: u8,
    pub flags: u8,
    pub sequence: u32,
    pub lsa_headers: Vec<OspfLsaHeader>,
}

impl OspfDatabaseDescription {
    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OspfLsRequest {
    pub ls_type: u32,
    pub link_state_id: Ipv4Addr,
    pub advertising_router: Ipv4Addr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OspfBody {
    Hello(OspfHello),
    DatabaseDescription(OspfDatabaseDescription),
    LinkStateRequest(Vec<OspfLsRequest>),
    LinkStateUpdate(Vec<OspfLsa>),
    LinkStateAck(Vec<OspfLsaHeader>),
}

impl OspfBody {
    pub fn packet_type(&self) -> OspfPacketType {
        match self {
            OspfBody::Hello(_) => OspfPacketType::Hello,
            OspfBody::DatabaseDescription(_) => OspfPacketType::DatabaseDescription,
            OspfBody::LinkStateRequest(_) => OspfPacketType::LinkStateRequest,
            OspfBody::LinkStateUpdate(_) => OspfPacketType::LinkStateUpdate,
            OspfBody::LinkStateAck(_) => OspfPacketType::LinkStateAck,
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        match self {
            OspfBody::Hello(hello) => {
                out.put_slice(&hello.network_mask.octets());
                out.put_u16(hello.hello_interval);
                out.put_u8(hello.options);
                out.put_u8(hello.priority);
                out.put_u32(hello.dead_interval);
                out.put_slice(&hello.designated_router.octets());
                out.put_slice(&hello.backup_router.octets());
                for neighbor in &hello.neighbors {
                    out.put_slice(&neighbor.octets());
                }
            }
            OspfBody::DatabaseDescription(dbd) => {
                out.put_u16(dbd.mtu);
                out.put_u8(dbd.options);
                out.put_u8(dbd.flags);
                out.put_u32(dbd.sequence);
                for header in &dbd.lsa_headers {
                    header.write(out);
                }
            }
            OspfBody::LinkStateRequest(requests) => {
                for request in requests {
                    out.put_u32(request.ls_type);
                    out.put_slice(&request.link_state_id.octets());
                    out.put_slice(&request.advertising_router.octets());
                }
            }
            OspfBody::LinkStateUpdate(lsas) => {
                out.put_u32(lsas.len() as u32);
                for lsa in lsas {
                    out.put_slice(&lsa.to_bytes());
                }
            }
            OspfBody::LinkStateAck(headers) => {
                for header in headers {
                    header.write(out);
                }
            }
        }
    }

    fn parse(packet_type: OspfPacketType, data: &[u8]) -> Result<Self> {
        let mut buf = data;
        match packet_type {
            OspfPacketType::Hello => {
                need(buf, 20, "OSPF hello")?;
                let network_mask = get_addr(&mut buf);
                let hello_interval = buf.get_u16();
                let options = buf.get_u8();
                let priority = buf.get_u8();
                let dead_interval = buf.get_u32();
                let designated_router = get_addr(&mut buf);
                let backup_router = get_addr(&mut buf);
                let mut neighbors = Vec::new();
                while buf.remaining() >= 4 {
                    neighbors.push(get_addr(&mut buf));
                }
                Ok(OspfBody::Hello(OspfHello {
                    network_mask,
                    hello_interval,
                    options,
                    priority,
                    dead_interval,
                    designated_router,
                    backup_router,
                    neighbors,
                }))
            }
            OspfPacketType::DatabaseDescription => {
                need(buf, 8, "OSPF database description")?;
                let mtu = buf.get_u16();
                let options = buf.get_u8();
                let flags = buf.get_u8();
                let sequence = buf.get_u32();
                let mut lsa_headers = Vec::new();
                while buf.remaining() >= LSA_HEADER_LEN {
                    lsa_headers.push(OspfLsaHeader::parse(buf)?);
                    buf.advance(LSA_HEADER_LEN);
                }
                Ok(OspfBody::DatabaseDescription(OspfDatabaseDescription {
                    mtu,
                    options,
                    flags,
                    sequence,
                    lsa_headers,
                }))
            }
            OspfPacketType::LinkStateRequest => {
                let mut requests = Vec::new();
                while buf.remaining() >= 12 {
                    requests.push(OspfLsRequest {
                        ls_type: buf.get_u32(),
                        link_state_id: get_addr(&mut buf),
                        advertising_router: get_addr(&mut buf),
                    });
                }
                Ok(OspfBody::LinkStateRequest(requests))
            }
            OspfPacketType::LinkStateUpdate => {
                need(buf, 4, "OSPF link state update")?;
                let count = buf.get_u32();
                let mut lsas = Vec::new();
                for _ in 0..count {
                    if buf.is_empty() {
                        break;
                    }
                    let (lsa, rest) = OspfLsa::parse(buf)?;
                    lsas.push(lsa);
                    buf = rest;
                }
                Ok(OspfBody::LinkStateUpdate(lsas))
            }
            OspfPacketType::LinkStateAck => {
                let mut headers = Vec::new();
                while buf.remaining() >= LSA_HEADER_LEN {
                    headers.push(OspfLsaHeader::parse(buf)?);
                    buf.advance(LSA_HEADER_LEN);
                }
                Ok(OspfBody::LinkStateAck(headers))
            }
        }
    }
}

/// A complete OSPF packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OspfPacket {
    pub header: OspfHeader,
    pub body: OspfBody,
}

impl OspfPacket {
    /// Build a packet; the header type always follows the body
    pub fn new(mut header: OspfHeader, body: OspfBody) -> Self {
        header.packet_type = body.packet_type();
        Self { header, body }
    }

    /// Serialize with length and checksum computed over the whole packet
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + 64);
        bytes.put_u8(self.header.version);
        bytes.put_u8(self.header.packet_type as u8);
        bytes.put_u16(0);
        bytes.put_slice(&self.header.router_id.octets());
        bytes.put_u32(self.header.area);
        bytes.put_u16(0);
        bytes.put_u16(self.header.auth_type);
        bytes.put_u64(self.header.auth_data);
        self.body.write(&mut bytes);

        let length = bytes.len() as u16;
        bytes[2..4].copy_from_slice(&length.to_be_bytes());
        fill_internet_checksum(&mut bytes, 12);
        bytes
    }

    /// Parse only the fixed header
    pub fn parse_header(data: &[u8]) -> Result<OspfHeader> {
        need(data, HEADER_LEN, "OSPF header")?;
        let mut buf = data;
        let version = buf.get_u8();
        let raw_type = buf.get_u8();
        let packet_type = OspfPacketType::from_u8(raw_type)
            .ok_or_else(|| Error::parsing(format!("Unknown OSPF packet type {}", raw_type)))?;
        buf.advance(2);
        let router_id = get_addr(&mut buf);
        let area = buf.get_u32();
        buf.advance(2);
        Ok(OspfHeader {
            version,
            packet_type,
            router_id,
            area,
            auth_type: buf.get_u16(),
            auth_data: buf.get_u64(),
        })
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = Self::parse_header(data)?;
        let length = u16::from_be_bytes([data[2], data[3]]) as usize;
        let end = if (HEADER_LEN..=data.len()).contains(&length) {
            length
        } else {
            data.len()
        };
        let body = OspfBody::parse(header.packet_type, &data[HEADER_LEN..end])?;
        Ok(Self { header, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loki_packet::checksum::{fletcher_verify, internet_checksum};

    fn hello() -> OspfPacket {
        OspfPacket::new(
            OspfHeader::new(OspfPacketType::Hello, Ipv4Addr::new(10, 0, 0, 9), 0),
            OspfBody::Hello(OspfHello {
                network_mask: Ipv4Addr::new(255, 255, 255, 0),
                hello_interval: 10,
                options: options::TOS | options::EXTERNAL,
                priority: 1,
                dead_interval: 40,
                designated_router: Ipv4Addr::UNSPECIFIED,
                backup_router: Ipv4Addr::UNSPECIFIED,
                neighbors: vec![Ipv4Addr::new(10, 0, 0, 5)],
            }),
        )
    }

    #[test]
    fn test_hello_layout() {
        let bytes = hello().to_bytes();
        assert_eq!(bytes.len(), 48);
        assert_eq!(bytes[0], OSPF_VERSION);
        assert_eq!(bytes[1], 1);
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 48);
        assert_eq!(&bytes[4..8], &[10, 0, 0, 9]);
        assert_eq!(internet_checksum(&bytes), 0);
        assert_eq!(&bytes[44..48], &[10, 0, 0, 5]);
    }

    #[test]
    fn test_hello_parse() {
        let parsed = OspfPacket::parse(&hello().to_bytes()).unwrap();
        assert_eq!(parsed, hello());
    }

    #[test]
    fn test_router_lsa_checksum() {
        let lsa = OspfLsa::router(
            Ipv4Addr::new(10, 0, 0, 9),
            0x8000_0001,
            vec![RouterLink::new(
                Ipv4Addr::new(10, 0, 0, 0),
                Ipv4Addr::new(255, 255, 255, 0),
                link_types::STUB,
                10,
            )],
        );
        let bytes = lsa.to_bytes();
        assert_eq!(bytes.len(), 36);
        assert_eq!(u16::from_be_bytes([bytes[18], bytes[19]]), 36);
        assert!(fletcher_verify(&bytes[2..]));

        let (parsed, rest) = OspfLsa::parse(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed.body, lsa.body);
        assert_eq!(parsed.header.length, 36);
    }

    #[test]
    fn test_dbd_with_headers() {
        let header = OspfLsaHeader::new(
            OspfLsaType::RouterLsa,
            Ipv4Addr::new(10, 0, 0, 5),
            Ipv4Addr::new(10, 0, 0, 5),
            1,
        );
        let packet = OspfPacket::new(
            OspfHeader::new(OspfPacketType::Hello, Ipv4Addr::new(10, 0, 0, 5), 0),
            OspfBody::DatabaseDescription(OspfDatabaseDescription {
                mtu: 1500,
                options: options::EXTERNAL,
                flags: dbd_flags::MORE | dbd_flags::MASTER,
                sequence: 4242,
                lsa_headers: vec![header.clone()],
            }),
        );
        assert_eq!(packet.header.packet_type, OspfPacketType::DatabaseDescription);

        let parsed = OspfPacket::parse(&packet.to_bytes()).unwrap();
        let OspfBody::DatabaseDescription(dbd) = parsed.body else {
            panic!("expected a database description");
        };
        assert!(dbd.has_flag(dbd_flags::MORE));
        assert!(!dbd.has_flag(dbd_flags::INIT));
        assert_eq!(dbd.lsa_headers, vec![header]);
    }

    #[test]
    fn test_update_roundtrip() {
        let lsas = vec![
            OspfLsa::router(Ipv4Addr::new(1, 1, 1, 1), 10, vec![]),
            OspfLsa::new(
                OspfLsaHeader::new(
                    OspfLsaType::ExternalLsa,
                    Ipv4Addr::new(192, 168, 0, 0),
                    Ipv4Addr::new(1, 1, 1, 1),
                    10,
                ),
                LsaBody::External {
                    mask: Ipv4Addr::new(255, 255, 0, 0),
                    flags: 0x80,
                    metric: 20,
                    forwarding: Ipv4Addr::UNSPECIFIED,
                    tag: 0,
                },
            ),
        ];
        let packet = OspfPacket::new(
            OspfHeader::new(OspfPacketType::LinkStateUpdate, Ipv4Addr::new(1, 1, 1, 1), 0),
            OspfBody::LinkStateUpdate(lsas.clone()),
        );
        let parsed = OspfPacket::parse(&packet.to_bytes()).unwrap();
        let OspfBody::LinkStateUpdate(parsed) = parsed.body else {
            panic!("expected an update");
        };
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].body, lsas[1].body);
    }

    #[test]
    fn test_truncated_packets() {
        assert!(OspfPacket::parse(&[2, 1, 0]).is_err());
        let mut bytes = hello().to_bytes();
        bytes.truncate(30);
        assert!(OspfPacket::parse(&bytes).is_err());
        bytes[1] = 9;
        assert!(OspfPacket::parse_header(&bytes).is_err());
    }
}
