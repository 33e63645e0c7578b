//! IS-IS PDU codec
//!
//! IS-IS runs directly over 802.3 behind the OSI LLC header `FE FE 03`. Every
//! PDU starts with the common eight byte header (discriminator 0x83), followed
//! by a type specific fixed part and a TLV stream with 8-bit type and length.
//! Link state PDUs carry the Fletcher checksum over everything from the LSP ID
//! to the end of the PDU.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use ipnetwork::Ipv4Network;
use loki_core::{EthernetHeader, Error, MacAddr, Result};
use loki_packet::checksum::{fletcher_checksum, fletcher_verify, ISIS_LSP_CHECKSUM_OFFSET};
use loki_packet::llc::{osi_llc, strip_osi_llc};
use loki_packet::{EtherType, EthernetFrame, RawTlv, TlvCodec};
use std::fmt;
use std::net::Ipv4Addr;

/// Intradomain routing protocol discriminator (ISO 10589)
pub const ISIS_DISCRIMINATOR: u8 = 0x83;
pub const ISIS_VERSION: u8 = 1;
pub const ALL_L1_IS: MacAddr = MacAddr([0x01, 0x80, 0xC2, 0x00, 0x00, 0x14]);
pub const ALL_L2_IS: MacAddr = MacAddr([0x01, 0x80, 0xC2, 0x00, 0x00, 0x15]);

/// Common header length
pub const HEADER_LEN: usize = 8;
const HELLO_FIXED_LEN: usize = 19;
const LSP_FIXED_LEN: usize = 19;
const CSNP_FIXED_LEN: usize = 25;
/// Offset of the LSP ID, where the LSP checksum coverage starts
const LSP_ID_OFFSET: usize = 12;

pub mod pdu_types {
    pub const L1_LAN_HELLO: u8 = 15;
    pub const L2_LAN_HELLO: u8 = 16;
    pub const P2P_HELLO: u8 = 17;
    pub const L1_LSP: u8 = 18;
    pub const L2_LSP: u8 = 20;
    pub const L1_CSNP: u8 = 24;
    pub const L2_CSNP: u8 = 25;
    pub const L1_PSNP: u8 = 26;
    pub const L2_PSNP: u8 = 27;
}

pub mod tlv_types {
    pub const AREA_ADDRESSES: u16 = 0x01;
    pub const IS_REACH: u16 = 0x02;
    pub const IS_NEIGHBORS: u16 = 0x06;
    pub const PADDING: u16 = 0x08;
    pub const LSP_ENTRIES: u16 = 0x09;
    pub const IP_INTERNAL_REACH: u16 = 0x80;
    pub const PROTOCOL_SUPPORT: u16 = 0x81;
    pub const IP_INTERFACE_ADDRESS: u16 = 0x84;
    pub const HOSTNAME: u16 = 0x89;
    pub const RESTART_SIGNALING: u16 = 0xd3;
}

/// NLPID announced in the protocols supported TLV
pub const NLPID_IPV4: u8 = 0xcc;

/// Routing level of a PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsisLevel {
    L1,
    L2,
}

impl IsisLevel {
    pub fn multicast(&self) -> MacAddr {
        match self {
            IsisLevel::L1 => ALL_L1_IS,
            IsisLevel::L2 => ALL_L2_IS,
        }
    }

    pub fn hello_type(&self) -> u8 {
        match self {
            IsisLevel::L1 => pdu_types::L1_LAN_HELLO,
            IsisLevel::L2 => pdu_types::L2_LAN_HELLO,
        }
    }

    pub fn lsp_type(&self) -> u8 {
        match self {
            IsisLevel::L1 => pdu_types::L1_LSP,
            IsisLevel::L2 => pdu_types::L2_LSP,
        }
    }

    pub fn csnp_type(&self) -> u8 {
        match self {
            IsisLevel::L1 => pdu_types::L1_CSNP,
            IsisLevel::L2 => pdu_types::L2_CSNP,
        }
    }

    /// Circuit type announced in LAN hellos
    pub fn circuit_type(&self) -> u8 {
        match self {
            IsisLevel::L1 => 1,
            IsisLevel::L2 => 2,
        }
    }
}

impl fmt::Display for IsisLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsisLevel::L1 => write!(f, "level 1"),
            IsisLevel::L2 => write!(f, "level 2"),
        }
    }
}

/// Six byte system identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemId(pub [u8; 6]);

impl SystemId {
    /// LAN ID of the pseudonode this system would be DIS for
    pub fn lan_id(&self, circuit: u8) -> [u8; 7] {
        let mut id = [0u8; 7];
        id[..6].copy_from_slice(&self.0);
        id[6] = circuit;
        id
    }

    /// LSP ID for fragment zero of the non-pseudonode LSP
    pub fn lsp_id(&self) -> [u8; 8] {
        let mut id = [0u8; 8];
        id[..6].copy_from_slice(&self.0);
        id
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}{:02x}.{:02x}{:02x}.{:02x}{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Dotted hex rendering used for LSP and LAN IDs
pub fn format_id(id: &[u8]) -> String {
    id.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(".")
}

/// Default, delay, expense and error metric bytes; the three optional
/// metrics are flagged unsupported
pub const DEFAULT_METRICS: [u8; 4] = [0x0a, 0x80, 0x80, 0x80];

/// One entry of the IP internal reachability TLV
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpReach {
    pub metrics: [u8; 4],
    pub address: Ipv4Addr,
    pub mask: Ipv4Addr,
}

impl IpReach {
    const LEN: usize = 12;

    pub fn new(address: Ipv4Addr, mask: Ipv4Addr) -> Self {
        Self {
            metrics: DEFAULT_METRICS,
            address,
            mask,
        }
    }

    pub fn network(&self) -> Result<Ipv4Network> {
        Ipv4Network::with_netmask(self.address, self.mask)
            .map_err(|e| Error::parsing(format!("bad IS-IS prefix: {}", e)))
    }
}

impl fmt::Display for IpReach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.address, self.mask)
    }
}

/// One entry of the IS reachability TLV
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsNeighbor {
    pub metrics: [u8; 4],
    pub id: [u8; 7],
}

impl IsNeighbor {
    const LEN: usize = 11;
}

/// One entry of the LSP entries TLV carried by sequence number PDUs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LspEntry {
    pub lifetime: u16,
    pub lsp_id: [u8; 8],
    pub sequence: u32,
    pub checksum: u16,
}

impl LspEntry {
    const LEN: usize = 16;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IsisTlv {
    AreaAddresses(Vec<Bytes>),
    IsReach { virtual_flag: u8, neighbors: Vec<IsNeighbor> },
    /// LAN addresses of the neighbors heard on the circuit
    IsNeighbors(Vec<MacAddr>),
    /// Zero filled padding of the given value length
    Padding(usize),
    LspEntries(Vec<LspEntry>),
    IpInternalReach(Vec<IpReach>),
    ProtocolSupport(Bytes),
    IpInterfaceAddresses(Vec<Ipv4Addr>),
    Hostname(String),
    Other(RawTlv),
}

fn chunks_of<const N: usize>(value: &[u8]) -> Option<impl Iterator<Item = &[u8]>> {
    (value.len() % N == 0).then(|| value.chunks_exact(N))
}

fn decode_area_addresses(value: &[u8]) -> Option<Vec<Bytes>> {
    let mut buf = value;
    let mut areas = Vec::new();
    while let Some((&len, rest)) = buf.split_first() {
        let len = len as usize;
        if len == 0 || rest.len() < len {
            return None;
        }
        areas.push(Bytes::copy_from_slice(&rest[..len]));
        buf = &rest[len..];
    }
    Some(areas)
}

impl IsisTlv {
    fn decode(raw: RawTlv) -> Self {
        Self::decode_value(&raw).unwrap_or(IsisTlv::Other(raw))
    }

    /// Typed view of a raw TLV; `None` keeps it opaque so it renders unchanged
    fn decode_value(raw: &RawTlv) -> Option<Self> {
        let value = &raw.value[..];
        let tlv = match raw.tlv_type {
            tlv_types::AREA_ADDRESSES => IsisTlv::AreaAddresses(decode_area_addresses(value)?),
            tlv_types::IS_REACH => {
                let (&virtual_flag, rest) = value.split_first()?;
                let neighbors = chunks_of::<{ IsNeighbor::LEN }>(rest)?
                    .map(|c| {
                        let mut metrics = [0u8; 4];
                        let mut id = [0u8; 7];
                        metrics.copy_from_slice(&c[..4]);
                        id.copy_from_slice(&c[4..]);
                        IsNeighbor { metrics, id }
                    })
                    .collect();
                IsisTlv::IsReach {
                    virtual_flag,
                    neighbors,
                }
            }
            tlv_types::IS_NEIGHBORS => IsisTlv::IsNeighbors(
                chunks_of::<6>(value)?.filter_map(MacAddr::from_slice).collect(),
            ),
            tlv_types::PADDING if value.iter().all(|b| *b == 0) => IsisTlv::Padding(value.len()),
            tlv_types::LSP_ENTRIES => IsisTlv::LspEntries(
                chunks_of::<{ LspEntry::LEN }>(value)?
                    .map(|mut c| {
                        let lifetime = c.get_u16();
                        let mut lsp_id = [0u8; 8];
                        c.copy_to_slice(&mut lsp_id);
                        LspEntry {
                            lifetime,
                            lsp_id,
                            sequence: c.get_u32(),
                            checksum: c.get_u16(),
                        }
                    })
                    .collect(),
            ),
            tlv_types::IP_INTERNAL_REACH => IsisTlv::IpInternalReach(
                chunks_of::<{ IpReach::LEN }>(value)?
                    .map(|mut c| {
                        let mut metrics = [0u8; 4];
                        c.copy_to_slice(&mut metrics);
                        IpReach {
                            metrics,
                            address: Ipv4Addr::from(c.get_u32()),
                            mask: Ipv4Addr::from(c.get_u32()),
                        }
                    })
                    .collect(),
            ),
            tlv_types::PROTOCOL_SUPPORT => IsisTlv::ProtocolSupport(raw.value.clone()),
            tlv_types::IP_INTERFACE_ADDRESS => IsisTlv::IpInterfaceAddresses(
                chunks_of::<4>(value)?
                    .map(|mut c| Ipv4Addr::from(c.get_u32()))
                    .collect(),
            ),
            tlv_types::HOSTNAME => IsisTlv::Hostname(String::from_utf8(value.to_vec()).ok()?),
            _ => return None,
        };
        Some(tlv)
    }

    fn encode(&self) -> RawTlv {
        let mut buf = BytesMut::new();
        let tlv_type = match self {
            IsisTlv::AreaAddresses(areas) => {
                for area in areas {
                    buf.put_u8(area.len() as u8);
                    buf.put_slice(area);
                }
                tlv_types::AREA_ADDRESSES
            }
            IsisTlv::IsReach {
                virtual_flag,
                neighbors,
            } => {
                buf.put_u8(*virtual_flag);
                for n in neighbors {
                    buf.put_slice(&n.metrics);
                    buf.put_slice(&n.id);
                }
                tlv_types::IS_REACH
            }
            IsisTlv::IsNeighbors(macs) => {
                for mac in macs {
                    buf.put_slice(mac.as_bytes());
                }
                tlv_types::IS_NEIGHBORS
            }
            IsisTlv::Padding(len) => {
                buf.put_bytes(0, *len);
                tlv_types::PADDING
            }
            IsisTlv::LspEntries(entries) => {
                for e in entries {
                    buf.put_u16(e.lifetime);
                    buf.put_slice(&e.lsp_id);
                    buf.put_u32(e.sequence);
                    buf.put_u16(e.checksum);
                }
                tlv_types::LSP_ENTRIES
            }
            IsisTlv::IpInternalReach(routes) => {
                for r in routes {
                    buf.put_slice(&r.metrics);
                    buf.put_slice(&r.address.octets());
                    buf.put_slice(&r.mask.octets());
                }
                tlv_types::IP_INTERNAL_REACH
            }
            IsisTlv::ProtocolSupport(nlpids) => {
                buf.put_slice(nlpids);
                tlv_types::PROTOCOL_SUPPORT
            }
            IsisTlv::IpInterfaceAddresses(addresses) => {
                for a in addresses {
                    buf.put_slice(&a.octets());
                }
                tlv_types::IP_INTERFACE_ADDRESS
            }
            IsisTlv::Hostname(name) => {
                buf.put_slice(name.as_bytes());
                tlv_types::HOSTNAME
            }
            IsisTlv::Other(raw) => return raw.clone(),
        };
        RawTlv::new(tlv_type, buf.freeze())
    }
}

fn parse_tlvs(data: &[u8]) -> Result<Vec<IsisTlv>> {
    Ok(TlvCodec::ISIS
        .parse_all(data)?
        .into_iter()
        .map(IsisTlv::decode)
        .collect())
}

fn render_tlvs(tlvs: &[IsisTlv]) -> Result<Bytes> {
    let raw: Vec<RawTlv> = tlvs.iter().map(IsisTlv::encode).collect();
    TlvCodec::ISIS.render_all(&raw)
}

fn find<'a, T>(tlvs: &'a [IsisTlv], pick: impl Fn(&'a IsisTlv) -> Option<T>) -> Option<T> {
    tlvs.iter().find_map(pick)
}

fn put_header(buf: &mut BytesMut, pdu_type: u8, fixed_len: usize) {
    buf.put_u8(ISIS_DISCRIMINATOR);
    buf.put_u8((HEADER_LEN + fixed_len) as u8);
    buf.put_u8(ISIS_VERSION);
    // zero means the default six byte system id
    buf.put_u8(0);
    buf.put_u8(pdu_type);
    buf.put_u8(ISIS_VERSION);
    buf.put_u8(0);
    buf.put_u8(0);
}

/// Cut the TLV area at the announced PDU length, ignoring Ethernet padding
fn tlv_area(data: &[u8], fixed_end: usize, pdu_length: u16) -> Result<&[u8]> {
    let end = pdu_length as usize;
    if end < fixed_end {
        return Err(Error::parsing(format!("IS-IS PDU length {} too short", end)));
    }
    if end > data.len() {
        return Err(Error::truncated("isis pdu", end, data.len()));
    }
    Ok(&data[fixed_end..end])
}

/// LAN IS-IS hello
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanHello {
    pub level: IsisLevel,
    pub circuit_type: u8,
    pub source_id: SystemId,
    pub hold_time: u16,
    pub priority: u8,
    pub lan_id: [u8; 7],
    pub tlvs: Vec<IsisTlv>,
}

impl LanHello {
    pub fn new(level: IsisLevel, source_id: SystemId, hold_time: u16) -> Self {
        Self {
            level,
            circuit_type: level.circuit_type(),
            source_id,
            hold_time,
            priority: 64,
            lan_id: source_id.lan_id(1),
            tlvs: Vec::new(),
        }
    }

    pub fn add_tlv(mut self, tlv: IsisTlv) -> Self {
        self.tlvs.push(tlv);
        self
    }

    /// Append padding TLVs until the PDU is at least `pdu_len` bytes long
    pub fn padded(mut self, pdu_len: usize) -> Result<Self> {
        let fixed = HEADER_LEN + HELLO_FIXED_LEN;
        let mut total = fixed + render_tlvs(&self.tlvs)?.len();
        while total < pdu_len {
            // a padding TLV needs at least its two header bytes
            let value = (pdu_len - total).saturating_sub(2).min(255);
            self.tlvs.push(IsisTlv::Padding(value));
            total += 2 + value;
        }
        Ok(self)
    }

    pub fn area_addresses(&self) -> Option<&[Bytes]> {
        find(&self.tlvs, |t| match t {
            IsisTlv::AreaAddresses(a) => Some(a.as_slice()),
            _ => None,
        })
    }

    pub fn neighbors(&self) -> impl Iterator<Item = &MacAddr> {
        self.tlvs.iter().flat_map(|t| match t {
            IsisTlv::IsNeighbors(macs) => macs.as_slice(),
            _ => &[][..],
        })
    }

    fn parse_body(level: IsisLevel, data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN + HELLO_FIXED_LEN {
            return Err(Error::truncated("isis hello", HEADER_LEN + HELLO_FIXED_LEN, data.len()));
        }
        let mut fixed = &data[HEADER_LEN..];
        let circuit_type = fixed.get_u8();
        let mut source_id = [0u8; 6];
        fixed.copy_to_slice(&mut source_id);
        let hold_time = fixed.get_u16();
        let pdu_length = fixed.get_u16();
        let priority = fixed.get_u8();
        let mut lan_id = [0u8; 7];
        fixed.copy_to_slice(&mut lan_id);
        let tlvs = parse_tlvs(tlv_area(data, HEADER_LEN + HELLO_FIXED_LEN, pdu_length)?)?;
        Ok(Self {
            level,
            circuit_type,
            source_id: SystemId(source_id),
            hold_time,
            priority,
            lan_id,
            tlvs,
        })
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        let tlvs = render_tlvs(&self.tlvs)?;
        let fixed = HEADER_LEN + HELLO_FIXED_LEN;
        let mut buf = BytesMut::with_capacity(fixed + tlvs.len());
        put_header(&mut buf, self.level.hello_type(), HELLO_FIXED_LEN);
        buf.put_u8(self.circuit_type);
        buf.put_slice(&self.source_id.0);
        buf.put_u16(self.hold_time);
        buf.put_u16((fixed + tlvs.len()) as u16);
        buf.put_u8(self.priority);
        buf.put_slice(&self.lan_id);
        buf.put_slice(&tlvs);
        Ok(buf.freeze())
    }
}

/// Link state PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStatePdu {
    pub level: IsisLevel,
    pub lifetime: u16,
    pub lsp_id: [u8; 8],
    pub sequence: u32,
    /// Checksum as received; recomputed on render
    pub checksum: u16,
    /// Partition repair, attached, overload and IS type bits
    pub type_block: u8,
    pub tlvs: Vec<IsisTlv>,
}

impl LinkStatePdu {
    /// Level 1 and 2 intermediate system
    pub const TYPE_L1_L2: u8 = 0x03;

    pub fn new(level: IsisLevel, lsp_id: [u8; 8], sequence: u32) -> Self {
        Self {
            level,
            lifetime: 1200,
            lsp_id,
            sequence,
            checksum: 0,
            type_block: Self::TYPE_L1_L2,
            tlvs: Vec::new(),
        }
    }

    pub fn add_tlv(mut self, tlv: IsisTlv) -> Self {
        self.tlvs.push(tlv);
        self
    }

    /// Advertised IP prefixes
    pub fn ip_reach(&self) -> impl Iterator<Item = &IpReach> {
        self.tlvs.iter().flat_map(|t| match t {
            IsisTlv::IpInternalReach(routes) => routes.as_slice(),
            _ => &[][..],
        })
    }

    pub fn hostname(&self) -> Option<&str> {
        find(&self.tlvs, |t| match t {
            IsisTlv::Hostname(h) => Some(h.as_str()),
            _ => None,
        })
    }

    fn parse_body(level: IsisLevel, data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN + LSP_FIXED_LEN {
            return Err(Error::truncated("isis lsp", HEADER_LEN + LSP_FIXED_LEN, data.len()));
        }
        let mut fixed = &data[HEADER_LEN..];
        let pdu_length = fixed.get_u16();
        let lifetime = fixed.get_u16();
        let mut lsp_id = [0u8; 8];
        fixed.copy_to_slice(&mut lsp_id);
        let sequence = fixed.get_u32();
        let checksum = fixed.get_u16();
        let type_block = fixed.get_u8();
        let tlvs = parse_tlvs(tlv_area(data, HEADER_LEN + LSP_FIXED_LEN, pdu_length)?)?;
        Ok(Self {
            level,
            lifetime,
            lsp_id,
            sequence,
            checksum,
            type_block,
            tlvs,
        })
    }

    /// Render with a freshly computed checksum
    pub fn to_bytes(&self) -> Result<Bytes> {
        let tlvs = render_tlvs(&self.tlvs)?;
        let fixed = HEADER_LEN + LSP_FIXED_LEN;
        let mut buf = BytesMut::with_capacity(fixed + tlvs.len());
        put_header(&mut buf, self.level.lsp_type(), LSP_FIXED_LEN);
        buf.put_u16((fixed + tlvs.len()) as u16);
        buf.put_u16(self.lifetime);
        buf.put_slice(&self.lsp_id);
        buf.put_u32(self.sequence);
        buf.put_u16(0);
        buf.put_u8(self.type_block);
        buf.put_slice(&tlvs);
        fletcher_checksum(&mut buf[LSP_ID_OFFSET..], ISIS_LSP_CHECKSUM_OFFSET);
        Ok(buf.freeze())
    }

    /// Store the checksum this PDU renders with
    pub fn seal(mut self) -> Result<Self> {
        let bytes = self.to_bytes()?;
        let at = LSP_ID_OFFSET + ISIS_LSP_CHECKSUM_OFFSET;
        self.checksum = u16::from_be_bytes([bytes[at], bytes[at + 1]]);
        Ok(self)
    }

    /// Summary for sequence number PDUs
    pub fn entry(&self) -> LspEntry {
        LspEntry {
            lifetime: self.lifetime,
            lsp_id: self.lsp_id,
            sequence: self.sequence,
            checksum: self.checksum,
        }
    }
}

/// Complete sequence number PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteSequencePdu {
    pub level: IsisLevel,
    pub source_id: [u8; 7],
    pub start_lsp: [u8; 8],
    pub end_lsp: [u8; 8],
    pub tlvs: Vec<IsisTlv>,
}

impl CompleteSequencePdu {
    /// A CSNP covering the whole LSP ID range
    pub fn full_range(level: IsisLevel, source: SystemId, entries: Vec<LspEntry>) -> Self {
        Self {
            level,
            source_id: source.lan_id(0),
            start_lsp: [0x00; 8],
            end_lsp: [0xff; 8],
            tlvs: vec![IsisTlv::LspEntries(entries)],
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &LspEntry> {
        self.tlvs.iter().flat_map(|t| match t {
            IsisTlv::LspEntries(e) => e.as_slice(),
            _ => &[][..],
        })
    }

    fn parse_body(level: IsisLevel, data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN + CSNP_FIXED_LEN {
            return Err(Error::truncated("isis csnp", HEADER_LEN + CSNP_FIXED_LEN, data.len()));
        }
        let mut fixed = &data[HEADER_LEN..];
        let pdu_length = fixed.get_u16();
        let mut source_id = [0u8; 7];
        fixed.copy_to_slice(&mut source_id);
        let mut start_lsp = [0u8; 8];
        fixed.copy_to_slice(&mut start_lsp);
        let mut end_lsp = [0u8; 8];
        fixed.copy_to_slice(&mut end_lsp);
        let tlvs = parse_tlvs(tlv_area(data, HEADER_LEN + CSNP_FIXED_LEN, pdu_length)?)?;
        Ok(Self {
            level,
            source_id,
            start_lsp,
            end_lsp,
            tlvs,
        })
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        let tlvs = render_tlvs(&self.tlvs)?;
        let fixed = HEADER_LEN + CSNP_FIXED_LEN;
        let mut buf = BytesMut::with_capacity(fixed + tlvs.len());
        put_header(&mut buf, self.level.csnp_type(), CSNP_FIXED_LEN);
        buf.put_u16((fixed + tlvs.len()) as u16);
        buf.put_slice(&self.source_id);
        buf.put_slice(&self.start_lsp);
        buf.put_slice(&self.end_lsp);
        buf.put_slice(&tlvs);
        Ok(buf.freeze())
    }
}

/// Any IS-IS PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IsisPdu {
    Hello(LanHello),
    LinkState(LinkStatePdu),
    CompleteSequence(CompleteSequencePdu),
    /// Point-to-point hellos and PSNPs are carried opaque
    Other { pdu_type: u8, data: Bytes },
}

impl IsisPdu {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(Error::truncated("isis header", HEADER_LEN, data.len()));
        }
        if data[0] != ISIS_DISCRIMINATOR {
            return Err(Error::parsing(format!(
                "not an IS-IS PDU, discriminator 0x{:02x}",
                data[0]
            )));
        }
        // upper three bits are reserved
        let pdu_type = data[4] & 0x1f;
        let pdu = match pdu_type {
            pdu_types::L1_LAN_HELLO => IsisPdu::Hello(LanHello::parse_body(IsisLevel::L1, data)?),
            pdu_types::L2_LAN_HELLO => IsisPdu::Hello(LanHello::parse_body(IsisLevel::L2, data)?),
            pdu_types::L1_LSP => IsisPdu::LinkState(LinkStatePdu::parse_body(IsisLevel::L1, data)?),
            pdu_types::L2_LSP => IsisPdu::LinkState(LinkStatePdu::parse_body(IsisLevel::L2, data)?),
            pdu_types::L1_CSNP => {
                IsisPdu::CompleteSequence(CompleteSequencePdu::parse_body(IsisLevel::L1, data)?)
            }
            pdu_types::L2_CSNP => {
                IsisPdu::CompleteSequence(CompleteSequencePdu::parse_body(IsisLevel::L2, data)?)
            }
            _ => IsisPdu::Other {
                pdu_type,
                data: Bytes::copy_from_slice(data),
            },
        };
        Ok(pdu)
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        match self {
            IsisPdu::Hello(h) => h.to_bytes(),
            IsisPdu::LinkState(l) => l.to_bytes(),
            IsisPdu::CompleteSequence(c) => c.to_bytes(),
            IsisPdu::Other { data, .. } => Ok(data.clone()),
        }
    }

    pub fn level(&self) -> Option<IsisLevel> {
        match self {
            IsisPdu::Hello(h) => Some(h.level),
            IsisPdu::LinkState(l) => Some(l.level),
            IsisPdu::CompleteSequence(c) => Some(c.level),
            IsisPdu::Other { .. } => None,
        }
    }

    /// Decode the PDU carried by an 802.3 OSI LLC frame
    pub fn from_ethernet(eth: &EthernetHeader<'_>) -> Result<Self> {
        if !eth.is_8023() {
            return Err(Error::parsing(format!(
                "IS-IS needs 802.3 framing, got ethertype 0x{:04x}",
                eth.ethertype
            )));
        }
        let len = (eth.ethertype as usize).min(eth.payload.len());
        let body = strip_osi_llc(&eth.payload[..len])
            .ok_or_else(|| Error::parsing("frame is not OSI LLC"))?;
        Self::parse(body)
    }

    /// Complete frame to the all-IS multicast address of the PDU's level
    pub fn to_frame(&self, source: MacAddr) -> Result<Vec<u8>> {
        let level = self
            .level()
            .ok_or_else(|| Error::construction("IS-IS PDU has no level"))?;
        let llc = osi_llc(&self.to_bytes()?);
        Ok(EthernetFrame::new(level.multicast(), source, EtherType::LLC, llc).to_bytes())
    }
}

/// True when a received LSP carries a valid checksum
pub fn lsp_checksum_valid(data: &[u8]) -> bool {
    if data.len() < HEADER_LEN + LSP_FIXED_LEN {
        return false;
    }
    let end = u16::from_be_bytes([data[8], data[9]]) as usize;
    end <= data.len() && end > LSP_ID_OFFSET && fletcher_verify(&data[LSP_ID_OFFSET..end])
}

impl fmt::Display for IsisPdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsisPdu::Hello(h) => write!(
                f,
                "IS-IS {} hello from {} hold {} prio {}",
                h.level, h.source_id, h.hold_time, h.priority
            ),
            IsisPdu::LinkState(l) => write!(
                f,
                "IS-IS {} LSP {} seq {} lifetime {}",
                l.level,
                format_id(&l.lsp_id),
                l.sequence,
                l.lifetime
            ),
            IsisPdu::CompleteSequence(c) => write!(
                f,
                "IS-IS {} CSNP from {} ({} entries)",
                c.level,
                format_id(&c.source_id),
                c.entries().count()
            ),
            IsisPdu::Other { pdu_type, data } => {
                write!(f, "IS-IS PDU type {} ({} bytes)", pdu_type, data.len())
            }
        }
    }
}
