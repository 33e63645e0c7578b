//! IPv4 datagram construction
//!
//! Wraps routing protocol payloads (OSPF, EIGRP) in an option-less IPv4
//! header; total length and header checksum are filled in on serialization.

use crate::checksum::fill_internet_checksum;
use bytes::{BufMut, BytesMut};
use loki_core::ip_protocols;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpProtocol {
    UDP,
    EIGRP,
    OSPF,
    Custom(u8),
}

impl IpProtocol {
    pub fn number(self) -> u8 {
        match self {
            IpProtocol::UDP => ip_protocols::UDP,
            IpProtocol::EIGRP => ip_protocols::EIGRP,
            IpProtocol::OSPF => ip_protocols::OSPF,
            IpProtocol::Custom(number) => number,
        }
    }
}

/// Type of Service byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeOfService(pub u8);

impl TypeOfService {
    pub const ROUTINE: TypeOfService = TypeOfService(0);
    /// Precedence 6, what routers put on control plane traffic
    pub const INTERNETWORK_CONTROL: TypeOfService = TypeOfService(0xc0);
}

#[derive(Debug, Clone)]
pub struct Ipv4Packet {
    pub tos: TypeOfService,
    pub identification: u16,
    pub ttl: u8,
    pub protocol: IpProtocol,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub payload: Vec<u8>,
}

impl Ipv4Packet {
    pub const HEADER_SIZE: usize = 20;

    /// Datagram with TTL 64, routine ToS and a random identification
    pub fn new(
        source: Ipv4Addr,
        destination: Ipv4Addr,
        protocol: IpProtocol,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            tos: TypeOfService::ROUTINE,
            identification: rand::random(),
            ttl: 64,
            protocol,
            source,
            destination,
            payload,
        }
    }

    /// Control plane datagram that must not leave the link
    pub fn link_local(
        source: Ipv4Addr,
        destination: Ipv4Addr,
        protocol: IpProtocol,
        payload: Vec<u8>,
    ) -> Self {
        Self::new(source, destination, protocol, payload)
            .with_tos(TypeOfService::INTERNETWORK_CONTROL)
            .with_ttl(1)
    }

    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_tos(mut self, tos: TypeOfService) -> Self {
        self.tos = tos;
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let total = Self::HEADER_SIZE + self.payload.len();
        let mut buf = BytesMut::with_capacity(total);
        buf.put_u8(0x45);
        buf.put_u8(self.tos.0);
        buf.put_u16(total as u16);
        buf.put_u16(self.identification);
        buf.put_u16(0);
        buf.put_u8(self.ttl);
        buf.put_u8(self.protocol.number());
        buf.put_u16(0);
        buf.put_slice(&self.source.octets());
        buf.put_slice(&self.destination.octets());
        fill_internet_checksum(&mut buf[..Self::HEADER_SIZE], 10);
        buf.put_slice(&self.payload);
        buf.to_vec()
    }
}
