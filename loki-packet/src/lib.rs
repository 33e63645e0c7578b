//! Codec primitives and frame builders for Loki
//!
//! Everything a protocol module needs to put bytes on the wire:
//!
//! - [`checksum`] - Internet checksum (IPv4, OSPF, EIGRP) and the Fletcher
//!   checksum carried by OSPF LSAs and IS-IS LSPs
//! - [`tlv`] - a generic type-length-value codec parameterised by field widths
//! - [`ethernet`] - Ethernet II / 802.3 frame construction
//! - [`llc`] - LLC and SNAP encapsulation (DTP, IS-IS)
//! - [`ip`] - IPv4 datagram construction
//!
//! Parsing of received frames lives in `loki_core::frame`.
//!
//! # Quick Start
//!
//! ```rust
//! use std::net::Ipv4Addr;
//! use loki_core::MacAddr;
//! use loki_packet::{EtherType, EthernetFrame, IpProtocol, Ipv4Packet};
//!
//! let ip = Ipv4Packet::link_local(
//!     Ipv4Addr::new(10, 0, 0, 1),
//!     Ipv4Addr::new(224, 0, 0, 5),
//!     IpProtocol::OSPF,
//!     vec![0x02, 0x01],
//! );
//!
//! let frame = EthernetFrame::new(
//!     MacAddr::ipv4_multicast(Ipv4Addr::new(224, 0, 0, 5)),
//!     MacAddr::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
//!     EtherType::IPv4,
//!     ip.to_bytes(),
//! );
//! let bytes = frame.to_bytes();
//! assert_eq!(bytes.len(), 60);
//! ```

pub mod checksum;
pub mod ethernet;
pub mod ip;
pub mod llc;
pub mod tlv;

// Re-export commonly used types for convenience
pub use checksum::{fletcher_checksum, fletcher_verify, internet_checksum};
pub use ethernet::{EtherType, EthernetFrame};
pub use ip::{IpProtocol, Ipv4Packet, TypeOfService};
pub use llc::{LlcHeader, LlcSnapFrame, SnapHeader};
pub use tlv::{FieldWidth, RawTlv, TlvCodec};
