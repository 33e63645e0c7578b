//! Dynamic Trunking Protocol (DTP)
//!
//! DTP is Cisco's trunk negotiation protocol. A port left in a desirable or
//! auto mode turns into a trunk when the other end announces TRUNK/ON, which
//! hands the attacker every VLAN on the link.
//!
//! ## Packet Structure
//!
//! ```text
//! Ethernet (802.3)   dst 01:00:0C:CC:CC:CC, length field
//! LLC/SNAP           AA AA 03 | 00 00 0C | 20 04
//! DTP                version (1 byte) + TLVs (type u16, length u16, value)
//! ```
//!
//! ## TLV Types
//!
//! - **Domain (0x0001)**: VTP domain name, NUL padded
//! - **Status (0x0002)**: operating status (0x00 access, 0x80 trunk) | administrative status
//! - **Type (0x0003)**: operating type (0x20 native, 0x40 ISL, 0xA0 802.1Q) | administrative type
//! - **Sender (0x0004)**: MAC of the announcing port

pub mod attack;
pub mod packet;
pub mod protocol;


pub use attack::{poison_packet, DtpPeer, PoisonTarget};
pub use packet::{DtpPacket, DtpStatus, DtpTlv, DtpType, DTP_MULTICAST_MAC, DTP_VERSION};
pub use protocol::{DtpConfig, DtpModule};
