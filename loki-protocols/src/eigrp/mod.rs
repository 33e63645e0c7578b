//! Enhanced Interior Gateway Routing Protocol (EIGRP)
//!
//! The module multicasts hellos for an autonomous system so neighbors open
//! unicast sessions, then keeps one sender per peer that acknowledges the
//! peer's reliable packets and can carry forged updates or a goodbye.
//!
//! ## Packet Structure
//!
//! ```text
//! version(1) opcode(1) checksum(2) flags(4) sequence(4) ack(4) AS(4)
//! TLVs: type(2) length(2, counts the header) value
//! ```
//!
//! Datagrams go out with ToS 0xc0 and TTL 2, multicast to 224.0.0.10 or
//! unicast to a peer.

pub mod attack;
pub mod packet;
pub mod protocol;

#[cfg(test)]
mod tests;

pub use attack::{EigrpPeer, Md5Key};
pub use packet::{
    EigrpOpcode, EigrpPacket, EigrpTlv, ExternalRoute, InternalRoute, RouteMetric, RoutePrefix,
    EIGRP_MULTICAST,
};
pub use protocol::{EigrpConfig, EigrpModule};
