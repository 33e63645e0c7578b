//! Address Resolution Protocol (ARP)
//!
//! Hosts are discovered passively from ARP traffic and given a random ghost
//! MAC. A spoof group poisons the caches of two host sets so each side
//! resolves the other to its ghost; the IP-layer relay then rewrites those
//! frames and forwards them to the real host.
//!
//! ## Packet Format (Ethernet/IPv4)
//!
//! ```text
//! +-------+-------+----+----+--------+---------+-----+---------+-----+
//! | HTYPE | PTYPE | HL | PL |  OPER  |   SHA   | SPA |   THA   | TPA |
//! |   2   |   2   | 1  | 1  |   2    |    6    |  4  |    6    |  4  |
//! +-------+-------+----+----+--------+---------+-----+---------+-----+
//! ```

pub mod attack;
pub mod packet;
pub mod protocol;
pub mod spoof;

#[cfg(test)]
mod tests;

pub use attack::scan_targets;
pub use packet::{ArpOpcode, ArpPacket};
pub use protocol::{ArpConfig, ArpModule};
pub use spoof::{Host, Relay, SpoofGroup, SpoofId, SpoofPair, SpoofTable};
