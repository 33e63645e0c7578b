//! IEEE 802.1Q VLAN tags
//!
//! Passive: every frame on ethertype 0x8100 has its tag stack walked down to
//! the inner ethertype and folded into one VLAN tag tree, outer tag at the
//! root.

pub mod attack;
pub mod packet;
pub mod protocol;

pub use attack::TagNode;
pub use packet::{TagStack, VlanTag};
pub use protocol::Dot1qModule;
