//! MPLS label stacks (RFC 3032)
//!
//! Passive: every frame on ethertype 0x8847 or 0x8848 is decoded down to the
//! bottom of its label stack and folded into a per-flow label tree.

pub mod attack;
pub mod packet;
pub mod protocol;

pub use attack::{FlowKey, LabelNode, MplsFlow};
pub use packet::{is_mpls, LabelEntry, LabelStack};
pub use protocol::MplsModule;
