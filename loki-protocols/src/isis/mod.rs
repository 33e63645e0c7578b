//! IS-IS (ISO 10589) link state routing
//!
//! Learns neighbors from LAN hellos and their LSPs, then joins the exchange
//! with padded hellos, LSPs advertising operator chosen networks and CSNPs.

pub mod attack;
pub mod packet;
pub mod protocol;


pub use attack::{IsisNeighbor, LearnedLsp};
pub use packet::{
    CompleteSequencePdu, IpReach, IsisLevel, IsisPdu, IsisTlv, LanHello, LinkStatePdu, LspEntry,
    SystemId, ALL_L1_IS, ALL_L2_IS,
};
pub use protocol::{IsisConfig, IsisModule};
