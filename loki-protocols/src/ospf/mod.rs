//! OSPFv2 adjacency spoofing (RFC 2328)
//!
//! The module answers hellos from routers on the segment, walks each neighbor
//! through database exchange up to FULL and can then advertise operator
//! networks as router-LSAs.

pub mod adjacency;
pub mod attack;
pub mod packet;
pub mod protocol;

#[cfg(test)]
mod tests;

pub use adjacency::{
    local_role, Adjacency, LocalRouter, Neighbor, NeighborEvent, NeighborState, Role,
};
pub use attack::render_frame;
pub use packet::{
    OspfLsa, OspfLsaHeader, OspfLsaType, OspfPacket, OspfPacketType, OSPF_MULTICAST_ALL_SPF,
    OSPF_PROTOCOL,
};
pub use protocol::{OspfConfig, OspfModule};
