//! Protocol modules for Loki
//!
//! Every module implements [`loki_core::ProtocolModule`]: it hands the
//! dispatcher a set of layer hooks while running and owns a single task that
//! holds all of its protocol state. Hooks only decode and forward; the task
//! updates tables, notifies observers and queues forged frames.
//!
//! - [`arp`] - host discovery, subnet scan, ARP spoofing with ghost MAC relay
//! - [`dot1q`] - passive 802.1Q tag stack walking into a VLAN tag tree
//! - [`dtp`] - trunk negotiation peers and TRUNK/ON poisoning
//! - [`eigrp`] - hello beacon, peer discovery, route injection, goodbyes
//! - [`isis`] - neighbor learning, hello/LSP/CSNP origination
//! - [`mpls`] - passive label stack decoding into per-flow label trees
//! - [`ospf`] - the neighbor adjacency state machine through FULL
//!
//! [`runtime`] holds the task plumbing shared by all of them.

pub mod arp;
pub mod dot1q;
pub mod dtp;
pub mod eigrp;
pub mod isis;
pub mod mpls;
pub mod ospf;
pub mod runtime;

pub use arp::{ArpConfig, ArpModule};
pub use dot1q::Dot1qModule;
pub use dtp::{DtpConfig, DtpModule};
pub use eigrp::{EigrpConfig, EigrpModule};
pub use isis::{IsisConfig, IsisModule};
pub use mpls::MplsModule;
pub use ospf::{OspfConfig, OspfModule};
