//! Loki Core Library
//!
//! This crate provides the fundamental traits, types, and error handling
//! shared by the Loki capture engine and its protocol modules.

pub mod error;
pub mod firewall;
pub mod frame;
pub mod inject;
pub mod interface;
pub mod module;
pub mod observer;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use firewall::{Firewall, IptablesFirewall};
pub use frame::{EthernetHeader, Frame, Ipv4Header, Layer, PacketView, Transport, TransportHeader};
pub use inject::{InjectionSlot, InjectorHandle, SEND_PACING};
pub use interface::{Interface, PnetLink, RawLink};
pub use module::{LayerHook, ModuleHooks, ProtocolModule, Verdict};
pub use observer::{
    Change, ChangeKind, LogSink, ModuleContext, ModuleObserver, NullObserver, RecordingObserver,
    TracingLog,
};
pub use types::*;
