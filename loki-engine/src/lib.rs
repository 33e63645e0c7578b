//! Loki Engine
//!
//! The packet engine behind every Loki module:
//!
//! - **Dispatch registry**: per-layer chains of module hooks, published as
//!   immutable snapshots
//! - **Frame dispatcher**: Ethernet → IPv4 → TCP/UDP walk with per-layer
//!   short-circuit
//! - **Injection queue**: one writer thread draining per-module single-slot
//!   mailboxes onto a raw link
//! - **Session**: module lifecycle (configure, start, register / unregister,
//!   stop) and capture wiring
//!
//! # Example
//!
//! ```no_run
//! use loki_engine::{Session, SessionConfig};
//! use loki_capture::{open, CaptureConfig, CaptureTarget};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Session::new(SessionConfig::default(), None);
//! // session.start_module(Arc::new(SomeModule::new())).await?;
//!
//! let config = CaptureConfig::default();
//! let source = open(&CaptureTarget::Offline("dump.pcap".into()), &config)?;
//! let mut runner = session.spawn_capture(source, config.poll_interval)?;
//! runner.wait();
//!
//! session.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod dispatcher;
pub mod injector;
pub mod registry;
pub mod session;

pub use dispatcher::{DispatchOutcome, DispatchStats, FrameDispatcher};
pub use injector::{InjectionConfig, InjectionQueue, DEFAULT_DRAIN_INTERVAL};
pub use registry::{Chains, CheckEntry, DispatchRegistry};
pub use session::{ModuleInfo, Session, SessionConfig};
