//! Frame capture for Loki
//!
//! This crate turns a live interface or a pcap file into a stream of
//! [`loki_core::Frame`]s delivered on a dedicated thread.
//!
//! ## Features
//!
//! - **Live capture**: non-blocking pcap handle polled on a short fixed interval
//! - **Offline capture**: finite replay of a pcap file that ends with a distinct outcome
//! - **BPF Filters**: per-module filter expressions
//! - **Statistics**: frame and byte counters with rates
//!
//! ## Example
//!
//! ```no_run
//! use loki_capture::{open, CaptureConfig, CaptureRunner, CaptureTarget};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CaptureConfig::default();
//! let source = open(&CaptureTarget::Live("eth0".into()), &config)?;
//! let mut runner = CaptureRunner::spawn(source, config.poll_interval, |frame| {
//!     println!("Got frame: {} bytes", frame.len());
//! })?;
//!
//! // Later, stop the capture
//! runner.stop();
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod filters;
pub mod interface;
pub mod stats;

// Re-export main types
pub use capture::{
    open, CaptureConfig, CaptureEvent, CaptureOutcome, CaptureRunner, CaptureTarget, FrameSource,
    LiveCapture, OfflineCapture,
};
pub use interface::{default_interface, get_interface, list_interfaces, InterfaceInfo};
pub use stats::{CaptureStats, StatsAccumulator};
