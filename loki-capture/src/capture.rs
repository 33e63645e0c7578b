//! Frame sources and the capture thread
//!
//! A [`FrameSource`] is polled, never blocked on: a live source reports
//! [`CaptureEvent::Idle`] when nothing is pending, and the [`CaptureRunner`]
//! sleeps one poll interval before asking again. That keeps a stop request
//! responsive without spinning the CPU.

use loki_core::{Error, Frame, Result};
use pcap::{Active, Capture, Device, Offline};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

use crate::interface::get_interface;
use crate::stats::{CaptureStats, StatsAccumulator};

/// Default snapshot length (maximum bytes per packet)
pub const DEFAULT_SNAPLEN: i32 = 65535;

/// Default delay between polls of an idle source
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for packet capture
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Maximum bytes to capture per packet
    pub snaplen: i32,
    /// Sleep between polls when the source has nothing pending
    pub poll_interval: Duration,
    /// Enable promiscuous mode
    pub promiscuous: bool,
    /// Buffer size (0 = default)
    pub buffer_size: i32,
    /// Optional BPF filter applied to the source
    pub filter: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            snaplen: DEFAULT_SNAPLEN,
            poll_interval: DEFAULT_POLL_INTERVAL,
            promiscuous: true,
            buffer_size: 0,
            filter: None,
        }
    }
}

/// What to capture from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureTarget {
    /// A live interface, by name
    Live(String),
    /// A pcap file
    Offline(PathBuf),
}

/// Result of one poll
#[derive(Debug)]
pub enum CaptureEvent {
    /// A frame was read
    Frame(Frame),
    /// Nothing pending right now
    Idle,
    /// The source has ended (end of file)
    Exhausted,
}

/// Something that yields captured frames
pub trait FrameSource: Send {
    fn poll_frame(&mut self) -> Result<CaptureEvent>;

    /// Human readable description for logs
    fn describe(&self) -> String;
}

fn frame_from_packet(packet: pcap::Packet<'_>) -> Frame {
    let ts = packet.header.ts;
    let timestamp = UNIX_EPOCH
        + Duration::from_secs(ts.tv_sec as u64)
        + Duration::from_micros(ts.tv_usec as u64);
    Frame::captured(
        timestamp,
        packet.data.to_vec(),
        packet.header.len as usize,
    )
}

/// Non-blocking capture on a live interface
pub struct LiveCapture {
    interface: String,
    capture: Capture<Active>,
}

impl LiveCapture {
    pub fn open(interface: &str, config: &CaptureConfig) -> Result<Self> {
        let info = get_interface(interface)?;
        if !info.is_up {
            return Err(Error::Capture(format!(
                "Interface '{}' is not up",
                interface
            )));
        }

        debug!("Initializing pcap capture on {}", interface);

        let device = Device::from(interface);
        let mut capture = Capture::from_device(device)
            .map_err(|e| Error::Capture(format!("Failed to create capture: {}", e)))?
            .promisc(config.promiscuous)
            .snaplen(config.snaplen)
            .timeout(1)
            .immediate_mode(true);

        if config.buffer_size > 0 {
            capture = capture.buffer_size(config.buffer_size);
        }

        let mut capture = capture
            .open()
            .map_err(|e| match e {
                pcap::Error::PcapError(ref msg) if msg.contains("ermission") => {
                    Error::InsufficientPrivileges(format!("{}: {}", interface, msg))
                }
                other => Error::Capture(format!("Failed to open capture: {}", other)),
            })?
            .setnonblock()
            .map_err(|e| Error::Capture(format!("Failed to set non-blocking mode: {}", e)))?;

        if let Some(filter) = config.filter.as_deref() {
            capture
                .filter(filter, true)
                .map_err(|e| Error::Capture(format!("Failed to apply filter: {}", e)))?;
            debug!("Applied filter: {}", filter);
        }

        info!("Capture initialized on {}", interface);
        Ok(Self {
            interface: interface.to_string(),
            capture,
        })
    }
}

impl FrameSource for LiveCapture {
    fn poll_frame(&mut self) -> Result<CaptureEvent> {
        match self.capture.next_packet() {
            Ok(packet) => Ok(CaptureEvent::Frame(frame_from_packet(packet))),
            Err(pcap::Error::TimeoutExpired) => Ok(CaptureEvent::Idle),
            Err(e) => Err(Error::Capture(format!("Packet capture error: {}", e))),
        }
    }

    fn describe(&self) -> String {
        format!("live:{}", self.interface)
    }
}

/// Capture replayed from a pcap file
pub struct OfflineCapture {
    path: PathBuf,
    capture: Capture<Offline>,
}

impl OfflineCapture {
    pub fn open(path: &Path, config: &CaptureConfig) -> Result<Self> {
        let mut capture = Capture::from_file(path).map_err(|e| {
            Error::Capture(format!("Failed to open {}: {}", path.display(), e))
        })?;

        if let Some(filter) = config.filter.as_deref() {
            capture
                .filter(filter, true)
                .map_err(|e| Error::Capture(format!("Failed to apply filter: {}", e)))?;
        }

        info!("Reading frames from {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            capture,
        })
    }
}

impl FrameSource for OfflineCapture {
    fn poll_frame(&mut self) -> Result<CaptureEvent> {
        match self.capture.next_packet() {
            Ok(packet) => Ok(CaptureEvent::Frame(frame_from_packet(packet))),
            Err(pcap::Error::NoMorePackets) => Ok(CaptureEvent::Exhausted),
            Err(e) => Err(Error::Capture(format!(
                "Error reading {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// Open the source named by `target`
pub fn open(target: &CaptureTarget, config: &CaptureConfig) -> Result<Box<dyn FrameSource>> {
    match target {
        CaptureTarget::Live(name) => Ok(Box::new(LiveCapture::open(name, config)?)),
        CaptureTarget::Offline(path) => Ok(Box::new(OfflineCapture::open(path, config)?)),
    }
}

/// How a capture thread ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Stopped on request
    Stopped,
    /// The source ran out of frames
    Exhausted,
    /// The source reported an error
    Failed(String),
}

/// Owns the capture thread that feeds frames to a sink
pub struct CaptureRunner {
    description: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<CaptureOutcome>>,
    outcome: Option<CaptureOutcome>,
    stats: StatsAccumulator,
}

impl CaptureRunner {
    /// Spawn the capture thread
    pub fn spawn<F>(
        mut source: Box<dyn FrameSource>,
        poll_interval: Duration,
        mut sink: F,
    ) -> Result<Self>
    where
        F: FnMut(Frame) + Send + 'static,
    {
        let description = source.describe();
        let stop = Arc::new(AtomicBool::new(false));
        let stats = StatsAccumulator::new();

        let thread_stop = Arc::clone(&stop);
        let thread_stats = stats.clone();
        let thread_desc = description.clone();

        let handle = thread::Builder::new()
            .name("loki-capture".to_string())
            .spawn(move || {
                info!("Starting packet capture on {}", thread_desc);
                let outcome = loop {
                    if thread_stop.load(Ordering::Acquire) {
                        break CaptureOutcome::Stopped;
                    }
                    match source.poll_frame() {
                        Ok(CaptureEvent::Frame(frame)) => {
                            thread_stats.record(frame.len());
                            sink(frame);
                        }
                        Ok(CaptureEvent::Idle) => thread::sleep(poll_interval),
                        Ok(CaptureEvent::Exhausted) => break CaptureOutcome::Exhausted,
                        Err(e) => {
                            error!("Packet capture error on {}: {}", thread_desc, e);
                            break CaptureOutcome::Failed(e.to_string());
                        }
                    }
                };
                info!(outcome = ?outcome, "Capture thread finished");
                outcome
            })?;

        Ok(Self {
            description,
            stop,
            handle: Some(handle),
            outcome: None,
            stats,
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// True once the thread has exited on its own or been stopped
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Ask the thread to stop and join it. Calling again returns the same outcome.
    pub fn stop(&mut self) -> CaptureOutcome {
        self.stop.store(true, Ordering::Release);
        self.join()
    }

    /// Join without requesting a stop (offline sources end on their own)
    pub fn wait(&mut self) -> CaptureOutcome {
        self.join()
    }

    fn join(&mut self) -> CaptureOutcome {
        if let Some(handle) = self.handle.take() {
            let outcome = handle.join().unwrap_or_else(|_| {
                warn!("Capture thread panicked");
                CaptureOutcome::Failed("capture thread panicked".to_string())
            });
            self.outcome = Some(outcome);
        }
        self.outcome.clone().unwrap_or(CaptureOutcome::Stopped)
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats.snapshot()
    }
}

impl Drop for CaptureRunner {
    fn drop(&mut self) {
        // Ensure the thread is gone when the runner is
        let _ = self.stop();
    }
}

/// Seconds since the epoch as a float, for log output
pub fn epoch_seconds(ts: SystemTime) -> f64 {
    ts.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
