//! Capture counters shared between the capture thread and its owner

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Point-in-time view of a capture
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureStats {
    /// Frames handed to the sink
    pub frames: u64,
    /// Captured bytes of those frames
    pub bytes: u64,
    pub largest_frame: u64,
    pub elapsed: Duration,
}

impl CaptureStats {
    pub fn frame_rate(&self) -> f64 {
        per_second(self.frames, self.elapsed)
    }

    pub fn byte_rate(&self) -> f64 {
        per_second(self.bytes, self.elapsed)
    }
}

fn per_second(count: u64, elapsed: Duration) -> f64 {
    match elapsed.as_secs_f64() {
        secs if secs > 0.0 => count as f64 / secs,
        _ => 0.0,
    }
}

impl fmt::Display for CaptureStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames / {} bytes in {:.2}s ({:.1} frames/s, largest {} bytes)",
            self.frames,
            self.bytes,
            self.elapsed.as_secs_f64(),
            self.frame_rate(),
            self.largest_frame
        )
    }
}

#[derive(Debug, Default)]
struct Counters {
    frames: AtomicU64,
    bytes: AtomicU64,
    largest: AtomicU64,
}

/// Cloneable handle on one capture's counters
#[derive(Debug, Clone)]
pub struct StatsAccumulator {
    counters: Arc<Counters>,
    started: Instant,
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            started: Instant::now(),
        }
    }

    /// Count one captured frame of `len` bytes
    pub fn record(&self, len: usize) {
        let len = len as u64;
        self.counters.frames.fetch_add(1, Ordering::Relaxed);
        self.counters.bytes.fetch_add(len, Ordering::Relaxed);
        self.counters.largest.fetch_max(len, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CaptureStats {
        CaptureStats {
            frames: self.counters.frames.load(Ordering::Relaxed),
            bytes: self.counters.bytes.load(Ordering::Relaxed),
            largest_frame: self.counters.largest.load(Ordering::Relaxed),
            elapsed: self.started.elapsed(),
        }
    }
}

impl Default for StatsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
