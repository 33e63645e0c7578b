//! Injection queue: one writer thread draining every module's mailbox
//!
//! Modules hold an [`InjectorHandle`] each; the writer thread polls all slots
//! on a fixed interval and hands pending frames to the [`RawLink`]. The slots
//! are lossy by construction, so callers can rely on eventual delivery of the
//! most recent frame only.

use loki_core::{Error, InjectionSlot, InjectorHandle, RawLink, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default interval between two drains of the slots
pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct InjectionConfig {
    pub drain_interval: Duration,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            drain_interval: DEFAULT_DRAIN_INTERVAL,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicU64,
    failed: AtomicU64,
}

struct Mailbox {
    owner: Arc<str>,
    slot: InjectionSlot,
}

/// Owner of the writer thread and of every handle's slot
pub struct InjectionQueue {
    mailboxes: Arc<Mutex<Vec<Mailbox>>>,
    counters: Arc<Counters>,
    stop: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl InjectionQueue {
    /// Spawn the writer thread over `link`
    pub fn start(link: Box<dyn RawLink>, config: &InjectionConfig) -> Result<Self> {
        let mailboxes: Arc<Mutex<Vec<Mailbox>>> = Arc::new(Mutex::new(Vec::new()));
        let counters = Arc::new(Counters::default());
        let stop = Arc::new(AtomicBool::new(false));

        let worker = {
            let mailboxes = Arc::clone(&mailboxes);
            let counters = Arc::clone(&counters);
            let stop = Arc::clone(&stop);
            let interval = config.drain_interval;
            thread::Builder::new()
                .name("loki-inject".to_string())
                .spawn(move || drain_loop(link, mailboxes, counters, stop, interval))
                .map_err(|e| Error::Injection(format!("Failed to spawn writer thread: {}", e)))?
        };

        info!(interval = ?config.drain_interval, "Injection queue started");

        Ok(Self {
            mailboxes,
            counters,
            stop,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Create a new handle whose slot the writer thread drains
    pub fn handle(&self, owner: &str) -> InjectorHandle {
        let handle = InjectorHandle::new(owner);
        self.mailboxes.lock().push(Mailbox {
            owner: Arc::from(owner),
            slot: handle.slot(),
        });
        debug!(module = owner, "Injector handle created");
        handle
    }

    /// Frames handed to the link so far
    pub fn sent(&self) -> u64 {
        self.counters.sent.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }

    /// Halt the writer after its current iteration and join it
    ///
    /// Frames still pending in a slot are discarded. Safe to call repeatedly.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        if worker.join().is_err() {
            warn!("Injection writer thread panicked");
        }
        info!(
            sent = self.sent(),
            failed = self.failed(),
            "Injection queue stopped"
        );
    }
}

impl Drop for InjectionQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

fn drain_loop(
    mut link: Box<dyn RawLink>,
    mailboxes: Arc<Mutex<Vec<Mailbox>>>,
    counters: Arc<Counters>,
    stop: Arc<AtomicBool>,
    interval: Duration,
) {
    while !stop.load(Ordering::Relaxed) {
        let pending: Vec<(Arc<str>, bytes::Bytes)> = mailboxes
            .lock()
            .iter()
            .filter_map(|mailbox| {
                let frame = mailbox.slot.lock().take()?;
                Some((Arc::clone(&mailbox.owner), frame))
            })
            .collect();

        for (owner, frame) in pending {
            match link.transmit(&frame) {
                Ok(()) => {
                    counters.sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(module = %owner, error = %e, len = frame.len(), "Transmit failed");
                }
            }
        }

        thread::sleep(interval);
    }
}
