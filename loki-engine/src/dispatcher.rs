//! Frame dispatcher
//!
//! Walks one frame through the Ethernet, IPv4 and TCP/UDP chains of the
//! registry snapshot. Within a layer entries run in registration order; a
//! matching entry whose verdict says `stop` ends processing of the frame, so
//! no later entry and no deeper layer sees it. Hook failures (errors and
//! panics) are logged and never interrupt the walk.

use loki_core::frame::{Ipv4Header, Transport, TransportHeader};
use loki_core::{ethertypes, Frame, Layer, PacketView, Verdict};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

use crate::registry::{CheckEntry, Chains, DispatchRegistry};

/// What happened to one frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Layers whose chain was evaluated, in order
    pub layers: Vec<Layer>,
    /// Number of handlers invoked
    pub handled: usize,
    /// Layer at which a stop verdict ended processing
    pub stopped_at: Option<Layer>,
    /// Handlers that returned an error or panicked
    pub failures: usize,
}

/// Counters over all dispatched frames
#[derive(Debug, Default)]
pub struct DispatchStats {
    pub frames: AtomicU64,
    pub malformed: AtomicU64,
    pub handled: AtomicU64,
    pub failures: AtomicU64,
}

pub struct FrameDispatcher {
    registry: Arc<DispatchRegistry>,
    stats: DispatchStats,
}

impl FrameDispatcher {
    pub fn new(registry: Arc<DispatchRegistry>) -> Self {
        Self {
            registry,
            stats: DispatchStats::default(),
        }
    }

    pub fn registry(&self) -> &Arc<DispatchRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Run one frame through the layer chains
    pub fn dispatch(&self, frame: &Frame) -> DispatchOutcome {
        self.stats.frames.fetch_add(1, Ordering::Relaxed);
        let chains = self.registry.snapshot();
        let mut outcome = DispatchOutcome::default();

        let mut view = match PacketView::new(frame) {
            Ok(view) => view,
            Err(e) => {
                self.malformed(&e);
                return outcome;
            }
        };

        if self.run_layer(&chains, Layer::Ethernet, &view, &mut outcome) {
            return self.finish(outcome);
        }

        if view.ethernet.ethertype != ethertypes::IPV4 {
            return self.finish(outcome);
        }
        let ip = match Ipv4Header::parse(view.ethernet.payload) {
            Ok(ip) => ip,
            Err(e) => {
                self.malformed(&e);
                return self.finish(outcome);
            }
        };
        view.ip = Some(ip);

        if self.run_layer(&chains, Layer::Ip, &view, &mut outcome) {
            return self.finish(outcome);
        }

        let Some(transport) = Transport::from_ip_protocol(ip.protocol) else {
            return self.finish(outcome);
        };
        match TransportHeader::parse(transport, ip.payload) {
            Ok(header) => view.transport = Some(header),
            Err(e) => {
                self.malformed(&e);
                return self.finish(outcome);
            }
        }

        let layer = match transport {
            Transport::Tcp => Layer::Tcp,
            Transport::Udp => Layer::Udp,
        };
        self.run_layer(&chains, layer, &view, &mut outcome);
        self.finish(outcome)
    }

    fn finish(&self, outcome: DispatchOutcome) -> DispatchOutcome {
        self.stats
            .handled
            .fetch_add(outcome.handled as u64, Ordering::Relaxed);
        self.stats
            .failures
            .fetch_add(outcome.failures as u64, Ordering::Relaxed);
        outcome
    }

    fn malformed(&self, error: &loki_core::Error) {
        self.stats.malformed.fetch_add(1, Ordering::Relaxed);
        debug!(error = %error, "Skipping undecodable frame");
    }

    /// Evaluate one chain; true when a stop verdict ended the frame
    fn run_layer(
        &self,
        chains: &Chains,
        layer: Layer,
        view: &PacketView<'_>,
        outcome: &mut DispatchOutcome,
    ) -> bool {
        outcome.layers.push(layer);

        for entry in chains.layer(layer) {
            let verdict = match catch_unwind(AssertUnwindSafe(|| entry.hook.check(view))) {
                Ok(verdict) => verdict,
                Err(_) => {
                    error!(module = entry.module, layer = %layer, "Hook predicate panicked");
                    outcome.failures += 1;
                    Verdict::SKIP
                }
            };

            if !verdict.matched {
                continue;
            }

            trace!(module = entry.module, layer = %layer, stop = verdict.stop, "Hook matched");
            outcome.handled += 1;
            self.run_handler(entry, layer, view, outcome);

            if verdict.stop {
                outcome.stopped_at = Some(layer);
                return true;
            }
        }

        false
    }

    fn run_handler(
        &self,
        entry: &CheckEntry,
        layer: Layer,
        view: &PacketView<'_>,
        outcome: &mut DispatchOutcome,
    ) {
        match catch_unwind(AssertUnwindSafe(|| entry.hook.handle(view))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(module = entry.module, layer = %layer, error = %e, "Hook handler failed");
                outcome.failures += 1;
            }
            Err(_) => {
                error!(module = entry.module, layer = %layer, "Hook handler panicked");
                outcome.failures += 1;
            }
        }
    }
}
