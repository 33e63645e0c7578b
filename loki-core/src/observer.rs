//! Collaborator interfaces consumed by a presentation layer

use std::sync::Arc;

use tracing::info;

/// Destination for human-readable module log lines
pub trait LogSink: Send + Sync {
    fn log(&self, message: &str, module: &str);
}

/// Default sink: forwards to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl LogSink for TracingLog {
    fn log(&self, message: &str, module: &str) {
        info!(module = %module, "{}", message);
    }
}

/// What happened to a row in a module table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Updated,
    Removed,
}

/// A change notification; `key` is an opaque row id (MAC, router id, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub module: &'static str,
    pub key: String,
    pub kind: ChangeKind,
}

impl Change {
    pub fn new(module: &'static str, key: impl ToString, kind: ChangeKind) -> Self {
        Self {
            module,
            key: key.to_string(),
            kind,
        }
    }
}

/// Per-module data-change callbacks
pub trait ModuleObserver: Send + Sync {
    /// A host table row changed (ARP hosts, DTP switches)
    fn on_host_changed(&self, _change: &Change) {}
    /// A neighbor row changed (OSPF, IS-IS)
    fn on_neighbor_changed(&self, _change: &Change) {}
    /// A peer row changed (EIGRP peers, MPLS flows, VLAN tags)
    fn on_peer_changed(&self, _change: &Change) {}
}

/// Observer that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl ModuleObserver for NullObserver {}

/// Collaborators handed to a module at construction
#[derive(Clone)]
pub struct ModuleContext {
    pub log: Arc<dyn LogSink>,
    pub observer: Arc<dyn ModuleObserver>,
}

impl ModuleContext {
    pub fn new(log: Arc<dyn LogSink>, observer: Arc<dyn ModuleObserver>) -> Self {
        Self { log, observer }
    }
}

impl Default for ModuleContext {
    fn default() -> Self {
        Self {
            log: Arc::new(TracingLog),
            observer: Arc::new(NullObserver),
        }
    }
}

impl std::fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleContext").finish_non_exhaustive()
    }
}

/// Observer that records every change, for tests and simple front-ends
#[derive(Debug, Default)]
pub struct RecordingObserver {
    changes: parking_lot::Mutex<Vec<(&'static str, Change)>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of `(table, change)` pairs seen so far
    pub fn changes(&self) -> Vec<(&'static str, Change)> {
        self.changes.lock().clone()
    }

    fn record(&self, table: &'static str, change: &Change) {
        self.changes.lock().push((table, change.clone()));
    }
}

impl ModuleObserver for RecordingObserver {
    fn on_host_changed(&self, change: &Change) {
        self.record("host", change);
    }

    fn on_neighbor_changed(&self, change: &Change) {
        self.record("neighbor", change);
    }

    fn on_peer_changed(&self, change: &Change) {
        self.record("peer", change);
    }
}
