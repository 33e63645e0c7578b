//! MPLS owning task: per-flow label trees built from observed stacks
//!
//! A flow is one source MAC to destination MAC direction. Each flow keeps a
//! tree of the label paths seen on it, outermost label at the root.

use loki_core::{Change, ChangeKind, MacAddr, ModuleContext};
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;
use tokio::sync::oneshot;
use tracing::{debug, info};

use super::packet::{LabelEntry, LabelStack};
use crate::runtime::{Envelope, Inbox};

pub(crate) const MODULE: &str = "mpls";

/// Flow key: source and destination MAC
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlowKey {
    pub src: MacAddr,
    pub dst: MacAddr,
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.src, self.dst)
    }
}

/// One label in a flow's tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelNode {
    /// Entry as first seen at this position
    pub entry: LabelEntry,
    pub packets: u64,
    pub children: BTreeMap<u32, LabelNode>,
}

impl LabelNode {
    fn new(entry: LabelEntry) -> Self {
        Self {
            entry,
            packets: 0,
            children: BTreeMap::new(),
        }
    }
}

/// Insert a stack below `level`; true when a new label path appeared
fn insert_path(level: &mut BTreeMap<u32, LabelNode>, entries: &[LabelEntry]) -> bool {
    let Some((first, rest)) = entries.split_first() else {
        return false;
    };
    let mut created = false;
    let node = level.entry(first.label).or_insert_with(|| {
        created = true;
        LabelNode::new(*first)
    });
    node.packets += 1;
    insert_path(&mut node.children, rest) || created
}

fn collect_paths(level: &BTreeMap<u32, LabelNode>, prefix: &mut Vec<u32>, out: &mut Vec<Vec<u32>>) {
    for (label, node) in level {
        prefix.push(*label);
        if node.children.is_empty() {
            out.push(prefix.clone());
        } else {
            collect_paths(&node.children, prefix, out);
        }
        prefix.pop();
    }
}

/// Labelled traffic seen between two stations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MplsFlow {
    pub key: FlowKey,
    pub labels: BTreeMap<u32, LabelNode>,
    pub packets: u64,
    pub bytes: u64,
    /// Packets carrying more than one label
    pub stacked: u64,
    pub last_seen: SystemTime,
}

impl MplsFlow {
    fn new(key: FlowKey) -> Self {
        Self {
            key,
            labels: BTreeMap::new(),
            packets: 0,
            bytes: 0,
            stacked: 0,
            last_seen: SystemTime::now(),
        }
    }

    fn record(&mut self, stack: &LabelStack, bytes: usize) -> bool {
        self.packets += 1;
        self.bytes += bytes as u64;
        if stack.entries.len() > 1 {
            self.stacked += 1;
        }
        self.last_seen = SystemTime::now();
        insert_path(&mut self.labels, &stack.entries)
    }

    /// Every distinct label path, outermost label first
    pub fn paths(&self) -> Vec<Vec<u32>> {
        let mut out = Vec::new();
        collect_paths(&self.labels, &mut Vec::new(), &mut out);
        out
    }
}

pub enum MplsCommand {
    Observed {
        key: FlowKey,
        stack: LabelStack,
        bytes: usize,
    },
    Flows(oneshot::Sender<Vec<MplsFlow>>),
    /// Forget every flow
    Clear,
}

pub(crate) struct MplsWorker {
    flows: BTreeMap<FlowKey, MplsFlow>,
    context: ModuleContext,
}

impl MplsWorker {
    pub fn new(context: ModuleContext) -> Self {
        Self {
            flows: BTreeMap::new(),
            context,
        }
    }

    pub async fn run(mut self, mut inbox: Inbox<MplsCommand>) {
        while let Some(Envelope::Command(command)) = inbox.recv().await {
            self.handle(command);
        }
        self.clear();
        debug!(module = MODULE, "worker exiting");
    }

    fn handle(&mut self, command: MplsCommand) {
        match command {
            MplsCommand::Observed { key, stack, bytes } => self.observe(key, &stack, bytes),
            MplsCommand::Flows(reply) => {
                let _ = reply.send(self.flows.values().cloned().collect());
            }
            MplsCommand::Clear => self.clear(),
        }
    }

    fn observe(&mut self, key: FlowKey, stack: &LabelStack, bytes: usize) {
        let kind = if self.flows.contains_key(&key) {
            ChangeKind::Updated
        } else {
            info!(module = MODULE, flow = %key, "new labelled flow");
            self.context
                .log
                .log(&format!("MPLS: Got new MPLS communication: {}", key), MODULE);
            ChangeKind::Added
        };
        let flow = self.flows.entry(key).or_insert_with(|| MplsFlow::new(key));
        if flow.record(stack, bytes) {
            debug!(module = MODULE, flow = %key, stack = %stack, "new label path");
            self.context
                .observer
                .on_peer_changed(&Change::new(MODULE, key, kind));
        }
    }

    fn clear(&mut self) {
        for key in std::mem::take(&mut self.flows).into_keys() {
            self.context
                .observer
                .on_peer_changed(&Change::new(MODULE, key, ChangeKind::Removed));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_tree_paths() {
        let key = FlowKey {
            src: MacAddr::zero(),
            dst: MacAddr::broadcast(),
        };
        let mut flow = MplsFlow::new(key);
        assert!(flow.record(&LabelStack::from_labels(&[(16, 0, 64), (100, 0, 64)]), 100));
        assert!(!flow.record(&LabelStack::from_labels(&[(16, 0, 63), (100, 0, 63)]), 100));
        assert!(flow.record(&LabelStack::from_labels(&[(16, 0, 64), (200, 0, 64)]), 100));
        assert!(flow.record(&LabelStack::from_labels(&[(17, 0, 64)]), 60));

        assert_eq!(flow.paths(), vec![vec![16, 100], vec![16, 200], vec![17]]);
        assert_eq!(flow.packets, 4);
        assert_eq!(flow.stacked, 3);
        assert_eq!(flow.bytes, 360);
        let root = &flow.labels[&16];
        assert_eq!(root.packets, 3);
        // first seen TTL is kept
        assert_eq!(root.children[&100].entry.ttl, 64);
    }
}
