//! 802.1Q owning task: the VLAN tag tree
//!
//! One tree per module instance. A node is keyed by VLAN id below its parent
//! tag and remembers the first frame that carried it.

use loki_core::{Change, ChangeKind, MacAddr, ModuleContext};
use std::collections::BTreeMap;
use tokio::sync::oneshot;
use tracing::{debug, info};

use super::packet::{TagStack, VlanTag};
use crate::runtime::{Envelope, Inbox};

pub(crate) const MODULE: &str = "dot1q";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagNode {
    /// Tag as first seen at this position
    pub tag: VlanTag,
    pub src: MacAddr,
    pub dst: MacAddr,
    pub packets: u64,
    pub children: BTreeMap<u16, TagNode>,
}

/// Fold `tags` into the tree below `level`; new nodes are reported through
/// `created` as their id path
fn insert_tags(
    level: &mut BTreeMap<u16, TagNode>,
    tags: &[VlanTag],
    src: MacAddr,
    dst: MacAddr,
    path: &mut Vec<u16>,
    created: &mut Vec<(Vec<u16>, VlanTag)>,
) {
    let Some((first, rest)) = tags.split_first() else {
        return;
    };
    path.push(first.id);
    let node = level.entry(first.id).or_insert_with(|| {
        created.push((path.clone(), *first));
        TagNode {
            tag: *first,
            src,
            dst,
            packets: 0,
            children: BTreeMap::new(),
        }
    });
    node.packets += 1;
    insert_tags(&mut node.children, rest, src, dst, path, created);
}

/// Every distinct id path, outer tag first
pub fn tag_paths(level: &BTreeMap<u16, TagNode>) -> Vec<Vec<u16>> {
    fn walk(level: &BTreeMap<u16, TagNode>, prefix: &mut Vec<u16>, out: &mut Vec<Vec<u16>>) {
        for (id, node) in level {
            prefix.push(*id);
            if node.children.is_empty() {
                out.push(prefix.clone());
            } else {
                walk(&node.children, prefix, out);
            }
            prefix.pop();
        }
    }
    let mut out = Vec::new();
    walk(level, &mut Vec::new(), &mut out);
    out
}

fn path_key(path: &[u16]) -> String {
    path.iter().map(u16::to_string).collect::<Vec<_>>().join("/")
}

pub enum Dot1qCommand {
    Observed {
        src: MacAddr,
        dst: MacAddr,
        stack: TagStack,
    },
    Tags(oneshot::Sender<BTreeMap<u16, TagNode>>),
    Clear,
}

pub(crate) struct Dot1qWorker {
    tags: BTreeMap<u16, TagNode>,
    context: ModuleContext,
}

impl Dot1qWorker {
    pub fn new(context: ModuleContext) -> Self {
        Self {
            tags: BTreeMap::new(),
            context,
        }
    }

    pub async fn run(mut self, mut inbox: Inbox<Dot1qCommand>) {
        while let Some(Envelope::Command(command)) = inbox.recv().await {
            match command {
                Dot1qCommand::Observed { src, dst, stack } => self.observe(src, dst, &stack),
                Dot1qCommand::Tags(reply) => {
                    let _ = reply.send(self.tags.clone());
                }
                Dot1qCommand::Clear => self.clear(),
            }
        }
        self.clear();
        debug!(module = MODULE, "worker exiting");
    }

    fn observe(&mut self, src: MacAddr, dst: MacAddr, stack: &TagStack) {
        let mut created = Vec::new();
        insert_tags(&mut self.tags, &stack.tags, src, dst, &mut Vec::new(), &mut created);
        for (path, tag) in created {
            info!(module = MODULE, path = %path_key(&path), %src, %dst, "new tag");
            self.context.log.log(
                &format!("DOT1Q: Got new tag {}: {} -> {}", tag.id, src, dst),
                MODULE,
            );
            self.context
                .observer
                .on_peer_changed(&Change::new(MODULE, path_key(&path), ChangeKind::Added));
        }
    }

    fn clear(&mut self) {
        for id in std::mem::take(&mut self.tags).into_keys() {
            self.context
                .observer
                .on_peer_changed(&Change::new(MODULE, id, ChangeKind::Removed));
        }
    }
}
