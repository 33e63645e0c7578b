//! 802.1Q module: walks VLAN tag stacks on the 0x8100 ethertype

use async_trait::async_trait;
use loki_core::{
    ethertypes, Error, Layer, LayerHook, ModuleContext, ModuleHooks, PacketView, ProtocolModule,
    Result, Verdict,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use super::attack::{Dot1qCommand, Dot1qWorker, TagNode, MODULE};
use super::packet::TagStack;
use crate::runtime::{Mailbox, TaskHandle};

struct Dot1qHook {
    mailbox: Mailbox<Dot1qCommand>,
}

impl LayerHook for Dot1qHook {
    fn check(&self, packet: &PacketView<'_>) -> Verdict {
        if packet.ethernet.ethertype == ethertypes::DOT1Q {
            Verdict::CLAIM
        } else {
            Verdict::SKIP
        }
    }

    fn handle(&self, packet: &PacketView<'_>) -> Result<()> {
        let (stack, _) = TagStack::parse(packet.ethernet.payload)?;
        self.mailbox.send(Dot1qCommand::Observed {
            src: packet.ethernet.src,
            dst: packet.ethernet.dst,
            stack,
        });
        Ok(())
    }
}

/// Passive VLAN tag observer
pub struct Dot1qModule {
    context: ModuleContext,
    task: Mutex<Option<TaskHandle<Dot1qCommand>>>,
}

impl Dot1qModule {
    pub fn new(context: ModuleContext) -> Self {
        Self {
            context,
            task: Mutex::new(None),
        }
    }

    fn mailbox(&self) -> Result<Mailbox<Dot1qCommand>> {
        self.task
            .lock()
            .as_ref()
            .map(TaskHandle::mailbox)
            .ok_or_else(|| Error::module_state(MODULE, "not running"))
    }

    /// The tag tree, outer tags at the root
    pub async fn tags(&self) -> Result<BTreeMap<u16, TagNode>> {
        self.mailbox()?.request(Dot1qCommand::Tags).await
    }

    pub fn clear(&self) -> Result<()> {
        self.mailbox()?.send(Dot1qCommand::Clear);
        Ok(())
    }
}

#[async_trait]
impl ProtocolModule for Dot1qModule {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn hooks(&self) -> ModuleHooks {
        match self.mailbox() {
            Ok(mailbox) => {
                ModuleHooks::new().with(Layer::Ethernet, Arc::new(Dot1qHook { mailbox }))
            }
            Err(_) => ModuleHooks::new(),
        }
    }

    async fn start(&self) -> Result<()> {
        if self.task.lock().is_some() {
            return Err(Error::module_state(MODULE, "already running"));
        }
        let worker = Dot1qWorker::new(self.context.clone());
        let task = TaskHandle::spawn(MODULE, move |inbox| worker.run(inbox));
        *self.task.lock() = Some(task);
        info!(module = MODULE, "802.1Q module started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.shutdown().await?;
            info!(module = MODULE, "802.1Q module stopped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dot1q::attack::tag_paths;
    use crate::dot1q::VlanTag;
    use loki_core::{ChangeKind, Frame, MacAddr, RecordingObserver, TracingLog};

    const A: MacAddr = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x0a]);
    const B: MacAddr = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x0b]);

    fn tagged(src: MacAddr, dst: MacAddr, ids: &[u16]) -> Frame {
        let tags = ids.iter().map(|id| VlanTag::new(*id, 1)).collect();
        Frame::new(
            TagStack::new(tags, ethertypes::IPV4)
                .to_frame(dst, src, &[0x45; 20])
                .unwrap(),
        )
    }

    fn feed(module: &Dot1qModule, frame: &Frame) -> Result<()> {
        let view = PacketView::new(frame)?;
        let hooks = module.hooks();
        let hook = hooks.get(Layer::Ethernet).unwrap();
        assert_eq!(hook.check(&view), Verdict::CLAIM);
        hook.handle(&view)
    }

    #[tokio::test]
    async fn test_tag_tree_reported() {
        let observer = Arc::new(RecordingObserver::new());
        let module = Dot1qModule::new(ModuleContext::new(Arc::new(TracingLog), observer.clone()));
        assert!(module.hooks().is_empty());
        module.start().await.unwrap();

        feed(&module, &tagged(A, B, &[100])).unwrap();
        feed(&module, &tagged(A, B, &[100, 200])).unwrap();
        feed(&module, &tagged(B, A, &[100, 200, 300])).unwrap();

        let tags = module.tags().await.unwrap();
        assert_eq!(tag_paths(&tags), vec![vec![100, 200, 300]]);
        assert_eq!(tags[&100].packets, 3);
        assert_eq!(tags[&100].tag.priority, 1);
        assert_eq!(tags[&100].children[&200].children[&300].src, B);

        module.stop().await.unwrap();
        assert!(module.hooks().is_empty());
        let changes: Vec<(String, ChangeKind)> = observer
            .changes()
            .into_iter()
            .filter(|(table, _)| *table == "peer")
            .map(|(_, change)| (change.key, change.kind))
            .collect();
        assert_eq!(
            changes,
            vec![
                ("100".to_string(), ChangeKind::Added),
                ("100/200".to_string(), ChangeKind::Added),
                ("100/200/300".to_string(), ChangeKind::Added),
                ("100".to_string(), ChangeKind::Removed),
            ]
        );
    }

    #[tokio::test]
    async fn test_untagged_frames_skipped() {
        let module = Dot1qModule::new(ModuleContext::new(
            Arc::new(TracingLog),
            Arc::new(RecordingObserver::new()),
        ));
        module.start().await.unwrap();
        let frame = Frame::new(
            loki_packet::EthernetFrame::new(B, A, loki_packet::EtherType::ARP, vec![0; 28])
                .to_bytes(),
        );
        let view = PacketView::new(&frame).unwrap();
        assert_eq!(module.hooks().get(Layer::Ethernet).unwrap().check(&view), Verdict::SKIP);

        let mut data = tagged(A, B, &[7]).data().to_vec();
        data.truncate(16);
        assert!(feed(&module, &Frame::new(data)).is_err());
        assert!(module.tags().await.unwrap().is_empty());
        module.stop().await.unwrap();
    }
}
