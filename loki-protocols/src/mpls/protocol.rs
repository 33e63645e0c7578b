//! MPLS module: decodes label stacks on the MPLS ethertypes

use async_trait::async_trait;
use loki_core::{
    Error, Layer, LayerHook, ModuleContext, ModuleHooks, PacketView, ProtocolModule, Result,
    Verdict,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

use super::attack::{FlowKey, MplsCommand, MplsFlow, MplsWorker, MODULE};
use super::packet::{is_mpls, LabelStack};
use crate::runtime::{Mailbox, TaskHandle};

struct MplsHook {
    mailbox: Mailbox<MplsCommand>,
}

impl LayerHook for MplsHook {
    fn check(&self, packet: &PacketView<'_>) -> Verdict {
        if is_mpls(packet.ethernet.ethertype) {
            Verdict::CLAIM
        } else {
            Verdict::SKIP
        }
    }

    fn handle(&self, packet: &PacketView<'_>) -> Result<()> {
        let (stack, _) = LabelStack::parse(packet.ethernet.payload)?;
        self.mailbox.send(MplsCommand::Observed {
            key: FlowKey {
                src: packet.ethernet.src,
                dst: packet.ethernet.dst,
            },
            stack,
            bytes: packet.frame.len(),
        });
        Ok(())
    }
}

/// Passive MPLS observer
pub struct MplsModule {
    context: ModuleContext,
    task: Mutex<Option<TaskHandle<MplsCommand>>>,
}

impl MplsModule {
    pub fn new(context: ModuleContext) -> Self {
        Self {
            context,
            task: Mutex::new(None),
        }
    }

    fn mailbox(&self) -> Result<Mailbox<MplsCommand>> {
        self.task
            .lock()
            .as_ref()
            .map(TaskHandle::mailbox)
            .ok_or_else(|| Error::module_state(MODULE, "not running"))
    }

    pub async fn flows(&self) -> Result<Vec<MplsFlow>> {
        self.mailbox()?.request(MplsCommand::Flows).await
    }

    pub fn clear(&self) -> Result<()> {
        self.mailbox()?.send(MplsCommand::Clear);
        Ok(())
    }
}

#[async_trait]
impl ProtocolModule for MplsModule {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn hooks(&self) -> ModuleHooks {
        match self.mailbox() {
            Ok(mailbox) => {
                ModuleHooks::new().with(Layer::Ethernet, Arc::new(MplsHook { mailbox }))
            }
            Err(_) => ModuleHooks::new(),
        }
    }

    async fn start(&self) -> Result<()> {
        if self.task.lock().is_some() {
            return Err(Error::module_state(MODULE, "already running"));
        }
        let worker = MplsWorker::new(self.context.clone());
        let task = TaskHandle::spawn(MODULE, move |inbox| worker.run(inbox));
        *self.task.lock() = Some(task);
        info!(module = MODULE, "MPLS module started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.shutdown().await?;
            info!(module = MODULE, "MPLS module stopped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loki_core::{ChangeKind, Frame, MacAddr, RecordingObserver, TracingLog};

    const A: MacAddr = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x0a]);
    const B: MacAddr = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x0b]);

    fn feed(module: &MplsModule, frame: &Frame) -> Result<()> {
        let view = PacketView::new(frame)?;
        let hooks = module.hooks();
        let hook = hooks.get(Layer::Ethernet).unwrap();
        assert_eq!(hook.check(&view), Verdict::CLAIM);
        hook.handle(&view)
    }

    fn labelled(src: MacAddr, dst: MacAddr, labels: &[(u32, u8, u8)]) -> Frame {
        Frame::new(
            LabelStack::from_labels(labels)
                .to_frame(dst, src, &[0x45; 20])
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_flows_and_label_tree() {
        let observer = Arc::new(RecordingObserver::new());
        let module = MplsModule::new(ModuleContext::new(Arc::new(TracingLog), observer.clone()));
        assert!(module.hooks().is_empty());
        module.start().await.unwrap();

        feed(&module, &labelled(A, B, &[(16, 0, 64), (100, 5, 64)])).unwrap();
        feed(&module, &labelled(A, B, &[(16, 0, 63), (100, 5, 63)])).unwrap();
        feed(&module, &labelled(A, B, &[(16, 0, 64), (101, 5, 64)])).unwrap();
        feed(&module, &labelled(B, A, &[(30, 0, 64)])).unwrap();

        let flows = module.flows().await.unwrap();
        assert_eq!(flows.len(), 2);
        let ab = flows.iter().find(|f| f.key.src == A).unwrap();
        assert_eq!(ab.paths(), vec![vec![16, 100], vec![16, 101]]);
        assert_eq!(ab.packets, 3);
        assert_eq!(ab.labels[&16].children[&100].entry.exp, 5);

        module.stop().await.unwrap();
        let kinds: Vec<ChangeKind> = observer
            .changes()
            .into_iter()
            .filter(|(table, _)| *table == "peer")
            .map(|(_, change)| change.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                ChangeKind::Added,
                ChangeKind::Updated,
                ChangeKind::Added,
                ChangeKind::Removed,
                ChangeKind::Removed
            ]
        );
        assert_eq!(observer.changes()[0].1.key, format!("{}->{}", A, B));
    }

    #[tokio::test]
    async fn test_bad_stack_rejected() {
        let module = MplsModule::new(ModuleContext::new(
            Arc::new(TracingLog),
            Arc::new(RecordingObserver::new()),
        ));
        module.start().await.unwrap();
        let mut data = labelled(A, B, &[(16, 0, 64)]).data().to_vec();
        data.truncate(16);
        assert!(feed(&module, &Frame::new(data)).is_err());
        assert!(module.flows().await.unwrap().is_empty());
        module.stop().await.unwrap();
    }
}
