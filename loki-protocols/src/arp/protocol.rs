//! ARP module: an Ethernet hook for ARP traffic and an IP hook relaying
//! traffic between spoofed hosts

use async_trait::async_trait;
use loki_core::{
    ethertypes, Error, InjectorHandle, Interface, Layer, LayerHook, MacAddr, ModuleContext,
    ModuleHooks, PacketView, ProtocolModule, Result, Verdict,
};
use parking_lot::{Mutex, RwLock};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, trace};

use super::attack::{ArpCommand, ArpWorker, MODULE};
use super::packet::ArpPacket;
use super::spoof::{Host, Relay, SpoofGroup, SpoofId, SpoofTable};
use crate::runtime::{Mailbox, SharedSettings, TaskHandle};

#[derive(Debug, Clone)]
pub struct ArpConfig {
    /// Replay interval of the forged replies
    pub period: Duration,
}

impl Default for ArpConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(30),
        }
    }
}

struct ArpHook {
    mailbox: Mailbox<ArpCommand>,
}

impl LayerHook for ArpHook {
    fn check(&self, packet: &PacketView<'_>) -> Verdict {
        if packet.ethernet.ethertype == ethertypes::ARP {
            Verdict::CLAIM
        } else {
            Verdict::SKIP
        }
    }

    fn handle(&self, packet: &PacketView<'_>) -> Result<()> {
        let arp = ArpPacket::parse(packet.ethernet.payload)?;
        self.mailbox.send(ArpCommand::Observed {
            source: packet.ethernet.src,
            packet: arp,
        });
        Ok(())
    }
}

/// Forwards frames addressed to a ghost MAC on to the real host
struct RelayHook {
    relay: Arc<RwLock<Relay>>,
    injector: InjectorHandle,
    mailbox: Mailbox<ArpCommand>,
}

impl LayerHook for RelayHook {
    fn check(&self, packet: &PacketView<'_>) -> Verdict {
        if packet.ip.is_some() && self.relay.read().matches(packet.ethernet.src, packet.ethernet.dst) {
            Verdict::MATCH
        } else {
            Verdict::SKIP
        }
    }

    fn handle(&self, packet: &PacketView<'_>) -> Result<()> {
        let rewritten = self.relay.read().rewrite(packet.frame.data());
        if let Some((frame, src, dst)) = rewritten {
            trace!(module = MODULE, %src, %dst, "relaying frame");
            self.injector.send(frame);
            self.mailbox.send(ArpCommand::Relayed { src, dst });
        }
        Ok(())
    }
}

pub struct ArpModule {
    config: ArpConfig,
    context: ModuleContext,
    settings: SharedSettings,
    relay: Arc<RwLock<Relay>>,
    task: Mutex<Option<TaskHandle<ArpCommand>>>,
}

impl ArpModule {
    pub fn new(config: ArpConfig, context: ModuleContext) -> Self {
        Self {
            config,
            context,
            settings: SharedSettings::default(),
            relay: Arc::new(RwLock::new(Relay::default())),
            task: Mutex::new(None),
        }
    }

    fn mailbox(&self) -> Result<Mailbox<ArpCommand>> {
        self.task
            .lock()
            .as_ref()
            .map(TaskHandle::mailbox)
            .ok_or_else(|| Error::module_state(MODULE, "not running"))
    }

    /// Pair every `upper` host with every `lower` host; both sets must be
    /// known hosts and disjoint
    pub async fn add_spoof(&self, upper: Vec<MacAddr>, lower: Vec<MacAddr>) -> Result<SpoofId> {
        self.mailbox()?
            .request(|reply| ArpCommand::AddSpoof {
                upper,
                lower,
                reply,
            })
            .await?
    }

    pub async fn activate(&self, id: SpoofId) -> Result<()> {
        self.mailbox()?
            .request(|reply| ArpCommand::Activate(id, reply))
            .await?
    }

    /// Stop spoofing and send the restoring replies
    pub async fn deactivate(&self, id: SpoofId) -> Result<()> {
        self.mailbox()?
            .request(|reply| ArpCommand::Deactivate(id, reply))
            .await?
    }

    pub async fn remove_spoof(&self, id: SpoofId) -> Result<()> {
        self.mailbox()?
            .request(|reply| ArpCommand::Remove(id, reply))
            .await?
    }

    /// Replay the forged replies now
    pub fn wakeup(&self) -> Result<()> {
        self.mailbox()?.send(ArpCommand::Wakeup);
        Ok(())
    }

    /// Send a who-has for every address of the local network
    pub async fn scan(&self) -> Result<usize> {
        self.mailbox()?.request(ArpCommand::Scan).await?
    }

    pub async fn hosts(&self) -> Result<Vec<Host>> {
        self.mailbox()?.request(ArpCommand::Hosts).await
    }

    pub async fn spoofs(&self) -> Result<Vec<SpoofGroup>> {
        self.mailbox()?.request(ArpCommand::Spoofs).await
    }
}

#[async_trait]
impl ProtocolModule for ArpModule {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn hooks(&self) -> ModuleHooks {
        let Ok(mailbox) = self.mailbox() else {
            return ModuleHooks::new();
        };
        let relay = RelayHook {
            relay: Arc::clone(&self.relay),
            injector: self.settings.snapshot().injector(MODULE),
            mailbox: mailbox.clone(),
        };
        ModuleHooks::new()
            .with(Layer::Ethernet, Arc::new(ArpHook { mailbox }))
            .with(Layer::Ip, Arc::new(relay))
    }

    async fn start(&self) -> Result<()> {
        if self.task.lock().is_some() {
            return Err(Error::module_state(MODULE, "already running"));
        }
        let settings = self.settings.snapshot();
        let mac = settings.mac();
        *self.relay.write() = Relay::default();

        let worker = ArpWorker {
            table: SpoofTable::new(mac),
            relay: Arc::clone(&self.relay),
            injector: settings.injector(MODULE),
            mac,
            address: settings.address,
            context: self.context.clone(),
        };
        let period = self.config.period;
        let task = TaskHandle::spawn(MODULE, move |inbox| worker.run(inbox, period));
        *self.task.lock() = Some(task);
        info!(module = MODULE, "ARP module started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.shutdown().await?;
            info!(module = MODULE, "ARP module stopped");
        }
        Ok(())
    }

    fn set_address(&self, address: Ipv4Addr, mask: Ipv4Addr) {
        self.settings.update(|s| s.address = Some((address, mask)));
    }

    fn set_interface(&self, interface: &Interface) {
        let interface = interface.clone();
        self.settings.update(|s| s.interface = Some(interface));
    }

    fn set_injector(&self, injector: InjectorHandle) {
        self.settings.update(|s| s.injector = Some(injector));
    }
}
