//! EIGRP module: IP-layer hook feeding the owning task

use async_trait::async_trait;
use bytes::Bytes;
use loki_core::{
    ip_protocols, Error, Firewall, InjectorHandle, Interface, Layer, LayerHook, ModuleContext,
    ModuleHooks, PacketView, ProtocolModule, Result, Verdict,
};
use parking_lot::Mutex;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::attack::{EigrpCommand, EigrpPeer, EigrpWorker, Md5Key, ObservedPacket, Speaker, MODULE};
use super::packet::EigrpPacket;
use crate::runtime::{InboundFilter, Mailbox, SharedSettings, TaskHandle};

/// Beacon and peer sender interval
pub const DEFAULT_HOLD_TIME: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct EigrpConfig {
    pub asn: u32,
    pub hold_time: Duration,
    /// Hold time announced in the parameters TLV, in seconds
    pub advertised_hold_time: u16,
    pub auth: Option<Md5Key>,
    /// Drop inbound EIGRP locally while the module runs
    pub drop_inbound: bool,
}

impl Default for EigrpConfig {
    fn default() -> Self {
        Self {
            asn: 1,
            hold_time: DEFAULT_HOLD_TIME,
            advertised_hold_time: 15,
            auth: None,
            drop_inbound: true,
        }
    }
}

struct EigrpHook {
    mailbox: Mailbox<EigrpCommand>,
}

impl LayerHook for EigrpHook {
    fn check(&self, packet: &PacketView<'_>) -> Verdict {
        match packet.ip {
            Some(ip) if ip.protocol == ip_protocols::EIGRP => Verdict::MATCH,
            _ => Verdict::SKIP,
        }
    }

    fn handle(&self, packet: &PacketView<'_>) -> Result<()> {
        let Some(ip) = packet.ip else {
            return Ok(());
        };
        self.mailbox.send(EigrpCommand::Observed(ObservedPacket {
            src_mac: packet.ethernet.src,
            src_ip: ip.src,
            dst_ip: ip.dst,
            payload: Bytes::copy_from_slice(ip.payload),
        }));
        Ok(())
    }
}

pub struct EigrpModule {
    config: EigrpConfig,
    context: ModuleContext,
    settings: SharedSettings,
    task: Mutex<Option<TaskHandle<EigrpCommand>>>,
}

impl EigrpModule {
    pub fn new(config: EigrpConfig, context: ModuleContext) -> Self {
        Self {
            config,
            context,
            settings: SharedSettings::default(),
            task: Mutex::new(None),
        }
    }

    fn mailbox(&self) -> Result<Mailbox<EigrpCommand>> {
        self.task
            .lock()
            .as_ref()
            .map(TaskHandle::mailbox)
            .ok_or_else(|| Error::module_state(MODULE, "not running"))
    }

    /// Start or stop the multicast hello beacon
    pub fn set_hello(&self, active: bool) -> Result<()> {
        self.mailbox()?.send(EigrpCommand::SetHello(active));
        Ok(())
    }

    /// Hand a packet to a peer's sender; sent on its next cycle
    pub async fn update(&self, peer: Ipv4Addr, packet: EigrpPacket) -> Result<()> {
        let known = self
            .mailbox()?
            .request(|reply| EigrpCommand::Update(peer, packet, reply))
            .await?;
        if known {
            Ok(())
        } else {
            Err(Error::NotFound(format!("EIGRP peer {}", peer)))
        }
    }

    /// Tear a peer down with a goodbye hello
    pub async fn goodbye(&self, peer: Ipv4Addr) -> Result<()> {
        let known = self
            .mailbox()?
            .request(|reply| EigrpCommand::Goodbye(peer, reply))
            .await?;
        if known {
            Ok(())
        } else {
            Err(Error::NotFound(format!("EIGRP peer {}", peer)))
        }
    }

    /// Stop every peer sender
    pub fn clear(&self) -> Result<()> {
        self.mailbox()?.send(EigrpCommand::Clear);
        Ok(())
    }

    pub async fn peers(&self) -> Result<Vec<EigrpPeer>> {
        self.mailbox()?.request(EigrpCommand::Peers).await
    }
}

#[async_trait]
impl ProtocolModule for EigrpModule {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn hooks(&self) -> ModuleHooks {
        match self.mailbox() {
            Ok(mailbox) => ModuleHooks::new().with(Layer::Ip, Arc::new(EigrpHook { mailbox })),
            Err(_) => ModuleHooks::new(),
        }
    }

    async fn start(&self) -> Result<()> {
        if self.task.lock().is_some() {
            return Err(Error::module_state(MODULE, "already running"));
        }
        let settings = self.settings.snapshot();
        let (address, _) = settings.require_address(MODULE)?;
        let filter = if self.config.drop_inbound {
            InboundFilter::from_settings(MODULE, ip_protocols::EIGRP, &settings)
        } else {
            None
        };

        let speaker = Speaker {
            mac: settings.mac(),
            address,
            asn: self.config.asn,
            hold_time: self.config.advertised_hold_time,
            auth: self.config.auth.clone(),
            injector: settings.injector(MODULE),
        };
        let worker = EigrpWorker::new(speaker, self.context.clone(), filter);
        let period = self.config.hold_time;
        let task = TaskHandle::spawn(MODULE, move |inbox| worker.run(inbox, period));
        *self.task.lock() = Some(task);

        info!(module = MODULE, %address, asn = self.config.asn, "EIGRP module started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.shutdown().await?;
            info!(module = MODULE, "EIGRP module stopped");
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

    fn set_firewall(&self, firewall: Arc<dyn Firewall>) {
        self.settings.update(|s| s.firewall = Some(firewall));
    }
}
