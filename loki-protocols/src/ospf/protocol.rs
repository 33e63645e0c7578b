//! OSPF module: IP-layer hook plus the owning task that runs the adjacency

use async_trait::async_trait;
use bytes::Bytes;
use ipnetwork::Ipv4Network;
use loki_core::{
    ip_protocols, Error, Firewall, InjectorHandle, Interface, Layer, LayerHook, ModuleContext,
    ModuleHooks, PacketView, ProtocolModule, Result, Verdict,
};
use parking_lot::Mutex;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::adjacency::{Adjacency, LocalRouter, Neighbor};
use super::attack::{ObservedPacket, OspfCommand, OspfWorker, MODULE};
use super::packet::auth_types;
use crate::runtime::{InboundFilter, Mailbox, SharedSettings, TaskHandle};

/// Sender cycle period
pub const SENDER_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct OspfConfig {
    pub area: u32,
    pub auth_type: u16,
    pub auth_data: u64,
    /// Hello interval in sender cycles; dead interval is four times this
    pub hello_interval: u16,
    pub mtu: u16,
    /// Drop inbound OSPF locally while the hello sender is on
    pub drop_inbound: bool,
    pub sender_interval: Duration,
}

impl Default for OspfConfig {
    fn default() -> Self {
        Self {
            area: 0,
            auth_type: auth_types::NONE,
            auth_data: 0,
            hello_interval: 10,
            mtu: 1500,
            drop_inbound: true,
            sender_interval: SENDER_INTERVAL,
        }
    }
}

struct OspfHook {
    mailbox: Mailbox<OspfCommand>,
}

impl LayerHook for OspfHook {
    fn check(&self, packet: &PacketView<'_>) -> Verdict {
        match packet.ip {
            Some(ip) if ip.protocol == ip_protocols::OSPF => Verdict::MATCH,
            _ => Verdict::SKIP,
        }
    }

    fn handle(&self, packet: &PacketView<'_>) -> Result<()> {
        let Some(ip) = packet.ip else {
            return Ok(());
        };
        self.mailbox.send(OspfCommand::Observed(ObservedPacket {
            src_mac: packet.ethernet.src,
            src_ip: ip.src,
            dst_ip: ip.dst,
            payload: Bytes::copy_from_slice(ip.payload),
        }));
        Ok(())
    }
}

pub struct OspfModule {
    config: OspfConfig,
    context: ModuleContext,
    settings: SharedSettings,
    task: Mutex<Option<TaskHandle<OspfCommand>>>,
}

impl OspfModule {
    pub fn new(config: OspfConfig, context: ModuleContext) -> Self {
        Self {
            config,
            context,
            settings: SharedSettings::default(),
            task: Mutex::new(None),
        }
    }

    fn mailbox(&self) -> Result<Mailbox<OspfCommand>> {
        self.task
            .lock()
            .as_ref()
            .map(TaskHandle::mailbox)
            .ok_or_else(|| Error::module_state(MODULE, "not running"))
    }

    /// Start or stop the hello sender (and the local drop rule with it)
    pub fn set_hello(&self, active: bool) -> Result<()> {
        self.mailbox()?.send(OspfCommand::SetHello(active));
        Ok(())
    }

    /// Queue a network for advertisement to FULL neighbors
    pub async fn add_network(&self, network: Ipv4Network) -> Result<bool> {
        self.mailbox()?
            .request(|reply| OspfCommand::AddNetwork(network, reply))
            .await
    }

    pub async fn remove_network(&self, network: Ipv4Network) -> Result<bool> {
        self.mailbox()?
            .request(|reply| OspfCommand::RemoveNetwork(network, reply))
            .await
    }

    /// Snapshot of the neighbor table
    pub async fn neighbors(&self) -> Result<Vec<Neighbor>> {
        self.mailbox()?.request(OspfCommand::Neighbors).await
    }
}

#[async_trait]
impl ProtocolModule for OspfModule {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn hooks(&self) -> ModuleHooks {
        match self.mailbox() {
            Ok(mailbox) => ModuleHooks::new().with(Layer::Ip, Arc::new(OspfHook { mailbox })),
            Err(_) => ModuleHooks::new(),
        }
    }

    async fn start(&self) -> Result<()> {
        if self.task.lock().is_some() {
            return Err(Error::module_state(MODULE, "already running"));
        }
        let settings = self.settings.snapshot();
        let (router_id, mask) = settings.require_address(MODULE)?;

        let filter = if self.config.drop_inbound {
            InboundFilter::from_settings(MODULE, ip_protocols::OSPF, &settings)
        } else {
            None
        };

        let worker = OspfWorker {
            adjacency: Adjacency::new(LocalRouter {
                router_id,
                mask,
                area: self.config.area,
                auth_type: self.config.auth_type,
                auth_data: self.config.auth_data,
                hello_interval: self.config.hello_interval,
                mtu: self.config.mtu,
            }),
            injector: settings.injector(MODULE),
            mac: settings.mac(),
            context: self.context.clone(),
            filter,
        };
        let period = self.config.sender_interval;
        let task = TaskHandle::spawn(MODULE, move |inbox| worker.run(inbox, period));
        *self.task.lock() = Some(task);

        info!(module = MODULE, router_id = %router_id, "OSPF module started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.shutdown().await?;
            info!(module = MODULE, "OSPF module stopped");
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
