//! IS-IS module: claims frames sent to the all-IS multicast addresses

use async_trait::async_trait;
use bytes::Bytes;
use ipnetwork::Ipv4Network;
use loki_core::{
    Error, InjectorHandle, Interface, Layer, LayerHook, ModuleContext, ModuleHooks, PacketView,
    ProtocolModule, Result, Verdict,
};
use parking_lot::Mutex;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::attack::{Identity, IsisCommand, IsisNeighbor, IsisWorker, MODULE};
use super::packet::{IsisLevel, IsisPdu, LinkStatePdu, SystemId, ALL_L1_IS, ALL_L2_IS};
use crate::runtime::{Mailbox, SharedSettings, TaskHandle};

#[derive(Debug, Clone)]
pub struct IsisConfig {
    pub level: IsisLevel,
    /// Area address without its length prefix
    pub area: Bytes,
    pub system_id: SystemId,
    pub hostname: String,
    /// Hold time announced in hellos, in seconds
    pub hold_time: u16,
    /// Frame size hellos are padded to
    pub mtu: usize,
    /// Beacon cycle
    pub period: Duration,
}

impl Default for IsisConfig {
    fn default() -> Self {
        Self {
            level: IsisLevel::L1,
            area: Bytes::from_static(&[0x01, 0x00, 0x02]),
            system_id: SystemId(*b"loki4u"),
            hostname: "loki4u".to_string(),
            hold_time: 30,
            mtu: 1514,
            period: Duration::from_secs(1),
        }
    }
}

impl IsisConfig {
    fn validate(&self) -> Result<()> {
        if self.area.is_empty() || self.area.len() > 13 {
            return Err(Error::invalid_parameter(
                "area".to_string(),
                format!("{} octets, expected 1 to 13", self.area.len()),
            ));
        }
        if !(64..=1514).contains(&self.mtu) {
            return Err(Error::invalid_parameter(
                "mtu".to_string(),
                format!("{} out of range 64..=1514", self.mtu),
            ));
        }
        if self.hostname.len() > 255 {
            return Err(Error::invalid_parameter("hostname", "longer than 255 octets"));
        }
        Ok(())
    }
}

struct IsisHook {
    mailbox: Mailbox<IsisCommand>,
}

impl LayerHook for IsisHook {
    fn check(&self, packet: &PacketView<'_>) -> Verdict {
        let dst = packet.ethernet.dst;
        if dst == ALL_L1_IS || dst == ALL_L2_IS {
            Verdict::CLAIM
        } else {
            Verdict::SKIP
        }
    }

    fn handle(&self, packet: &PacketView<'_>) -> Result<()> {
        let pdu = IsisPdu::from_ethernet(&packet.ethernet)?;
        self.mailbox.send(IsisCommand::Observed {
            source: packet.ethernet.src,
            pdu,
        });
        Ok(())
    }
}

pub struct IsisModule {
    config: IsisConfig,
    context: ModuleContext,
    settings: SharedSettings,
    task: Mutex<Option<TaskHandle<IsisCommand>>>,
}

impl IsisModule {
    pub fn new(config: IsisConfig, context: ModuleContext) -> Self {
        Self {
            config,
            context,
            settings: SharedSettings::default(),
            task: Mutex::new(None),
        }
    }

    fn mailbox(&self) -> Result<Mailbox<IsisCommand>> {
        self.task
            .lock()
            .as_ref()
            .map(TaskHandle::mailbox)
            .ok_or_else(|| Error::module_state(MODULE, "not running"))
    }

    /// Start or stop the hello beacon
    pub fn set_hello(&self, active: bool) -> Result<()> {
        self.mailbox()?.send(IsisCommand::SetHello(active));
        Ok(())
    }

    /// Advertise a network in the next LSP
    pub async fn add_network(&self, network: Ipv4Network) -> Result<()> {
        let added = self
            .mailbox()?
            .request(|reply| IsisCommand::AddNetwork(network, reply))
            .await?;
        if added {
            Ok(())
        } else {
            Err(Error::AlreadyExists(format!("IS-IS network {}", network)))
        }
    }

    pub async fn remove_network(&self, network: Ipv4Network) -> Result<()> {
        let removed = self
            .mailbox()?
            .request(|reply| IsisCommand::RemoveNetwork(network, reply))
            .await?;
        if removed {
            Ok(())
        } else {
            Err(Error::NotFound(format!("IS-IS network {}", network)))
        }
    }

    pub async fn networks(&self) -> Result<Vec<Ipv4Network>> {
        self.mailbox()?.request(IsisCommand::Networks).await
    }

    pub async fn neighbors(&self) -> Result<Vec<IsisNeighbor>> {
        self.mailbox()?.request(IsisCommand::Neighbors).await
    }

    /// The LSP last originated, if any
    pub async fn own_lsp(&self) -> Result<Option<LinkStatePdu>> {
        self.mailbox()?.request(IsisCommand::OwnLsp).await
    }
}

#[async_trait]
impl ProtocolModule for IsisModule {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn hooks(&self) -> ModuleHooks {
        match self.mailbox() {
            Ok(mailbox) => {
                ModuleHooks::new().with(Layer::Ethernet, Arc::new(IsisHook { mailbox }))
            }
            Err(_) => ModuleHooks::new(),
        }
    }

    async fn start(&self) -> Result<()> {
        if self.task.lock().is_some() {
            return Err(Error::module_state(MODULE, "already running"));
        }
        self.config.validate()?;
        let settings = self.settings.snapshot();
        let identity = Identity {
            level: self.config.level,
            system_id: self.config.system_id,
            area: self.config.area.clone(),
            hostname: self.config.hostname.clone(),
            hold_time: self.config.hold_time,
            mtu: self.config.mtu,
            mac: settings.mac(),
            address: settings.address.map(|(address, _)| address),
        };
        let worker = IsisWorker::new(identity, settings.injector(MODULE), self.context.clone());
        let period = self.config.period;
        let task = TaskHandle::spawn(MODULE, move |inbox| worker.run(inbox, period));
        *self.task.lock() = Some(task);

        info!(
            module = MODULE,
            level = %self.config.level,
            system_id = %self.config.system_id,
            "IS-IS module started"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.shutdown().await?;
            info!(module = MODULE, "IS-IS module stopped");
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
