//! IS-IS owning task: neighbor table plus the hello/LSP/CSNP beacon
//!
//! The beacon runs once per period and counts cycles. While enabled and with
//! at least one neighbor it multicasts a padded LAN hello every third cycle.
//! Once a neighbor has flooded an LSP, every change to the operator network
//! set is advertised in a fresh LSP with the next sequence number, and the
//! last LSP is summarised in a CSNP every ninth cycle.

use bytes::Bytes;
use ipnetwork::Ipv4Network;
use loki_core::{Change, ChangeKind, InjectorHandle, MacAddr, ModuleContext, Result, SEND_PACING};
use loki_packet::RawTlv;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::{Duration, SystemTime};
use tokio::sync::oneshot;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use super::packet::{
    format_id, tlv_types, CompleteSequencePdu, IpReach, IsNeighbor, IsisLevel, IsisPdu, IsisTlv,
    LanHello, LinkStatePdu, SystemId, DEFAULT_METRICS, NLPID_IPV4,
};
use crate::runtime::{Envelope, Inbox};

pub(crate) const MODULE: &str = "isis";

const HELLO_EVERY: u64 = 3;
const CSNP_EVERY: u64 = 9;
/// LLC and Ethernet header bytes taken out of the MTU
const FRAMING_OVERHEAD: usize = 3 + 14;

/// LSP learned from a neighbor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnedLsp {
    pub lsp_id: [u8; 8],
    pub sequence: u32,
    pub lifetime: u16,
    pub hostname: Option<String>,
    pub prefixes: Vec<IpReach>,
}

impl LearnedLsp {
    fn from_pdu(lsp: &LinkStatePdu) -> Self {
        Self {
            lsp_id: lsp.lsp_id,
            sequence: lsp.sequence,
            lifetime: lsp.lifetime,
            hostname: lsp.hostname().map(str::to_owned),
            prefixes: lsp.ip_reach().copied().collect(),
        }
    }
}

/// A router heard sending LAN hellos
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsisNeighbor {
    pub mac: MacAddr,
    pub system_id: SystemId,
    pub level: IsisLevel,
    pub areas: Vec<Bytes>,
    pub hold_time: u16,
    pub lsps: BTreeMap<[u8; 8], LearnedLsp>,
    pub last_seen: SystemTime,
}

pub enum IsisCommand {
    Observed { source: MacAddr, pdu: IsisPdu },
    SetHello(bool),
    /// Replies false when the network is already advertised
    AddNetwork(Ipv4Network, oneshot::Sender<bool>),
    /// Replies false for a network that is not advertised
    RemoveNetwork(Ipv4Network, oneshot::Sender<bool>),
    Networks(oneshot::Sender<Vec<Ipv4Network>>),
    Neighbors(oneshot::Sender<Vec<IsisNeighbor>>),
    OwnLsp(oneshot::Sender<Option<LinkStatePdu>>),
}

/// Local identity announced in hellos and LSPs
pub(crate) struct Identity {
    pub level: IsisLevel,
    pub system_id: SystemId,
    pub area: Bytes,
    pub hostname: String,
    pub hold_time: u16,
    pub mtu: usize,
    pub mac: MacAddr,
    pub address: Option<Ipv4Addr>,
}

pub(crate) struct IsisWorker {
    identity: Identity,
    injector: InjectorHandle,
    context: ModuleContext,
    neighbors: BTreeMap<MacAddr, IsisNeighbor>,
    networks: Vec<Ipv4Network>,
    networks_changed: bool,
    hello: bool,
    /// Set once a neighbor has flooded an LSP
    exchange: bool,
    sequence: u32,
    lsp: Option<LinkStatePdu>,
    cycle: u64,
}

impl IsisWorker {
    pub fn new(identity: Identity, injector: InjectorHandle, context: ModuleContext) -> Self {
        Self {
            identity,
            injector,
            context,
            neighbors: BTreeMap::new(),
            networks: Vec::new(),
            networks_changed: false,
            hello: false,
            exchange: false,
            sequence: 1,
            lsp: None,
            cycle: 0,
        }
    }

    pub async fn run(mut self, mut inbox: Inbox<IsisCommand>, period: Duration) {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                envelope = inbox.recv() => match envelope {
                    Some(Envelope::Command(command)) => self.handle(command),
                    Some(Envelope::Shutdown) | None => break,
                },
                _ = ticker.tick() => self.beacon().await,
            }
        }

        for mac in std::mem::take(&mut self.neighbors).into_keys() {
            self.context
                .observer
                .on_neighbor_changed(&Change::new(MODULE, mac, ChangeKind::Removed));
        }
        debug!(module = MODULE, "worker exiting");
    }

    fn handle(&mut self, command: IsisCommand) {
        match command {
            IsisCommand::Observed { source, pdu } => self.observe(source, pdu),
            IsisCommand::SetHello(active) => {
                if active != self.hello {
                    self.hello = active;
                    let state = if active { "activated" } else { "deactivated" };
                    self.context
                        .log
                        .log(&format!("ISIS: Hello thread {}", state), MODULE);
                }
            }
            IsisCommand::AddNetwork(network, reply) => {
                let added = !self.networks.contains(&network);
                if added {
                    self.networks.push(network);
                    self.networks_changed = true;
                }
                let _ = reply.send(added);
            }
            IsisCommand::RemoveNetwork(network, reply) => {
                let before = self.networks.len();
                self.networks.retain(|n| *n != network);
                let removed = self.networks.len() != before;
                if removed {
                    self.networks_changed = true;
                }
                let _ = reply.send(removed);
            }
            IsisCommand::Networks(reply) => {
                let _ = reply.send(self.networks.clone());
            }
            IsisCommand::Neighbors(reply) => {
                let _ = reply.send(self.neighbors.values().cloned().collect());
            }
            IsisCommand::OwnLsp(reply) => {
                let _ = reply.send(self.lsp.clone());
            }
        }
    }

    fn observe(&mut self, source: MacAddr, pdu: IsisPdu) {
        if source == self.identity.mac {
            return;
        }
        debug!(module = MODULE, %source, "{}", pdu);
        match pdu {
            IsisPdu::Hello(hello) => self.observe_hello(source, hello),
            IsisPdu::LinkState(lsp) => self.observe_lsp(source, &lsp),
            _ => {}
        }
    }

    fn observe_hello(&mut self, source: MacAddr, hello: LanHello) {
        if let Some(neighbor) = self.neighbors.get_mut(&source) {
            neighbor.hold_time = hello.hold_time;
            neighbor.last_seen = SystemTime::now();
            return;
        }
        info!(module = MODULE, peer = %source, system_id = %hello.source_id, "new neighbor");
        self.context
            .log
            .log(&format!("ISIS: Got new peer {}", source), MODULE);
        self.neighbors.insert(
            source,
            IsisNeighbor {
                mac: source,
                system_id: hello.source_id,
                level: hello.level,
                areas: hello.area_addresses().map(<[Bytes]>::to_vec).unwrap_or_default(),
                hold_time: hello.hold_time,
                lsps: BTreeMap::new(),
                last_seen: SystemTime::now(),
            },
        );
        self.context
            .observer
            .on_neighbor_changed(&Change::new(MODULE, source, ChangeKind::Added));
    }

    fn observe_lsp(&mut self, source: MacAddr, lsp: &LinkStatePdu) {
        let Some(neighbor) = self.neighbors.get_mut(&source) else {
            return;
        };
        let learned = LearnedLsp::from_pdu(lsp);
        debug!(
            module = MODULE,
            lsp = %format_id(&lsp.lsp_id),
            prefixes = learned.prefixes.len(),
            "learned LSP"
        );
        neighbor.lsps.insert(lsp.lsp_id, learned);
        neighbor.last_seen = SystemTime::now();
        self.context
            .observer
            .on_neighbor_changed(&Change::new(MODULE, source, ChangeKind::Updated));
        self.exchange = true;
    }

    async fn beacon(&mut self) {
        if self.hello && !self.neighbors.is_empty() && self.cycle % HELLO_EVERY == 0 {
            self.send(self.build_hello()).await;
        }

        if self.exchange && self.networks_changed {
            let lsp = self.build_lsp();
            if let Ok(lsp) = &lsp {
                self.context.log.log(
                    &format!("ISIS: Sending LSP seq {} with {} networks", lsp.sequence, self.networks.len()),
                    MODULE,
                );
                self.lsp = Some(lsp.clone());
                self.sequence = self.sequence.wrapping_add(1);
                self.networks_changed = false;
            }
            self.send(lsp.map(IsisPdu::LinkState)).await;
        }

        if self.cycle % CSNP_EVERY == 0 {
            if let Some(lsp) = &self.lsp {
                let csnp = CompleteSequencePdu::full_range(
                    self.identity.level,
                    self.identity.system_id,
                    vec![lsp.entry()],
                );
                self.send(Ok(IsisPdu::CompleteSequence(csnp))).await;
            }
        }

        self.cycle = self.cycle.wrapping_add(1);
    }

    async fn send(&self, pdu: Result<IsisPdu>) {
        let frame = pdu.and_then(|pdu| pdu.to_frame(self.identity.mac));
        if self.injector.send_rendered(frame) {
            time::sleep(SEND_PACING).await;
        }
    }

    fn common_tlvs(&self) -> (IsisTlv, IsisTlv) {
        (
            IsisTlv::AreaAddresses(vec![self.identity.area.clone()]),
            IsisTlv::ProtocolSupport(Bytes::from_static(&[NLPID_IPV4])),
        )
    }

    fn build_hello(&self) -> Result<IsisPdu> {
        let id = &self.identity;
        let (area, protocols) = self.common_tlvs();
        let mut hello = LanHello::new(id.level, id.system_id, id.hold_time)
            .add_tlv(protocols)
            .add_tlv(area);
        if let Some(address) = id.address {
            hello = hello.add_tlv(IsisTlv::IpInterfaceAddresses(vec![address]));
        }
        let hello = hello
            .add_tlv(IsisTlv::Other(RawTlv::new(
                tlv_types::RESTART_SIGNALING,
                Bytes::from_static(&[0, 0, 0]),
            )))
            .add_tlv(IsisTlv::IsNeighbors(self.neighbors.keys().copied().collect()))
            .padded(id.mtu.saturating_sub(FRAMING_OVERHEAD))?;
        Ok(IsisPdu::Hello(hello))
    }

    fn build_lsp(&self) -> Result<LinkStatePdu> {
        let id = &self.identity;
        let (area, protocols) = self.common_tlvs();
        let mut lsp = LinkStatePdu::new(id.level, id.system_id.lsp_id(), self.sequence)
            .add_tlv(area)
            .add_tlv(protocols)
            .add_tlv(IsisTlv::Hostname(id.hostname.clone()));
        if let Some(address) = id.address {
            lsp = lsp.add_tlv(IsisTlv::IpInterfaceAddresses(vec![address]));
        }
        let prefixes = self
            .networks
            .iter()
            .map(|n| IpReach::new(n.network(), n.mask()))
            .collect();
        lsp.add_tlv(IsisTlv::IpInternalReach(prefixes))
            .add_tlv(IsisTlv::IsReach {
                virtual_flag: 0,
                neighbors: vec![IsNeighbor {
                    metrics: DEFAULT_METRICS,
                    id: id.system_id.lan_id(1),
                }],
            })
            .seal()
    }
}
