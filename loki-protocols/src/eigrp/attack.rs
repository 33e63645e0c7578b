//! EIGRP owning task plus one sender task per discovered peer
//!
//! The main task multicasts the hello beacon once per hold time and turns
//! unicast packets addressed to the local router into peers. Each peer task
//! owns a single pending-message slot that it flushes once per hold time:
//! either the acknowledgment for the last reliable packet the peer sent, or
//! an operator supplied update.

use bytes::Bytes;
use loki_core::{Change, ChangeKind, InjectorHandle, MacAddr, ModuleContext, Result};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::{Duration, SystemTime};
use tokio::sync::oneshot;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::packet::{EigrpPacket, EIGRP_MULTICAST};
use crate::runtime::{Envelope, Inbox, InboundFilter, TaskHandle};

pub(crate) const MODULE: &str = "eigrp";

/// Shared key for keyed MD5 authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Md5Key {
    pub key_id: u32,
    pub key: Bytes,
}

/// An EIGRP datagram seen by the IP hook
#[derive(Debug, Clone)]
pub struct ObservedPacket {
    pub src_mac: MacAddr,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub payload: Bytes,
}

/// A router that sent us unicast EIGRP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EigrpPeer {
    pub address: Ipv4Addr,
    pub mac: MacAddr,
    /// Hold time from the peer's parameters, when it sent any
    pub hold_time: Option<u16>,
    pub last_seen: SystemTime,
}

pub enum EigrpCommand {
    Observed(ObservedPacket),
    SetHello(bool),
    /// Queue a packet for a peer; replies false for an unknown peer
    Update(Ipv4Addr, EigrpPacket, oneshot::Sender<bool>),
    Goodbye(Ipv4Addr, oneshot::Sender<bool>),
    /// Drop every peer
    Clear,
    Peers(oneshot::Sender<Vec<EigrpPeer>>),
}

pub enum PeerCommand {
    Input(EigrpPacket),
    Update(EigrpPacket),
}

/// Local identity used to sign and frame outgoing packets
#[derive(Clone)]
pub(crate) struct Speaker {
    pub mac: MacAddr,
    pub address: Ipv4Addr,
    pub asn: u32,
    pub hold_time: u16,
    pub auth: Option<Md5Key>,
    pub injector: InjectorHandle,
}

impl Speaker {
    fn render(&self, packet: EigrpPacket, dst_mac: MacAddr, dst_ip: Ipv4Addr) -> Result<Vec<u8>> {
        let packet = match &self.auth {
            Some(auth) => packet.authenticate(auth.key_id, &auth.key)?,
            None => packet,
        };
        packet.to_frame(self.mac, dst_mac, self.address, dst_ip)
    }

    fn send(&self, packet: EigrpPacket, dst_mac: MacAddr, dst_ip: Ipv4Addr) -> bool {
        self.injector.send_rendered(self.render(packet, dst_mac, dst_ip))
    }

    fn send_hello(&self) -> bool {
        self.send(
            EigrpPacket::hello(self.asn, self.hold_time),
            MacAddr::ipv4_multicast(EIGRP_MULTICAST),
            EIGRP_MULTICAST,
        )
    }
}

/// Sender for one peer
struct PeerSender {
    speaker: Speaker,
    address: Ipv4Addr,
    mac: MacAddr,
    pending: Option<EigrpPacket>,
    sequence: u32,
}

impl PeerSender {
    async fn run(mut self, mut inbox: Inbox<PeerCommand>, period: Duration) {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                envelope = inbox.recv() => match envelope {
                    Some(Envelope::Command(PeerCommand::Input(packet))) => {
                        if !packet.is_hello() {
                            self.pending = Some(EigrpPacket::ack_for(self.speaker.asn, packet.sequence));
                        }
                    }
                    Some(Envelope::Command(PeerCommand::Update(packet))) => self.pending = Some(packet),
                    Some(Envelope::Shutdown) | None => break,
                },
                _ = ticker.tick() => self.flush(),
            }
        }
        debug!(module = MODULE, peer = %self.address, "peer sender exiting");
    }

    fn flush(&mut self) {
        let Some(mut packet) = self.pending.take() else {
            return;
        };
        if !packet.is_hello() {
            packet.sequence = self.sequence;
            self.sequence = self.sequence.wrapping_add(1);
        }
        debug!(module = MODULE, peer = %self.address, "{}", packet);
        if !self.speaker.send(packet, self.mac, self.address) {
            warn!(
                module = MODULE,
                peer = %self.address,
                "Error while sending message, check arguments"
            );
        }
    }
}

struct PeerEntry {
    info: EigrpPeer,
    task: TaskHandle<PeerCommand>,
}

pub(crate) struct EigrpWorker {
    speaker: Speaker,
    peers: BTreeMap<Ipv4Addr, PeerEntry>,
    hello: bool,
    context: ModuleContext,
    filter: Option<InboundFilter>,
}

impl EigrpWorker {
    pub fn new(speaker: Speaker, context: ModuleContext, filter: Option<InboundFilter>) -> Self {
        Self {
            speaker,
            peers: BTreeMap::new(),
            hello: false,
            context,
            filter,
        }
    }

    pub async fn run(mut self, mut inbox: Inbox<EigrpCommand>, period: Duration) {
        if let Some(filter) = self.filter.as_mut() {
            filter.set(true, &self.context);
        }
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                envelope = inbox.recv() => match envelope {
                    Some(Envelope::Command(command)) => self.handle(command, period).await,
                    Some(Envelope::Shutdown) | None => break,
                },
                _ = ticker.tick() => {
                    if self.hello {
                        self.speaker.send_hello();
                    }
                }
            }
        }

        self.clear().await;
        if let Some(filter) = self.filter.as_mut() {
            filter.set(false, &self.context);
        }
        debug!(module = MODULE, "worker exiting");
    }

    async fn handle(&mut self, command: EigrpCommand, period: Duration) {
        match command {
            EigrpCommand::Observed(observed) => self.observe(observed, period),
            EigrpCommand::SetHello(active) => {
                if active != self.hello {
                    self.hello = active;
                    let state = if active { "started" } else { "stopped" };
                    self.context
                        .log
                        .log(&format!("EIGRP: Hello sender {}", state), MODULE);
                    if active {
                        self.speaker.send_hello();
                    }
                }
            }
            EigrpCommand::Update(address, packet, reply) => {
                let known = match self.peers.get(&address) {
                    Some(entry) => entry.task.mailbox().send(PeerCommand::Update(packet)),
                    None => false,
                };
                let _ = reply.send(known);
            }
            EigrpCommand::Goodbye(address, reply) => {
                let known = match self.peers.remove(&address) {
                    Some(entry) => {
                        let goodbye = EigrpPacket::goodbye(self.speaker.asn, self.speaker.hold_time);
                        self.speaker.send(goodbye, entry.info.mac, address);
                        self.context
                            .log
                            .log(&format!("EIGRP: Goodbye sent to {}", address), MODULE);
                        self.retire(address, entry).await;
                        true
                    }
                    None => false,
                };
                let _ = reply.send(known);
            }
            EigrpCommand::Clear => self.clear().await,
            EigrpCommand::Peers(reply) => {
                let _ = reply.send(self.peers.values().map(|e| e.info.clone()).collect());
            }
        }
    }

    fn observe(&mut self, observed: ObservedPacket, period: Duration) {
        if observed.src_ip == self.speaker.address {
            return;
        }
        let packet = match EigrpPacket::parse(&observed.payload) {
            Ok(packet) => packet,
            Err(e) => {
                debug!(module = MODULE, src = %observed.src_ip, error = %e, "Undecodable EIGRP packet");
                return;
            }
        };
        if let Some(auth) = &self.speaker.auth {
            if packet.is_authenticated() && !packet.verify(&auth.key).unwrap_or(false) {
                warn!(module = MODULE, src = %observed.src_ip, "MD5 digest mismatch, packet dropped");
                return;
            }
        }

        if observed.dst_ip == EIGRP_MULTICAST {
            debug!(module = MODULE, src = %observed.src_ip, "{}", packet);
            return;
        }
        if observed.dst_ip != self.speaker.address {
            return;
        }

        if !self.peers.contains_key(&observed.src_ip) {
            self.add_peer(&observed, &packet, period);
        }
        let Some(entry) = self.peers.get_mut(&observed.src_ip) else {
            return;
        };
        entry.info.last_seen = SystemTime::now();
        if let Some(hold) = packet.hold_time() {
            entry.info.hold_time = Some(hold);
        }
        entry.task.mailbox().send(PeerCommand::Input(packet));
    }

    fn add_peer(
        &mut self,
        observed: &ObservedPacket,
        packet: &EigrpPacket,
        period: Duration,
    ) {
        let address = observed.src_ip;
        info!(module = MODULE, peer = %address, "new peer");
        self.context
            .log
            .log(&format!("EIGRP: Got new peer {}", address), MODULE);

        let sender = PeerSender {
            speaker: self.speaker.clone(),
            address,
            mac: observed.src_mac,
            pending: None,
            sequence: 1,
        };
        let task = TaskHandle::spawn(MODULE, move |inbox| sender.run(inbox, period));
        self.context
            .observer
            .on_neighbor_changed(&Change::new(MODULE, address, ChangeKind::Added));

        self.peers.insert(
            address,
            PeerEntry {
                info: EigrpPeer {
                    address,
                    mac: observed.src_mac,
                    hold_time: packet.hold_time(),
                    last_seen: SystemTime::now(),
                },
                task,
            },
        );
    }

    async fn retire(&self, address: Ipv4Addr, entry: PeerEntry) {
        if let Err(e) = entry.task.shutdown().await {
            warn!(module = MODULE, peer = %address, error = %e, "peer sender did not stop cleanly");
        }
        self.context
            .log
            .log(&format!("EIGRP: Peer {} terminated", address), MODULE);
        self.context
            .observer
            .on_neighbor_changed(&Change::new(MODULE, address, ChangeKind::Removed));
    }

    async fn clear(&mut self) {
        let peers = std::mem::take(&mut self.peers);
        for (address, entry) in peers {
            self.retire(address, entry).await;
        }
    }
}
