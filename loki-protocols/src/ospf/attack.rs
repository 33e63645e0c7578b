//! OSPF owning task: feeds observed packets into the adjacency state machine
//! and runs the fixed-interval sender that forges hellos, database
//! descriptions, requests, updates and acknowledgments.

use bytes::Bytes;
use ipnetwork::Ipv4Network;
use loki_core::{Change, ChangeKind, InjectorHandle, MacAddr, ModuleContext, SEND_PACING};
use loki_packet::{EtherType, EthernetFrame, IpProtocol, Ipv4Packet};
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use super::adjacency::{Adjacency, Destination, Neighbor, NeighborEvent, Outbound, Received};
use super::packet::{OspfPacket, OSPF_MULTICAST_ALL_SPF};
use crate::runtime::{Envelope, Inbox, InboundFilter};

pub(crate) const MODULE: &str = "ospf";

/// An OSPF datagram seen by the IP hook
#[derive(Debug, Clone)]
pub struct ObservedPacket {
    pub src_mac: MacAddr,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub payload: Bytes,
}

pub enum OspfCommand {
    Observed(ObservedPacket),
    SetHello(bool),
    AddNetwork(Ipv4Network, oneshot::Sender<bool>),
    RemoveNetwork(Ipv4Network, oneshot::Sender<bool>),
    Neighbors(oneshot::Sender<Vec<Neighbor>>),
}

pub(crate) struct OspfWorker {
    pub adjacency: Adjacency,
    pub injector: InjectorHandle,
    pub mac: MacAddr,
    pub context: ModuleContext,
    pub filter: Option<InboundFilter>,
}

impl OspfWorker {
    pub async fn run(mut self, mut inbox: Inbox<OspfCommand>, period: Duration) {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                envelope = inbox.recv() => match envelope {
                    Some(Envelope::Command(command)) => self.handle(command),
                    Some(Envelope::Shutdown) | None => break,
                },
                _ = ticker.tick() => self.send_cycle().await,
            }
        }

        if let Some(filter) = self.filter.as_mut() {
            filter.set(false, &self.context);
        }
        debug!(module = MODULE, "worker exiting");
    }

    fn handle(&mut self, command: OspfCommand) {
        match command {
            OspfCommand::Observed(observed) => self.observe(observed),
            OspfCommand::SetHello(active) => {
                info!(module = MODULE, active, "Hello sender toggled");
                self.adjacency.set_hello_active(active);
                if let Some(filter) = self.filter.as_mut() {
                    filter.set(active, &self.context);
                }
            }
            OspfCommand::AddNetwork(network, reply) => {
                let _ = reply.send(self.adjacency.add_network(network));
            }
            OspfCommand::RemoveNetwork(network, reply) => {
                let _ = reply.send(self.adjacency.remove_network(network));
            }
            OspfCommand::Neighbors(reply) => {
                let _ = reply.send(self.adjacency.neighbors().cloned().collect());
            }
        }
    }

    fn observe(&mut self, observed: ObservedPacket) {
        let packet = match OspfPacket::parse(&observed.payload) {
            Ok(packet) => packet,
            Err(e) => {
                debug!(module = MODULE, src = %observed.src_ip, error = %e, "Undecodable OSPF packet");
                return;
            }
        };
        let event = self.adjacency.receive(Received {
            src_mac: observed.src_mac,
            src_ip: observed.src_ip,
            dst_ip: observed.dst_ip,
            packet: &packet,
        });
        if let Some(event) = event {
            self.report(event);
        }
    }

    fn report(&self, event: NeighborEvent) {
        let (id, kind, message) = match event {
            NeighborEvent::Added(id) => (id, ChangeKind::Added, format!("New neighbor {}", id)),
            NeighborEvent::StateChanged { id, from, to } => (
                id,
                ChangeKind::Updated,
                format!("Neighbor {} {} -> {}", id, from, to),
            ),
        };
        debug!(module = MODULE, peer = %id, "{}", message);
        self.context.log.log(&message, MODULE);
        self.context
            .observer
            .on_neighbor_changed(&Change::new(MODULE, id, kind));
    }

    async fn send_cycle(&mut self) {
        let (outbound, events) = self.adjacency.tick();
        for event in events {
            self.report(event);
        }
        let source = self.adjacency.local().router_id;
        for packet in &outbound {
            self.injector.send(render_frame(self.mac, source, packet));
            time::sleep(SEND_PACING).await;
        }
    }
}

/// Wrap an outbound OSPF packet in IPv4 (TTL 1) and Ethernet
pub fn render_frame(mac: MacAddr, source: Ipv4Addr, outbound: &Outbound) -> Vec<u8> {
    let (dst_mac, dst_ip) = match outbound.destination {
        Destination::Multicast => (
            MacAddr::ipv4_multicast(OSPF_MULTICAST_ALL_SPF),
            OSPF_MULTICAST_ALL_SPF,
        ),
        Destination::Unicast { mac, ip } => (mac, ip),
    };
    let ip = Ipv4Packet::link_local(source, dst_ip, IpProtocol::OSPF, outbound.packet.to_bytes());
    EthernetFrame::new(dst_mac, mac, EtherType::IPv4, ip.to_bytes()).to_bytes()
}
