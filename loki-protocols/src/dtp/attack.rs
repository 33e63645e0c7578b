//! DTP owning task: peer table plus the trunk poisoning sender
//!
//! While poisoning is on, a PDU announcing TRUNK/ON is sent once per period.
//! With a target peer the PDU reuses the peer's domain and trunk type so the
//! switch port accepts it as a desirable neighbor.

use bytes::Bytes;
use loki_core::{Change, ChangeKind, InjectorHandle, MacAddr, ModuleContext};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};
use tokio::sync::oneshot;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use super::packet::{DtpPacket, DtpStatus, DtpType};
use crate::runtime::{Envelope, Inbox};

pub(crate) const MODULE: &str = "dtp";

/// A switch port seen announcing DTP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtpPeer {
    pub mac: MacAddr,
    pub domain: Bytes,
    pub status: Option<DtpStatus>,
    pub trunk_type: Option<DtpType>,
    pub sender: Option<MacAddr>,
    /// Currently targeted by the poisoning sender
    pub poisoned: bool,
    pub last_seen: SystemTime,
}

impl DtpPeer {
    fn from_packet(mac: MacAddr, packet: &DtpPacket) -> Self {
        Self {
            mac,
            domain: packet.domain().cloned().unwrap_or_default(),
            status: packet.status(),
            trunk_type: packet.trunk_type(),
            sender: packet.sender(),
            poisoned: false,
            last_seen: SystemTime::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoisonTarget {
    /// Generic 802.1Q trunk announcement
    Any,
    Peer(MacAddr),
}

pub enum DtpCommand {
    Observed { source: MacAddr, packet: DtpPacket },
    /// Start poisoning; replies false when the target peer is unknown
    Poison(PoisonTarget, oneshot::Sender<bool>),
    StopPoison,
    Peers(oneshot::Sender<Vec<DtpPeer>>),
}

/// PDU sent while poisoning
pub fn poison_packet(target: Option<&DtpPeer>, source: MacAddr) -> DtpPacket {
    let (domain, trunk) = match target {
        Some(peer) => (
            peer.domain.clone(),
            peer.trunk_type.unwrap_or_else(DtpType::dot1q),
        ),
        None => (Bytes::new(), DtpType::dot1q()),
    };
    DtpPacket::new()
        .with_domain(domain)
        .with_status(DtpStatus::trunk_on())
        .with_type(trunk)
        .with_sender(source)
}

pub(crate) struct DtpWorker {
    pub peers: BTreeMap<MacAddr, DtpPeer>,
    pub poison: Option<PoisonTarget>,
    pub injector: InjectorHandle,
    pub mac: MacAddr,
    pub context: ModuleContext,
}

impl DtpWorker {
    pub async fn run(mut self, mut inbox: Inbox<DtpCommand>, period: Duration) {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                envelope = inbox.recv() => match envelope {
                    Some(Envelope::Command(command)) => self.handle(command),
                    Some(Envelope::Shutdown) | None => break,
                },
                _ = ticker.tick() => self.send_poison(),
            }
        }

        self.clear_poison();
        debug!(module = MODULE, "worker exiting");
    }

    fn handle(&mut self, command: DtpCommand) {
        match command {
            DtpCommand::Observed { source, packet } => self.observe(source, packet),
            DtpCommand::Poison(target, reply) => {
                let accepted = match target {
                    PoisonTarget::Any => true,
                    PoisonTarget::Peer(mac) => self.peers.contains_key(&mac),
                };
                if accepted {
                    self.clear_poison();
                    self.poison = Some(target);
                    if let PoisonTarget::Peer(mac) = target {
                        self.mark(mac, true);
                    }
                    self.context.log.log("DTP: poisoning started", MODULE);
                    self.send_poison();
                }
                let _ = reply.send(accepted);
            }
            DtpCommand::StopPoison => {
                if self.poison.is_some() {
                    self.context.log.log("DTP: poisoning stopped", MODULE);
                }
                self.clear_poison();
            }
            DtpCommand::Peers(reply) => {
                let _ = reply.send(self.peers.values().cloned().collect());
            }
        }
    }

    fn observe(&mut self, source: MacAddr, packet: DtpPacket) {
        if source == self.mac {
            return;
        }
        let mut peer = DtpPeer::from_packet(source, &packet);
        let kind = match self.peers.get(&source) {
            Some(existing) => {
                peer.poisoned = existing.poisoned;
                ChangeKind::Updated
            }
            None => {
                info!(module = MODULE, peer = %source, "{}", packet);
                self.context
                    .log
                    .log(&format!("DTP: Got new peer {}", source), MODULE);
                ChangeKind::Added
            }
        };
        self.peers.insert(source, peer);
        self.context
            .observer
            .on_host_changed(&Change::new(MODULE, source, kind));
    }

    fn mark(&mut self, mac: MacAddr, poisoned: bool) {
        if let Some(peer) = self.peers.get_mut(&mac) {
            if peer.poisoned != poisoned {
                peer.poisoned = poisoned;
                self.context
                    .observer
                    .on_host_changed(&Change::new(MODULE, mac, ChangeKind::Updated));
            }
        }
    }

    fn clear_poison(&mut self) {
        if let Some(PoisonTarget::Peer(mac)) = self.poison.take() {
            self.mark(mac, false);
        }
    }

    fn send_poison(&self) {
        let target = match self.poison {
            None => return,
            Some(PoisonTarget::Any) => None,
            Some(PoisonTarget::Peer(mac)) => self.peers.get(&mac),
        };
        let sent = self
            .injector
            .send_rendered(poison_packet(target, self.mac).to_frame(self.mac));
        if sent {
            debug!(module = MODULE, "poison PDU queued");
        }
    }
}
