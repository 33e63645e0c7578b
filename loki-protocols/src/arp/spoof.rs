//! Host table, spoof groups and the ghost MAC relay map
//!
//! Every discovered host gets a random ghost MAC. A spoof group pairs each
//! host of an upper set with each host of a lower set; while the group is
//! active both sides are told that the other lives at its ghost MAC, and the
//! relay rewrites intercepted frames between ghost and real addresses.

use loki_core::{Error, MacAddr, Result};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::Ipv4Addr;

use super::packet::ArpPacket;

/// A host learned from ARP traffic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
    pub ghost: MacAddr,
    /// Member of at least one active spoof group
    pub spoofed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpoofId(pub u32);

impl fmt::Display for SpoofId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "spoof#{}", self.0)
    }
}

/// One upper/lower host combination of a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoofPair {
    pub upper: MacAddr,
    pub lower: MacAddr,
    pub upper_ip: Ipv4Addr,
    pub lower_ip: Ipv4Addr,
    /// Frames relayed between the two
    pub relayed: u64,
}

#[derive(Debug, Clone)]
pub struct SpoofGroup {
    pub id: SpoofId,
    pub active: bool,
    pub pairs: Vec<SpoofPair>,
    forged: Vec<Vec<u8>>,
    restore: Vec<Vec<u8>>,
}

impl SpoofGroup {
    /// Forged ARP replies replayed while active
    pub fn forged(&self) -> &[Vec<u8>] {
        &self.forged
    }

    /// Unforged replies that restore the real mappings
    pub fn restore(&self) -> &[Vec<u8>] {
        &self.restore
    }

    fn contains(&self, mac: MacAddr) -> bool {
        self.pairs.iter().any(|p| p.upper == mac || p.lower == mac)
    }
}

/// Real-to-ghost rewrite map of the spoofed hosts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relay {
    ghost_of: HashMap<MacAddr, MacAddr>,
    real_of: HashMap<MacAddr, MacAddr>,
}

impl Relay {
    pub fn is_empty(&self) -> bool {
        self.ghost_of.is_empty()
    }

    /// A frame from a spoofed host to another spoofed host's ghost
    pub fn matches(&self, src: MacAddr, dst: MacAddr) -> bool {
        self.ghost_of.contains_key(&src) && self.real_of.contains_key(&dst)
    }

    /// Rewrite `src = A, dst = ghost(B)` into `src = ghost(A), dst = B`.
    /// Returns the new frame with the real MACs of both ends.
    pub fn rewrite(&self, frame: &[u8]) -> Option<(Vec<u8>, MacAddr, MacAddr)> {
        let dst = MacAddr::from_slice(frame.get(0..6)?)?;
        let src = MacAddr::from_slice(frame.get(6..12)?)?;
        let ghost_src = *self.ghost_of.get(&src)?;
        let real_dst = *self.real_of.get(&dst)?;

        let mut out = frame.to_vec();
        out[0..6].copy_from_slice(real_dst.as_bytes());
        out[6..12].copy_from_slice(ghost_src.as_bytes());
        Some((out, src, real_dst))
    }
}

pub struct SpoofTable {
    own: MacAddr,
    hosts: BTreeMap<MacAddr, Host>,
    groups: BTreeMap<SpoofId, SpoofGroup>,
    next_id: u32,
}

impl SpoofTable {
    pub fn new(own: MacAddr) -> Self {
        Self {
            own,
            hosts: BTreeMap::new(),
            groups: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    pub fn host(&self, mac: MacAddr) -> Option<&Host> {
        self.hosts.get(&mac)
    }

    pub fn groups(&self) -> impl Iterator<Item = &SpoofGroup> {
        self.groups.values()
    }

    pub fn group(&self, id: SpoofId) -> Option<&SpoofGroup> {
        self.groups.get(&id)
    }

    fn is_ghost(&self, mac: MacAddr) -> bool {
        self.hosts.values().any(|h| h.ghost == mac)
    }

    /// Record the sender of an ARP packet; returns its MAC when it is new
    pub fn learn(&mut self, src: MacAddr, arp: &ArpPacket) -> Option<MacAddr> {
        if src == self.own || self.hosts.contains_key(&src) || self.is_ghost(src) {
            return None;
        }
        self.hosts.insert(
            src,
            Host {
                mac: src,
                ip: arp.sender_ip,
                ghost: MacAddr::ghost(),
                spoofed: false,
            },
        );
        Some(src)
    }

    /// Forged reply for a spoofed host asking for another spoofed host
    pub fn answer(&self, src: MacAddr, arp: &ArpPacket) -> Option<Vec<u8>> {
        if !arp.is_request() || src == self.own {
            return None;
        }
        let asker = self.hosts.get(&src).filter(|h| h.spoofed)?;
        let wanted = self
            .hosts
            .values()
            .find(|h| h.spoofed && h.ip == arp.target_ip && h.mac != asker.mac)?;
        let reply = ArpPacket::reply(wanted.ghost, arp.target_ip, arp.sender_mac, arp.sender_ip);
        Some(reply.to_frame(arp.sender_mac, wanted.ghost))
    }

    /// Build a group from two disjoint sets of known hosts
    pub fn add_spoof(&mut self, upper: &[MacAddr], lower: &[MacAddr]) -> Result<SpoofId> {
        if upper.is_empty() || lower.is_empty() {
            return Err(Error::invalid_parameter("spoof", "both host sets need a member"));
        }
        if upper.iter().any(|m| lower.contains(m)) {
            return Err(Error::invalid_parameter("spoof", "a host is in both sets"));
        }
        let lookup = |mac: &MacAddr| {
            self.hosts
                .get(mac)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("ARP host {}", mac)))
        };
        let upper: Vec<Host> = upper.iter().map(lookup).collect::<Result<_>>()?;
        let lower: Vec<Host> = lower.iter().map(lookup).collect::<Result<_>>()?;

        let mut pairs = Vec::new();
        let mut forged = Vec::new();
        let mut restore = Vec::new();
        for up in &upper {
            for low in &lower {
                pairs.push(SpoofPair {
                    upper: up.mac,
                    lower: low.mac,
                    upper_ip: up.ip,
                    lower_ip: low.ip,
                    relayed: 0,
                });
                forged.push(announce(up.ghost, up.ip, low));
                restore.push(announce(up.mac, up.ip, low));
                forged.push(announce(low.ghost, low.ip, up));
                restore.push(announce(low.mac, low.ip, up));
            }
        }

        let id = SpoofId(self.next_id);
        self.next_id += 1;
        self.groups.insert(
            id,
            SpoofGroup {
                id,
                active: false,
                pairs,
                forged,
                restore,
            },
        );
        Ok(id)
    }

    fn group_mut(&mut self, id: SpoofId) -> Result<&mut SpoofGroup> {
        self.groups
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Mark a group active; returns the hosts whose spoofed flag changed
    pub fn activate(&mut self, id: SpoofId) -> Result<Vec<MacAddr>> {
        self.group_mut(id)?.active = true;
        Ok(self.refresh_spoofed())
    }

    /// Deactivate a group, returning the restoration frames (empty when it
    /// was not active) and the hosts whose spoofed flag changed
    pub fn deactivate(&mut self, id: SpoofId) -> Result<(Vec<Vec<u8>>, Vec<MacAddr>)> {
        let group = self.group_mut(id)?;
        let restore = if group.active {
            group.active = false;
            group.restore.clone()
        } else {
            Vec::new()
        };
        Ok((restore, self.refresh_spoofed()))
    }

    pub fn remove(&mut self, id: SpoofId) -> Result<(Vec<Vec<u8>>, Vec<MacAddr>)> {
        let deactivated = self.deactivate(id)?;
        self.groups.remove(&id);
        Ok(deactivated)
    }

    /// Deactivate everything, returning all restoration frames
    pub fn restore_all(&mut self) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        for group in self.groups.values_mut().filter(|g| g.active) {
            group.active = false;
            frames.extend(group.restore.iter().cloned());
        }
        self.refresh_spoofed();
        frames
    }

    /// Forged frames of every active group
    pub fn active_forged(&self) -> Vec<Vec<u8>> {
        self.groups
            .values()
            .filter(|g| g.active)
            .flat_map(|g| g.forged.iter().cloned())
            .collect()
    }

    pub fn relay(&self) -> Relay {
        let mut relay = Relay::default();
        for host in self.hosts.values().filter(|h| h.spoofed) {
            relay.ghost_of.insert(host.mac, host.ghost);
            relay.real_of.insert(host.ghost, host.mac);
        }
        relay
    }

    /// Count a relayed frame against the pair it belongs to
    pub fn count_relayed(&mut self, src: MacAddr, dst: MacAddr) {
        for group in self.groups.values_mut().filter(|g| g.active) {
            for pair in &mut group.pairs {
                if (pair.upper == src && pair.lower == dst) || (pair.upper == dst && pair.lower == src)
                {
                    pair.relayed += 1;
                }
            }
        }
    }

    fn refresh_spoofed(&mut self) -> Vec<MacAddr> {
        let mut changed = Vec::new();
        let groups = &self.groups;
        for host in self.hosts.values_mut() {
            let spoofed = groups.values().any(|g| g.active && g.contains(host.mac));
            if host.spoofed != spoofed {
                host.spoofed = spoofed;
                changed.push(host.mac);
            }
        }
        changed
    }
}

/// ARP reply telling `to` that `ip` is at `mac`
fn announce(mac: MacAddr, ip: Ipv4Addr, to: &Host) -> Vec<u8> {
    ArpPacket::reply(mac, ip, MacAddr::zero(), to.ip).to_frame(to.mac, mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWN: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x01]);
    const A: MacAddr = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x0a]);
    const B: MacAddr = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x0b]);
    const C: MacAddr = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x0c]);
    const IP_A: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 10);
    const IP_B: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 11);
    const IP_C: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 12);

    fn table() -> SpoofTable {
        let mut table = SpoofTable::new(OWN);
        for (mac, ip) in [(A, IP_A), (B, IP_B), (C, IP_C)] {
            let arp = ArpPacket::request(mac, ip, Ipv4Addr::new(10, 0, 0, 1));
            assert_eq!(table.learn(mac, &arp), Some(mac));
        }
        table
    }

    fn ip_frame(dst: MacAddr, src: MacAddr) -> Vec<u8> {
        let mut frame = Vec::new();
        frame.extend_from_slice(dst.as_bytes());
        frame.extend_from_slice(src.as_bytes());
        frame.extend_from_slice(&[0x08, 0x00, 0x45, 0x00]);
        frame
    }

    #[test]
    fn test_learn_skips_known_own_and_ghosts() {
        let mut table = table();
        let arp = ArpPacket::request(A, IP_A, IP_B);
        assert_eq!(table.learn(A, &arp), None);
        assert_eq!(table.learn(OWN, &arp), None);
        let ghost = table.host(B).unwrap().ghost;
        assert_eq!(table.learn(ghost, &arp), None);
        assert_eq!(table.hosts().count(), 3);
        assert_eq!(table.host(A).unwrap().ip, IP_A);
        assert_eq!(table.host(A).unwrap().ghost.0[0], 0);
    }

    #[test]
    fn test_add_spoof_validates_sets() {
        let mut table = table();
        assert!(table.add_spoof(&[], &[B]).is_err());
        assert!(table.add_spoof(&[A], &[A, B]).is_err());
        let unknown = MacAddr([0x00, 0, 0, 0, 0, 0x77]);
        assert!(matches!(table.add_spoof(&[unknown], &[B]), Err(Error::NotFound(_))));

        let id = table.add_spoof(&[A], &[B, C]).unwrap();
        let group = table.group(id).unwrap();
        assert_eq!(group.pairs.len(), 2);
        assert_eq!(group.forged().len(), 4);
        assert_eq!(group.restore().len(), 4);
        assert!(!group.active);
    }

    #[test]
    fn test_forged_and_restore_frames() {
        let mut table = table();
        let id = table.add_spoof(&[A], &[B]).unwrap();
        let ghost_a = table.host(A).unwrap().ghost;
        let group = table.group(id).unwrap();

        // tells B that A's address is at ghost(A)
        let forged = ArpPacket::parse(&group.forged()[0][14..]).unwrap();
        assert_eq!(&group.forged()[0][0..6], B.as_bytes());
        assert_eq!(forged.sender_mac, ghost_a);
        assert_eq!(forged.sender_ip, IP_A);
        assert_eq!(forged.target_ip, IP_B);

        let restore = ArpPacket::parse(&group.restore()[0][14..]).unwrap();
        assert_eq!(restore.sender_mac, A);
        assert_eq!(restore.sender_ip, IP_A);
    }

    #[test]
    fn test_relay_rewrites_both_directions() {
        let mut table = table();
        let id = table.add_spoof(&[A], &[B]).unwrap();
        assert!(table.relay().is_empty());

        let changed = table.activate(id).unwrap();
        assert_eq!(changed.len(), 2);
        let ghost_a = table.host(A).unwrap().ghost;
        let ghost_b = table.host(B).unwrap().ghost;
        let relay = table.relay();

        let (out, src, dst) = relay.rewrite(&ip_frame(ghost_b, A)).unwrap();
        assert_eq!(&out[0..6], B.as_bytes());
        assert_eq!(&out[6..12], ghost_a.as_bytes());
        assert_eq!((src, dst), (A, B));

        let (out, _, _) = relay.rewrite(&ip_frame(ghost_a, B)).unwrap();
        assert_eq!(&out[0..6], A.as_bytes());
        assert_eq!(&out[6..12], ghost_b.as_bytes());

        // C is not spoofed, and a real destination is not rewritten
        assert!(relay.rewrite(&ip_frame(ghost_b, C)).is_none());
        assert!(relay.rewrite(&ip_frame(B, A)).is_none());

        table.count_relayed(B, A);
        assert_eq!(table.group(id).unwrap().pairs[0].relayed, 1);
    }

    #[test]
    fn test_deactivate_returns_restore_frames() {
        let mut table = table();
        let id = table.add_spoof(&[A], &[B]).unwrap();
        let (frames, changed) = table.deactivate(id).unwrap();
        assert!(frames.is_empty() && changed.is_empty());

        table.activate(id).unwrap();
        let (frames, changed) = table.deactivate(id).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(changed.len(), 2);
        assert!(table.relay().is_empty());
        assert!(table.active_forged().is_empty());
    }

    #[test]
    fn test_host_stays_spoofed_while_another_group_active() {
        let mut table = table();
        let first = table.add_spoof(&[A], &[B]).unwrap();
        let second = table.add_spoof(&[A], &[C]).unwrap();
        table.activate(first).unwrap();
        table.activate(second).unwrap();
        assert_eq!(table.active_forged().len(), 4);

        table.deactivate(first).unwrap();
        assert!(table.host(A).unwrap().spoofed);
        assert!(!table.host(B).unwrap().spoofed);

        let (frames, _) = table.remove(second).unwrap();
        assert_eq!(frames.len(), 2);
        assert!(table.group(second).is_none());
        assert!(table.restore_all().is_empty());
    }

    #[test]
    fn test_answer_requests_between_spoofed_hosts() {
        let mut table = table();
        let id = table.add_spoof(&[A], &[B]).unwrap();
        let request = ArpPacket::request(A, IP_A, IP_B);
        assert!(table.answer(A, &request).is_none());

        table.activate(id).unwrap();
        let ghost_b = table.host(B).unwrap().ghost;
        let frame = table.answer(A, &request).unwrap();
        assert_eq!(&frame[0..6], A.as_bytes());
        let reply = ArpPacket::parse(&frame[14..]).unwrap();
        assert_eq!(reply.sender_mac, ghost_b);
        assert_eq!(reply.sender_ip, IP_B);
        assert_eq!(reply.target_ip, IP_A);

        // C is not part of the group
        assert!(table.answer(A, &ArpPacket::request(A, IP_A, IP_C)).is_none());
    }
}
