//! OSPF neighbor adjacency state machine
//!
//! `Adjacency` owns every neighbor of one module instance. It is driven from
//! two directions: [`Adjacency::receive`] for packets observed on the wire and
//! [`Adjacency::tick`] for the fixed-interval sender, which returns the packets
//! to emit instead of sending them. Both run on the module's owning task, so
//! the state machine itself needs no locking.
//!
//! States only move forward:
//!
//! ```text
//! HELLO -> TWO_WAY -> EXSTART -> EXCHANGE -> LOADING -> FULL
//! ```
//!
//! There is no dead-interval aging; a neighbor stays until the module stops.

use ipnetwork::Ipv4Network;
use loki_core::MacAddr;
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use super::packet::{
    dbd_flags, link_types, options, LsaBody, OspfBody, OspfDatabaseDescription, OspfHeader,
    OspfHello, OspfLsRequest, OspfLsa, OspfLsaHeader, OspfLsaType, OspfPacket, OspfPacketType,
    RouterLink, OSPF_MULTICAST_ALL_SPF,
};

/// DD sequence number a new neighbor starts from
pub const INITIAL_DD_SEQUENCE: u32 = 1337;
/// First LS sequence number used for operator network advertisements
pub const INITIAL_LS_SEQUENCE: u32 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NeighborState {
    Hello = 1,
    TwoWay = 2,
    ExStart = 3,
    Exchange = 4,
    Loading = 5,
    Full = 6,
}

impl fmt::Display for NeighborState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NeighborState::Hello => "HELLO",
            NeighborState::TwoWay => "2WAY",
            NeighborState::ExStart => "EXSTART",
            NeighborState::Exchange => "EXCHANGE",
            NeighborState::Loading => "LOADING",
            NeighborState::Full => "FULL",
        };
        f.write_str(name)
    }
}

/// Role of the local router in one adjacency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Slave,
}

/// Local role against `peer`: the numerically lower router id is master.
///
/// Both ends compute the same answer from the two ids alone.
pub fn local_role(local: Ipv4Addr, peer: Ipv4Addr) -> Role {
    if u32::from(local) < u32::from(peer) {
        Role::Master
    } else {
        Role::Slave
    }
}

/// Flags, options and sequence of the last database description we kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiation {
    pub mtu: u16,
    pub options: u8,
    pub flags: u8,
    pub sequence: u32,
}

impl From<&OspfDatabaseDescription> for Negotiation {
    fn from(dbd: &OspfDatabaseDescription) -> Self {
        Self {
            mtu: dbd.mtu,
            options: dbd.options,
            flags: dbd.flags,
            sequence: dbd.sequence,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Neighbor {
    pub id: Ipv4Addr,
    pub mac: MacAddr,
    pub address: Ipv4Addr,
    pub state: NeighborState,
    pub role: Role,
    /// Our DD sequence number (used when we are master)
    pub sequence: u32,
    pub negotiation: Option<Negotiation>,
    /// Headers announced by the peer, requested once we load as master
    pub advertised: Vec<OspfLsaHeader>,
    /// Headers received in updates and not yet acknowledged
    pub pending_acks: Vec<OspfLsaHeader>,
}

impl Neighbor {
    pub fn master_is_peer(&self) -> bool {
        self.role == Role::Slave
    }
}

/// Operator network advertised once an adjacency is FULL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisedNetwork {
    pub network: Ipv4Network,
    /// Still waiting to be announced
    pub pending: bool,
}

/// Local router parameters stamped on every packet
#[derive(Debug, Clone)]
pub struct LocalRouter {
    pub router_id: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub area: u32,
    pub auth_type: u16,
    pub auth_data: u64,
    pub hello_interval: u16,
    pub mtu: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Multicast,
    Unicast { mac: MacAddr, ip: Ipv4Addr },
}

/// A packet the sender wants on the wire
#[derive(Debug, Clone)]
pub struct Outbound {
    pub destination: Destination,
    pub packet: OspfPacket,
}

/// What a received packet did to the neighbor table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborEvent {
    Added(Ipv4Addr),
    StateChanged {
        id: Ipv4Addr,
        from: NeighborState,
        to: NeighborState,
    },
}

/// A packet observed on the wire, addressed as it was captured
#[derive(Debug, Clone, Copy)]
pub struct Received<'a> {
    pub src_mac: MacAddr,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub packet: &'a OspfPacket,
}

pub struct Adjacency {
    local: LocalRouter,
    neighbors: BTreeMap<Ipv4Addr, Neighbor>,
    hello_active: bool,
    announced: bool,
    hello_count: u16,
    designated_router: Ipv4Addr,
    backup_router: Ipv4Addr,
    learned_options: u8,
    networks: Vec<AdvertisedNetwork>,
    ls_sequence: u32,
}

impl Adjacency {
    pub fn new(local: LocalRouter) -> Self {
        Self {
            local,
            neighbors: BTreeMap::new(),
            hello_active: false,
            announced: false,
            hello_count: 0,
            designated_router: Ipv4Addr::UNSPECIFIED,
            backup_router: Ipv4Addr::UNSPECIFIED,
            learned_options: options::EXTERNAL,
            networks: Vec::new(),
            ls_sequence: INITIAL_LS_SEQUENCE,
        }
    }

    pub fn local(&self) -> &LocalRouter {
        &self.local
    }

    pub fn neighbor(&self, id: Ipv4Addr) -> Option<&Neighbor> {
        self.neighbors.get(&id)
    }

    pub fn neighbors(&self) -> impl Iterator<Item = &Neighbor> {
        self.neighbors.values()
    }

    pub fn hello_active(&self) -> bool {
        self.hello_active
    }

    pub fn set_hello_active(&mut self, active: bool) {
        self.hello_active = active;
    }

    /// DR and BDR learned from the last multicast hello
    pub fn designated_routers(&self) -> (Ipv4Addr, Ipv4Addr) {
        (self.designated_router, self.backup_router)
    }

    pub fn networks(&self) -> &[AdvertisedNetwork] {
        &self.networks
    }

    /// Queue a network for advertisement; false if already present
    pub fn add_network(&mut self, network: Ipv4Network) -> bool {
        if self.networks.iter().any(|n| n.network == network) {
            return false;
        }
        self.networks.push(AdvertisedNetwork {
            network,
            pending: true,
        });
        true
    }

    /// Drop a network; the ones left are announced again without it
    pub fn remove_network(&mut self, network: Ipv4Network) -> bool {
        let before = self.networks.len();
        self.networks.retain(|n| n.network != network);
        if self.networks.len() == before {
            return false;
        }
        for remaining in &mut self.networks {
            remaining.pending = true;
        }
        true
    }

    /// Apply one received packet. Unexpected packets leave state untouched.
    pub fn receive(&mut self, rx: Received<'_>) -> Option<NeighborEvent> {
        if rx.src_ip == self.local.router_id {
            return None;
        }
        if rx.dst_ip == OSPF_MULTICAST_ALL_SPF {
            self.receive_multicast(rx)
        } else if rx.dst_ip == self.local.router_id && self.hello_active {
            self.receive_unicast(rx)
        } else {
            None
        }
    }

    fn receive_multicast(&mut self, rx: Received<'_>) -> Option<NeighborEvent> {
        let OspfBody::Hello(hello) = &rx.packet.body else {
            return None;
        };
        let id = rx.packet.header.router_id;

        self.designated_router = hello.designated_router;
        self.backup_router = hello.backup_router;
        self.learned_options = hello.options;

        match self.neighbors.get_mut(&id) {
            None => {
                self.neighbors.insert(
                    id,
                    Neighbor {
                        id,
                        mac: rx.src_mac,
                        address: rx.src_ip,
                        state: NeighborState::Hello,
                        role: local_role(self.local.router_id, id),
                        sequence: INITIAL_DD_SEQUENCE,
                        negotiation: None,
                        advertised: Vec::new(),
                        pending_acks: Vec::new(),
                    },
                );
                Some(NeighborEvent::Added(id))
            }
            Some(neighbor) if self.hello_active && neighbor.state == NeighborState::Hello => {
                Some(advance(neighbor, NeighborState::TwoWay))
            }
            Some(_) => None,
        }
    }

    fn receive_unicast(&mut self, rx: Received<'_>) -> Option<NeighborEvent> {
        let id = rx.packet.header.router_id;
        let neighbor = self.neighbors.get_mut(&id)?;

        match &rx.packet.body {
            OspfBody::Hello(_) => {
                if neighbor.state == NeighborState::Hello {
                    neighbor.mac = rx.src_mac;
                    neighbor.address = rx.src_ip;
                    return Some(advance(neighbor, NeighborState::TwoWay));
                }
                None
            }
            OspfBody::DatabaseDescription(dbd) => match neighbor.state {
                NeighborState::TwoWay => {
                    neighbor.negotiation = Some(Negotiation::from(dbd));
                    if dbd.has_flag(dbd_flags::INIT) {
                        return None;
                    }
                    neighbor.advertised = dbd.lsa_headers.clone();
                    Some(advance(neighbor, NeighborState::ExStart))
                }
                NeighborState::ExStart | NeighborState::Exchange => {
                    neighbor.advertised.extend(dbd.lsa_headers.iter().cloned());
                    if neighbor.role == Role::Slave {
                        neighbor.negotiation = Some(Negotiation::from(dbd));
                        if neighbor.state == NeighborState::ExStart
                            && !dbd.has_flag(dbd_flags::MORE)
                        {
                            return Some(advance(neighbor, NeighborState::Exchange));
                        }
                    }
                    None
                }
                _ => None,
            },
            OspfBody::LinkStateRequest(_) => match neighbor.state {
                NeighborState::ExStart | NeighborState::Exchange => {
                    Some(advance(neighbor, NeighborState::Loading))
                }
                _ => None,
            },
            OspfBody::LinkStateAck(_) => {
                if neighbor.state == NeighborState::Loading {
                    return Some(advance(neighbor, NeighborState::Full));
                }
                None
            }
            OspfBody::LinkStateUpdate(lsas) => {
                if neighbor.state <= NeighborState::ExStart {
                    return None;
                }
                neighbor
                    .pending_acks
                    .extend(lsas.iter().map(|lsa| lsa.header.clone()));
                if neighbor.state != NeighborState::Full {
                    return Some(advance(neighbor, NeighborState::Full));
                }
                None
            }
        }
    }

    /// One sender cycle. Returns the packets to emit and any state changes
    /// the master side made on its own.
    pub fn tick(&mut self) -> (Vec<Outbound>, Vec<NeighborEvent>) {
        let mut out = Vec::new();
        let mut events = Vec::new();
        if !self.hello_active || self.neighbors.is_empty() {
            return (out, events);
        }

        let neighbor_ids: Vec<Ipv4Addr> = self.neighbors.keys().copied().collect();

        if !self.announced {
            self.announced = true;
            out.push(Outbound {
                destination: Destination::Multicast,
                packet: self.hello(Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED, Vec::new()),
            });
        }

        if self.hello_count + 1 >= self.local.hello_interval {
            self.hello_count = 0;
            out.push(Outbound {
                destination: Destination::Multicast,
                packet: self.hello(
                    self.designated_router,
                    self.backup_router,
                    neighbor_ids.clone(),
                ),
            });
        } else {
            self.hello_count += 1;
        }

        // one router-LSA instance carries every operator network
        let network_lsa = self
            .networks
            .iter()
            .any(|n| n.pending)
            .then(|| self.network_lsa());
        let mut announced_networks = false;

        for id in &neighbor_ids {
            let Some(mut neighbor) = self.neighbors.remove(id) else {
                continue;
            };
            let destination = Destination::Unicast {
                mac: neighbor.mac,
                ip: neighbor.address,
            };
            let mut emit = |packet: OspfPacket| out.push(Outbound { destination, packet });

            match neighbor.state {
                NeighborState::Hello => {
                    emit(self.hello(self.designated_router, self.backup_router, neighbor_ids.clone()));
                }
                NeighborState::TwoWay => {
                    if let Some(negotiation) = neighbor.negotiation.clone() {
                        match neighbor.role {
                            Role::Master => {
                                emit(self.dbd(
                                    self.local.mtu,
                                    (self.learned_options & !options::LLS) | options::ZERO,
                                    dbd_flags::MORE | dbd_flags::MASTER | dbd_flags::INIT,
                                    neighbor.sequence,
                                    Vec::new(),
                                ));
                                neighbor.sequence = neighbor.sequence.wrapping_add(1);
                            }
                            Role::Slave => {
                                emit(self.dbd(
                                    negotiation.mtu,
                                    negotiation.options & !options::LLS,
                                    negotiation.flags & !(dbd_flags::MASTER | dbd_flags::INIT),
                                    negotiation.sequence,
                                    Vec::new(),
                                ));
                            }
                        }
                    }
                }
                NeighborState::ExStart => {
                    let own = vec![self.own_router_header()];
                    match neighbor.role {
                        Role::Master => {
                            emit(self.dbd(
                                self.local.mtu,
                                options::EXTERNAL | options::ZERO,
                                dbd_flags::MASTER,
                                neighbor.sequence,
                                own,
                            ));
                            neighbor.sequence = neighbor.sequence.wrapping_add(1);
                            events.push(advance(&mut neighbor, NeighborState::Exchange));
                        }
                        Role::Slave => {
                            emit(self.dbd(
                                self.local.mtu,
                                options::EXTERNAL | options::ZERO,
                                dbd_flags::MORE,
                                peer_sequence(&neighbor),
                                own,
                            ));
                        }
                    }
                }
                NeighborState::Exchange => match neighbor.role {
                    Role::Master => {
                        emit(self.dbd(
                            self.local.mtu,
                            options::EXTERNAL | options::ZERO,
                            dbd_flags::MASTER,
                            neighbor.sequence,
                            Vec::new(),
                        ));
                        neighbor.sequence = neighbor.sequence.wrapping_add(1);
                        events.push(advance(&mut neighbor, NeighborState::Loading));
                    }
                    Role::Slave => {
                        emit(self.dbd(
                            self.local.mtu,
                            options::EXTERNAL | options::ZERO,
                            0,
                            peer_sequence(&neighbor),
                            Vec::new(),
                        ));
                    }
                },
                NeighborState::Loading => match neighbor.role {
                    Role::Master => {
                        for header in neighbor.advertised.drain(..) {
                            emit(self.packet(OspfBody::LinkStateRequest(vec![OspfLsRequest {
                                ls_type: header.ls_type as u32,
                                link_state_id: header.link_state_id,
                                advertising_router: header.advertising_router,
                            }])));
                        }
                    }
                    Role::Slave => {
                        emit(self.packet(OspfBody::LinkStateUpdate(vec![self.own_router_lsa()])));
                    }
                },
                NeighborState::Full => {
                    if !neighbor.pending_acks.is_empty() {
                        let headers = std::mem::take(&mut neighbor.pending_acks);
                        emit(self.packet(OspfBody::LinkStateAck(headers)));
                    }
                    if let Some(lsa) = &network_lsa {
                        emit(self.packet(OspfBody::LinkStateUpdate(vec![lsa.clone()])));
                        announced_networks = true;
                    }
                }
            }

            self.neighbors.insert(*id, neighbor);
        }

        if announced_networks {
            for network in &mut self.networks {
                network.pending = false;
            }
            self.ls_sequence = self.ls_sequence.wrapping_add(1);
        }

        (out, events)
    }

    fn header(&self) -> OspfHeader {
        OspfHeader::new(OspfPacketType::Hello, self.local.router_id, self.local.area)
            .with_auth(self.local.auth_type, self.local.auth_data)
    }

    fn packet(&self, body: OspfBody) -> OspfPacket {
        OspfPacket::new(self.header(), body)
    }

    fn hello(&self, dr: Ipv4Addr, bdr: Ipv4Addr, neighbors: Vec<Ipv4Addr>) -> OspfPacket {
        self.packet(OspfBody::Hello(OspfHello {
            network_mask: self.local.mask,
            hello_interval: self.local.hello_interval,
            options: options::TOS | (self.learned_options & options::EXTERNAL),
            priority: 1,
            dead_interval: self.local.hello_interval as u32 * 4,
            designated_router: dr,
            backup_router: bdr,
            neighbors,
        }))
    }

    fn dbd(
        &self,
        mtu: u16,
        options: u8,
        flags: u8,
        sequence: u32,
        lsa_headers: Vec<OspfLsaHeader>,
    ) -> OspfPacket {
        self.packet(OspfBody::DatabaseDescription(OspfDatabaseDescription {
            mtu,
            options,
            flags,
            sequence,
            lsa_headers,
        }))
    }

    fn own_router_header(&self) -> OspfLsaHeader {
        OspfLsaHeader::new(
            OspfLsaType::RouterLsa,
            self.local.router_id,
            self.local.router_id,
            1,
        )
        .sealed()
    }

    /// Router-LSA with a stub link for the local network
    fn own_router_lsa(&self) -> OspfLsa {
        let network = Ipv4Network::with_netmask(self.local.router_id, self.local.mask)
            .map(|n| n.network())
            .unwrap_or(self.local.router_id);
        OspfLsa::router(
            self.local.router_id,
            10,
            vec![RouterLink::new(network, self.local.mask, link_types::STUB, 10)],
        )
    }

    /// Router-LSA with a stub link per operator network behind us
    fn network_lsa(&self) -> OspfLsa {
        let mut header = OspfLsaHeader::new(
            OspfLsaType::RouterLsa,
            self.local.router_id,
            self.local.router_id,
            self.ls_sequence,
        );
        header.options = options::EXTERNAL | options::DEMAND_CIRCUITS;
        OspfLsa::new(
            header,
            LsaBody::Router {
                flags: 0,
                links: self
                    .networks
                    .iter()
                    .map(|n| {
                        RouterLink::new(n.network.network(), n.network.mask(), link_types::STUB, 1)
                    })
                    .chain(std::iter::once(RouterLink::new(
                        self.designated_router,
                        self.local.router_id,
                        link_types::TRANSIT,
                        1,
                    )))
                    .collect(),
            },
        )
    }
}

fn peer_sequence(neighbor: &Neighbor) -> u32 {
    neighbor
        .negotiation
        .as_ref()
        .map(|n| n.sequence)
        .unwrap_or(neighbor.sequence)
}

fn advance(neighbor: &mut Neighbor, to: NeighborState) -> NeighborEvent {
    let from = neighbor.state;
    neighbor.state = to;
    NeighborEvent::StateChanged {
        id: neighbor.id,
        from,
        to,
    }
}
