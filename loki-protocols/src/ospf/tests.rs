use super::adjacency::*;
use super::attack::render_frame;
use super::packet::*;
use super::protocol::{OspfConfig, OspfModule};
use ipnetwork::Ipv4Network;
use loki_core::{
    Frame, InjectorHandle, Layer, MacAddr, ModuleContext, PacketView, ProtocolModule,
    RecordingObserver, TracingLog, Verdict,
};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

const MASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);
const PEER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);
const PEER_MAC: MacAddr = MacAddr::new([0x00, 0x0c, 0x29, 0x00, 0x00, 0x05]);

fn local_router(router_id: Ipv4Addr) -> LocalRouter {
    LocalRouter {
        router_id,
        mask: MASK,
        area: 0,
        auth_type: auth_types::NONE,
        auth_data: 0,
        hello_interval: 10,
        mtu: 1500,
    }
}

fn from_peer(body: OspfBody) -> OspfPacket {
    OspfPacket::new(OspfHeader::new(OspfPacketType::Hello, PEER, 0), body)
}

fn hello() -> OspfPacket {
    from_peer(OspfBody::Hello(OspfHello {
        network_mask: MASK,
        hello_interval: 10,
        options: options::EXTERNAL,
        priority: 1,
        dead_interval: 40,
        designated_router: PEER,
        backup_router: Ipv4Addr::UNSPECIFIED,
        neighbors: Vec::new(),
    }))
}

fn dbd(flags: u8, sequence: u32, headers: Vec<OspfLsaHeader>) -> OspfPacket {
    from_peer(OspfBody::DatabaseDescription(OspfDatabaseDescription {
        mtu: 1500,
        options: options::EXTERNAL | options::LLS,
        flags,
        sequence,
        lsa_headers: headers,
    }))
}

fn peer_lsa_header() -> OspfLsaHeader {
    OspfLsaHeader::new(OspfLsaType::RouterLsa, PEER, PEER, 0x8000_0001).sealed()
}

fn deliver(adjacency: &mut Adjacency, packet: &OspfPacket, dst_ip: Ipv4Addr) -> Option<NeighborEvent> {
    adjacency.receive(Received {
        src_mac: PEER_MAC,
        src_ip: PEER,
        dst_ip,
        packet,
    })
}

fn changed(from: NeighborState, to: NeighborState) -> Option<NeighborEvent> {
    Some(NeighborEvent::StateChanged { id: PEER, from, to })
}

/// Neighbor brought to TWO_WAY via two multicast hellos
fn two_way(local: Ipv4Addr) -> Adjacency {
    let mut adjacency = Adjacency::new(local_router(local));
    assert_eq!(
        deliver(&mut adjacency, &hello(), OSPF_MULTICAST_ALL_SPF),
        Some(NeighborEvent::Added(PEER))
    );
    adjacency.set_hello_active(true);
    assert_eq!(
        deliver(&mut adjacency, &hello(), OSPF_MULTICAST_ALL_SPF),
        changed(NeighborState::Hello, NeighborState::TwoWay)
    );
    adjacency
}

fn unicast_to(adjacency: &Adjacency) -> Ipv4Addr {
    adjacency.local().router_id
}

#[test]
fn test_lower_router_id_is_master() {
    let a = Ipv4Addr::new(10, 0, 0, 1);
    let b = Ipv4Addr::new(10, 0, 0, 2);
    assert_eq!(local_role(a, b), Role::Master);
    assert_eq!(local_role(b, a), Role::Slave);
}

#[test]
fn test_first_hello_creates_neighbor() {
    let mut adjacency = Adjacency::new(local_router(Ipv4Addr::new(10, 0, 0, 9)));
    assert_eq!(
        deliver(&mut adjacency, &hello(), OSPF_MULTICAST_ALL_SPF),
        Some(NeighborEvent::Added(PEER))
    );

    let neighbor = adjacency.neighbor(PEER).unwrap();
    assert_eq!(neighbor.state, NeighborState::Hello);
    assert!(neighbor.master_is_peer());
    assert_eq!(neighbor.mac, PEER_MAC);
    assert_eq!(adjacency.designated_routers(), (PEER, Ipv4Addr::UNSPECIFIED));

    // without the hello sender the neighbor stays put
    assert_eq!(deliver(&mut adjacency, &hello(), OSPF_MULTICAST_ALL_SPF), None);
    assert_eq!(adjacency.neighbor(PEER).unwrap().state, NeighborState::Hello);
}

#[test]
fn test_own_packets_ignored() {
    let local = Ipv4Addr::new(10, 0, 0, 9);
    let mut adjacency = Adjacency::new(local_router(local));
    let event = adjacency.receive(Received {
        src_mac: PEER_MAC,
        src_ip: local,
        dst_ip: OSPF_MULTICAST_ALL_SPF,
        packet: &hello(),
    });
    assert_eq!(event, None);
    assert_eq!(adjacency.neighbors().count(), 0);
}

#[test]
fn test_slave_reaches_full() {
    let mut adjacency = two_way(Ipv4Addr::new(10, 0, 0, 9));
    let to = unicast_to(&adjacency);

    let init = dbd(dbd_flags::INIT | dbd_flags::MORE | dbd_flags::MASTER, 5000, Vec::new());
    assert_eq!(deliver(&mut adjacency, &init, to), None);
    assert_eq!(adjacency.neighbor(PEER).unwrap().state, NeighborState::TwoWay);

    let first = dbd(dbd_flags::MORE | dbd_flags::MASTER, 5001, vec![peer_lsa_header()]);
    assert_eq!(
        deliver(&mut adjacency, &first, to),
        changed(NeighborState::TwoWay, NeighborState::ExStart)
    );

    let last = dbd(dbd_flags::MASTER, 5002, Vec::new());
    assert_eq!(
        deliver(&mut adjacency, &last, to),
        changed(NeighborState::ExStart, NeighborState::Exchange)
    );
    assert_eq!(
        adjacency.neighbor(PEER).unwrap().negotiation.as_ref().unwrap().sequence,
        5002
    );

    let request = from_peer(OspfBody::LinkStateRequest(vec![OspfLsRequest {
        ls_type: 1,
        link_state_id: Ipv4Addr::new(10, 0, 0, 9),
        advertising_router: Ipv4Addr::new(10, 0, 0, 9),
    }]));
    assert_eq!(
        deliver(&mut adjacency, &request, to),
        changed(NeighborState::Exchange, NeighborState::Loading)
    );

    let update = from_peer(OspfBody::LinkStateUpdate(vec![OspfLsa::router(PEER, 7, Vec::new())]));
    assert_eq!(
        deliver(&mut adjacency, &update, to),
        changed(NeighborState::Loading, NeighborState::Full)
    );

    let neighbor = adjacency.neighbor(PEER).unwrap();
    assert_eq!(neighbor.state, NeighborState::Full);
    assert_eq!(neighbor.pending_acks.len(), 1);
}

fn link_state_request() -> OspfPacket {
    from_peer(OspfBody::LinkStateRequest(vec![OspfLsRequest {
        ls_type: 1,
        link_state_id: Ipv4Addr::new(10, 0, 0, 9),
        advertising_router: Ipv4Addr::new(10, 0, 0, 9),
    }]))
}

fn peer_update() -> OspfPacket {
    from_peer(OspfBody::LinkStateUpdate(vec![OspfLsa::router(PEER, 7, Vec::new())]))
}

#[test]
fn test_request_in_exstart_loads_then_update_completes() {
    let mut adjacency = Adjacency::new(local_router(Ipv4Addr::new(10, 0, 0, 9)));
    assert_eq!(
        deliver(&mut adjacency, &hello(), OSPF_MULTICAST_ALL_SPF),
        Some(NeighborEvent::Added(PEER))
    );
    let neighbor = adjacency.neighbor(PEER).unwrap();
    assert_eq!(neighbor.state, NeighborState::Hello);
    assert!(neighbor.master_is_peer());

    adjacency.set_hello_active(true);
    let to = unicast_to(&adjacency);
    assert_eq!(
        deliver(&mut adjacency, &hello(), to),
        changed(NeighborState::Hello, NeighborState::TwoWay)
    );
    assert_eq!(
        deliver(&mut adjacency, &dbd(dbd_flags::MORE | dbd_flags::MASTER, 42, Vec::new()), to),
        changed(NeighborState::TwoWay, NeighborState::ExStart)
    );
    assert_eq!(
        deliver(&mut adjacency, &link_state_request(), to),
        changed(NeighborState::ExStart, NeighborState::Loading)
    );
    assert_eq!(
        deliver(&mut adjacency, &peer_update(), to),
        changed(NeighborState::Loading, NeighborState::Full)
    );
    assert_eq!(adjacency.neighbor(PEER).unwrap().state, NeighborState::Full);
}

#[test]
fn test_update_in_exchange_completes() {
    let mut adjacency = two_way(Ipv4Addr::new(10, 0, 0, 9));
    let to = unicast_to(&adjacency);
    deliver(&mut adjacency, &dbd(dbd_flags::MORE | dbd_flags::MASTER, 1, Vec::new()), to);
    assert_eq!(
        deliver(&mut adjacency, &dbd(dbd_flags::MASTER, 2, Vec::new()), to),
        changed(NeighborState::ExStart, NeighborState::Exchange)
    );
    assert_eq!(
        deliver(&mut adjacency, &peer_update(), to),
        changed(NeighborState::Exchange, NeighborState::Full)
    );
    assert_eq!(adjacency.neighbor(PEER).unwrap().pending_acks.len(), 1);
}

#[test]
fn test_slave_echoes_master_sequence() {
    let mut adjacency = two_way(Ipv4Addr::new(10, 0, 0, 9));
    let to = unicast_to(&adjacency);
    deliver(&mut adjacency, &dbd(dbd_flags::MORE | dbd_flags::MASTER, 4242, Vec::new()), to);

    let (out, events) = adjacency.tick();
    assert!(events.is_empty());
    let replies: Vec<&OspfDatabaseDescription> = out
        .iter()
        .filter(|o| o.destination != Destination::Multicast)
        .filter_map(|o| match &o.packet.body {
            OspfBody::DatabaseDescription(d) => Some(d),
            _ => None,
        })
        .collect();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].sequence, 4242);
    assert_eq!(replies[0].flags, dbd_flags::MORE);
    assert_eq!(replies[0].lsa_headers.len(), 1);
}

#[test]
fn test_master_drives_exchange() {
    let mut adjacency = two_way(Ipv4Addr::new(10, 0, 0, 1));
    let to = unicast_to(&adjacency);
    assert!(!adjacency.neighbor(PEER).unwrap().master_is_peer());

    let first = dbd(dbd_flags::MORE, 77, vec![peer_lsa_header()]);
    assert_eq!(
        deliver(&mut adjacency, &first, to),
        changed(NeighborState::TwoWay, NeighborState::ExStart)
    );

    let (out, events) = adjacency.tick();
    assert_eq!(
        events,
        vec![NeighborEvent::StateChanged {
            id: PEER,
            from: NeighborState::ExStart,
            to: NeighborState::Exchange,
        }]
    );
    let sent_dbd = out.iter().find_map(|o| match &o.packet.body {
        OspfBody::DatabaseDescription(d) => Some(d.clone()),
        _ => None,
    });
    let sent_dbd = sent_dbd.unwrap();
    assert!(sent_dbd.has_flag(dbd_flags::MASTER));
    assert_eq!(sent_dbd.sequence, INITIAL_DD_SEQUENCE);

    let (_, events) = adjacency.tick();
    assert_eq!(
        events,
        vec![NeighborEvent::StateChanged {
            id: PEER,
            from: NeighborState::Exchange,
            to: NeighborState::Loading,
        }]
    );
    assert_eq!(
        adjacency.neighbor(PEER).unwrap().sequence,
        INITIAL_DD_SEQUENCE + 2
    );

    // loading master requests what the peer advertised
    let (out, _) = adjacency.tick();
    let requests: Vec<&OspfLsRequest> = out
        .iter()
        .filter_map(|o| match &o.packet.body {
            OspfBody::LinkStateRequest(r) => r.first(),
            _ => None,
        })
        .collect();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].advertising_router, PEER);

    let ack = from_peer(OspfBody::LinkStateAck(vec![peer_lsa_header()]));
    assert_eq!(
        deliver(&mut adjacency, &ack, to),
        changed(NeighborState::Loading, NeighborState::Full)
    );
}

#[test]
fn test_unicast_requires_hello_sender() {
    let mut adjacency = two_way(Ipv4Addr::new(10, 0, 0, 9));
    let to = unicast_to(&adjacency);
    adjacency.set_hello_active(false);
    assert_eq!(deliver(&mut adjacency, &dbd(dbd_flags::MASTER, 1, Vec::new()), to), None);
    assert_eq!(adjacency.neighbor(PEER).unwrap().state, NeighborState::TwoWay);
}

#[test]
fn test_update_before_exchange_ignored() {
    let mut adjacency = two_way(Ipv4Addr::new(10, 0, 0, 9));
    let to = unicast_to(&adjacency);
    let update = from_peer(OspfBody::LinkStateUpdate(vec![OspfLsa::router(PEER, 7, Vec::new())]));
    assert_eq!(deliver(&mut adjacency, &update, to), None);
    assert!(adjacency.neighbor(PEER).unwrap().pending_acks.is_empty());
}

#[test]
fn test_tick_idle_without_hello_or_neighbors() {
    let mut adjacency = Adjacency::new(local_router(Ipv4Addr::new(10, 0, 0, 9)));
    adjacency.set_hello_active(true);
    let (out, events) = adjacency.tick();
    assert!(out.is_empty() && events.is_empty());

    let mut adjacency = Adjacency::new(local_router(Ipv4Addr::new(10, 0, 0, 9)));
    deliver(&mut adjacency, &hello(), OSPF_MULTICAST_ALL_SPF);
    let (out, _) = adjacency.tick();
    assert!(out.is_empty());
}

#[test]
fn test_initial_hello_then_interval() {
    let mut adjacency = two_way(Ipv4Addr::new(10, 0, 0, 9));
    let multicast_hellos = |out: &[Outbound]| {
        out.iter()
            .filter(|o| o.destination == Destination::Multicast)
            .filter(|o| matches!(o.packet.body, OspfBody::Hello(_)))
            .count()
    };

    let (out, _) = adjacency.tick();
    assert_eq!(multicast_hellos(&out), 1);
    let announce = out.iter().find(|o| o.destination == Destination::Multicast).unwrap();
    match &announce.packet.body {
        OspfBody::Hello(h) => {
            assert!(h.neighbors.is_empty());
            assert_eq!(h.designated_router, Ipv4Addr::UNSPECIFIED);
            assert_eq!(h.dead_interval, 40);
        }
        _ => unreachable!(),
    }

    let mut total = 0;
    for _ in 0..9 {
        let (out, _) = adjacency.tick();
        total += multicast_hellos(&out);
    }
    assert_eq!(total, 1);
}

#[test]
fn test_full_neighbor_acks_and_announces_networks() {
    let mut adjacency = two_way(Ipv4Addr::new(10, 0, 0, 9));
    let to = unicast_to(&adjacency);
    deliver(&mut adjacency, &dbd(dbd_flags::MASTER | dbd_flags::MORE, 1, Vec::new()), to);
    deliver(&mut adjacency, &dbd(dbd_flags::MASTER, 2, Vec::new()), to);
    deliver(&mut adjacency, &peer_update(), to);
    assert_eq!(adjacency.neighbor(PEER).unwrap().state, NeighborState::Full);

    let first: Ipv4Network = "192.168.77.0/24".parse().unwrap();
    let second: Ipv4Network = "172.16.0.0/16".parse().unwrap();
    assert!(adjacency.add_network(first));
    assert!(!adjacency.add_network(first));
    assert!(adjacency.add_network(second));

    let announced = |out: &[Outbound]| -> Vec<OspfLsa> {
        out.iter()
            .filter(|o| {
                o.destination
                    == Destination::Unicast {
                        mac: PEER_MAC,
                        ip: PEER,
                    }
            })
            .filter_map(|o| match &o.packet.body {
                OspfBody::LinkStateUpdate(lsas) => Some(lsas.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    };

    let (out, _) = adjacency.tick();
    assert!(out
        .iter()
        .any(|o| matches!(&o.packet.body, OspfBody::LinkStateAck(h) if h.len() == 1)));
    let lsas = announced(&out);
    assert_eq!(lsas.len(), 1);
    assert_eq!(lsas[0].header.sequence, INITIAL_LS_SEQUENCE);
    match &lsas[0].body {
        LsaBody::Router { links, .. } => {
            assert_eq!(links.len(), 3);
            assert_eq!(links[0].link_id, Ipv4Addr::new(192, 168, 77, 0));
            assert_eq!(links[0].link_type, link_types::STUB);
            assert_eq!(links[1].link_id, Ipv4Addr::new(172, 16, 0, 0));
            assert_eq!(links[1].link_data, Ipv4Addr::new(255, 255, 0, 0));
            assert_eq!(links[2].link_type, link_types::TRANSIT);
            assert_eq!(links[2].link_id, PEER);
        }
        other => panic!("unexpected body {:?}", other),
    }
    assert!(adjacency.networks().iter().all(|n| !n.pending));

    // nothing left to ack or announce
    let (out, _) = adjacency.tick();
    assert!(out
        .iter()
        .all(|o| !matches!(o.packet.body, OspfBody::LinkStateAck(_) | OspfBody::LinkStateUpdate(_))));

    // removal re-announces the rest as a newer instance
    assert!(adjacency.remove_network(first));
    assert!(!adjacency.remove_network(first));
    let (out, _) = adjacency.tick();
    let lsas = announced(&out);
    assert_eq!(lsas.len(), 1);
    assert_eq!(lsas[0].header.sequence, INITIAL_LS_SEQUENCE + 1);
    match &lsas[0].body {
        LsaBody::Router { links, .. } => {
            assert_eq!(links.len(), 2);
            assert_eq!(links[0].link_id, Ipv4Addr::new(172, 16, 0, 0));
        }
        other => panic!("unexpected body {:?}", other),
    }
}

#[test]
fn test_rendered_frame_headers() {
    let local = Ipv4Addr::new(10, 0, 0, 9);
    let mac = MacAddr::new([0x02, 0, 0, 0, 0, 0x09]);
    let outbound = Outbound {
        destination: Destination::Multicast,
        packet: hello(),
    };
    let frame = Frame::new(render_frame(mac, local, &outbound));

    let ethernet = frame.ethernet().unwrap();
    assert_eq!(ethernet.dst, MacAddr::new([0x01, 0x00, 0x5e, 0x00, 0x00, 0x05]));
    assert_eq!(ethernet.src, mac);
    let ip = frame.ipv4().unwrap();
    assert_eq!(ip.protocol, OSPF_PROTOCOL);
    assert_eq!(ip.ttl, 1);
    assert_eq!(ip.src, local);
    assert_eq!(ip.dst, OSPF_MULTICAST_ALL_SPF);
    assert_eq!(OspfPacket::parse(ip.payload).unwrap(), hello());
}

fn wire_frame(packet: &OspfPacket, dst_ip: Ipv4Addr) -> Frame {
    let destination = if dst_ip == OSPF_MULTICAST_ALL_SPF {
        Destination::Multicast
    } else {
        Destination::Unicast {
            mac: MacAddr::broadcast(),
            ip: dst_ip,
        }
    };
    let outbound = Outbound {
        destination,
        packet: packet.clone(),
    };
    Frame::new(render_frame(PEER_MAC, PEER, &outbound))
}

async fn next_frame(injector: &InjectorHandle) -> Frame {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Some(data) = injector.take() {
                return Frame::new(data);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("no frame injected")
}

#[tokio::test]
async fn test_module_requires_address() {
    let module = OspfModule::new(OspfConfig::default(), ModuleContext::default());
    assert!(module.start().await.is_err());
    assert!(module.hooks().is_empty());
    assert!(module.set_hello(true).is_err());
    module.stop().await.unwrap();
}

#[tokio::test]
async fn test_module_tracks_neighbor_and_sends() {
    let local = Ipv4Addr::new(10, 0, 0, 9);
    let observer = Arc::new(RecordingObserver::new());
    let config = OspfConfig {
        hello_interval: 1,
        drop_inbound: false,
        sender_interval: Duration::from_millis(10),
        ..OspfConfig::default()
    };
    let module = OspfModule::new(config, ModuleContext::new(Arc::new(TracingLog), observer.clone()));
    let injector = InjectorHandle::new("ospf");
    module.set_address(local, MASK);
    module.set_injector(injector.clone());
    module.start().await.unwrap();
    assert!(module.start().await.is_err());

    let hooks = module.hooks();
    let hook = hooks.get(Layer::Ip).unwrap();
    let frame = wire_frame(&hello(), OSPF_MULTICAST_ALL_SPF);
    let mut view = PacketView::new(&frame).unwrap();
    view.ip = Some(frame.ipv4().unwrap());
    assert_eq!(hook.check(&view), Verdict::MATCH);

    hook.handle(&view).unwrap();
    module.set_hello(true).unwrap();
    hook.handle(&view).unwrap();

    let neighbors = module.neighbors().await.unwrap();
    assert_eq!(neighbors.len(), 1);
    assert_eq!(neighbors[0].state, NeighborState::TwoWay);

    let sent = next_frame(&injector).await;
    let ip = sent.ipv4().unwrap();
    assert_eq!(ip.protocol, OSPF_PROTOCOL);
    assert_eq!(ip.src, local);
    let packet = OspfPacket::parse(ip.payload).unwrap();
    assert_eq!(packet.header.router_id, local);

    let network: Ipv4Network = "172.16.0.0/16".parse().unwrap();
    assert!(module.add_network(network).await.unwrap());
    assert!(module.remove_network(network).await.unwrap());

    module.stop().await.unwrap();
    assert!(module.neighbors().await.is_err());

    let changes = observer.changes();
    assert!(changes
        .iter()
        .any(|(table, c)| *table == "neighbor" && c.key == PEER.to_string()));
    assert!(changes.len() >= 2);
}

#[tokio::test]
async fn test_hook_skips_other_protocols() {
    let outbound = Outbound {
        destination: Destination::Multicast,
        packet: hello(),
    };
    let mut data = render_frame(PEER_MAC, PEER, &outbound);
    // protocol byte of the IPv4 header
    data[14 + 9] = 88;
    let frame = Frame::new(data);
    let mut view = PacketView::new(&frame).unwrap();
    view.ip = Some(frame.ipv4().unwrap());

    let module = OspfModule::new(OspfConfig::default(), ModuleContext::default());
    module.set_address(Ipv4Addr::new(10, 0, 0, 9), MASK);
    module.start().await.unwrap();
    let hooks = module.hooks();
    assert_eq!(hooks.get(Layer::Ip).unwrap().check(&view), Verdict::SKIP);
    module.stop().await.unwrap();
}
