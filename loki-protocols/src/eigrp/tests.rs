//! EIGRP module tests: beacon, peer discovery, acknowledgments, updates,
//! goodbyes and MD5 checks

use crate::eigrp::packet::*;
use crate::eigrp::{EigrpConfig, EigrpModule, Md5Key};
use bytes::Bytes;
use loki_core::{
    ChangeKind, Error, Frame, InjectorHandle, Layer, MacAddr, ModuleContext, PacketView,
    ProtocolModule, RecordingObserver, TracingLog, Verdict,
};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

const LOCAL: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const PEER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
const PEER_MAC: MacAddr = MacAddr([0x00, 0x1b, 0x54, 0x00, 0x00, 0x02]);

struct Sent {
    dst_mac: MacAddr,
    dst_ip: Ipv4Addr,
    ttl: u8,
    packet: EigrpPacket,
}

fn decode(data: &[u8]) -> Option<Sent> {
    let frame = Frame::new(data.to_vec());
    let eth = frame.ethernet().ok()?;
    let ip = frame.ipv4().ok()?;
    Some(Sent {
        dst_mac: eth.dst,
        dst_ip: ip.dst,
        ttl: ip.ttl,
        packet: EigrpPacket::parse(ip.payload).ok()?,
    })
}

async fn wait_for(injector: &InjectorHandle, wanted: impl Fn(&Sent) -> bool) -> Sent {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Some(sent) = injector.take().as_deref().and_then(decode) {
                if wanted(&sent) {
                    return sent;
                }
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("expected EIGRP packet not injected")
}

fn config(auth: Option<Md5Key>) -> EigrpConfig {
    EigrpConfig {
        asn: 100,
        hold_time: Duration::from_millis(20),
        auth,
        ..EigrpConfig::default()
    }
}

fn module(config: EigrpConfig, observer: Arc<RecordingObserver>, injector: &InjectorHandle) -> EigrpModule {
    let module = EigrpModule::new(config, ModuleContext::new(Arc::new(TracingLog), observer));
    module.set_address(LOCAL, Ipv4Addr::new(255, 255, 255, 0));
    module.set_injector(injector.clone());
    module
}

fn from_peer(packet: &EigrpPacket, dst: Ipv4Addr) -> Frame {
    let dst_mac = if dst == EIGRP_MULTICAST {
        MacAddr::ipv4_multicast(dst)
    } else {
        MacAddr::zero()
    };
    Frame::new(packet.to_frame(PEER_MAC, dst_mac, PEER, dst).unwrap())
}

fn feed(module: &EigrpModule, frame: &Frame) {
    let mut view = PacketView::new(frame).unwrap();
    view.ip = Some(frame.ipv4().unwrap());
    let hooks = module.hooks();
    let hook = hooks.get(Layer::Ip).unwrap();
    assert_eq!(hook.check(&view), Verdict::MATCH);
    hook.handle(&view).unwrap();
}

fn update(seq: u32) -> EigrpPacket {
    EigrpPacket::new(EigrpOpcode::Update, 100)
        .with_flags(flags::INIT)
        .with_sequence(seq)
}

#[tokio::test]
async fn test_requires_address() {
    let module = EigrpModule::new(
        EigrpConfig::default(),
        ModuleContext::new(Arc::new(TracingLog), Arc::new(RecordingObserver::new())),
    );
    assert!(module.start().await.is_err());
    assert!(module.hooks().is_empty());
    assert!(module.set_hello(true).is_err());
}

#[tokio::test]
async fn test_hook_skips_other_protocols() {
    let injector = InjectorHandle::new("eigrp");
    let module = module(config(None), Arc::new(RecordingObserver::new()), &injector);
    module.start().await.unwrap();

    let mut bytes = from_peer(&update(1), LOCAL).data().to_vec();
    bytes[14 + 9] = 89;
    let frame = Frame::new(bytes);
    let mut view = PacketView::new(&frame).unwrap();
    view.ip = Some(frame.ipv4().unwrap());
    assert_eq!(module.hooks().get(Layer::Ip).unwrap().check(&view), Verdict::SKIP);
    module.stop().await.unwrap();
}

#[tokio::test]
async fn test_hello_beacon() {
    let injector = InjectorHandle::new("eigrp");
    let module = module(config(None), Arc::new(RecordingObserver::new()), &injector);
    module.start().await.unwrap();
    module.set_hello(true).unwrap();

    let sent = wait_for(&injector, |s| s.packet.is_hello()).await;
    assert_eq!(sent.dst_ip, EIGRP_MULTICAST);
    assert_eq!(sent.dst_mac, MacAddr::ipv4_multicast(EIGRP_MULTICAST));
    assert_eq!(sent.ttl, EIGRP_TTL);
    assert_eq!(sent.packet.asn, 100);
    assert_eq!(sent.packet.hold_time(), Some(15));

    module.set_hello(false).unwrap();
    module.stop().await.unwrap();
}

#[tokio::test]
async fn test_peer_discovery_and_ack() {
    let observer = Arc::new(RecordingObserver::new());
    let injector = InjectorHandle::new("eigrp");
    let module = module(config(None), observer.clone(), &injector);
    module.start().await.unwrap();

    // multicast traffic alone does not create a peer
    feed(&module, &from_peer(&EigrpPacket::hello(100, 15), EIGRP_MULTICAST));
    assert!(module.peers().await.unwrap().is_empty());

    feed(&module, &from_peer(&update(7), LOCAL));
    let peers = module.peers().await.unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].address, PEER);
    assert_eq!(peers[0].mac, PEER_MAC);

    let ack = wait_for(&injector, |s| s.dst_ip == PEER).await;
    assert_eq!(ack.dst_mac, PEER_MAC);
    assert!(ack.packet.is_hello());
    assert_eq!(ack.packet.ack, 7);
    assert!(ack.packet.tlvs.is_empty());

    module.stop().await.unwrap();
    let kinds: Vec<ChangeKind> = observer
        .changes()
        .into_iter()
        .filter(|(table, _)| *table == "neighbor")
        .map(|(_, change)| change.kind)
        .collect();
    assert_eq!(kinds, vec![ChangeKind::Added, ChangeKind::Removed]);
}

#[tokio::test]
async fn test_operator_update_and_goodbye() {
    let injector = InjectorHandle::new("eigrp");
    let module = module(config(None), Arc::new(RecordingObserver::new()), &injector);
    module.start().await.unwrap();
    feed(&module, &from_peer(&EigrpPacket::hello(100, 15), LOCAL));
    assert_eq!(module.peers().await.unwrap()[0].hold_time, Some(15));

    let stranger = Ipv4Addr::new(10, 0, 0, 99);
    assert!(matches!(
        module.update(stranger, update(0)).await,
        Err(Error::NotFound(_))
    ));

    let route = InternalRoute {
        next_hop: Ipv4Addr::UNSPECIFIED,
        metric: RouteMetric::default(),
        prefix: RoutePrefix {
            len: 24,
            address: Ipv4Addr::new(192, 168, 50, 0),
        },
    };
    let forged = EigrpPacket::new(EigrpOpcode::Update, 100).add_tlv(EigrpTlv::Internal(route.clone()));
    module.update(PEER, forged).await.unwrap();
    let sent = wait_for(&injector, |s| s.packet.opcode == EigrpOpcode::Update).await;
    assert_eq!(sent.dst_ip, PEER);
    assert_eq!(sent.packet.sequence, 1);
    assert_eq!(sent.packet.routes().next(), Some(&route));

    module.goodbye(PEER).await.unwrap();
    let bye = decode(&injector.take().unwrap()).unwrap();
    assert!(matches!(
        bye.packet.tlvs[0],
        EigrpTlv::Parameters { k: [255, 255, 255, 255, 255], .. }
    ));
    assert!(module.peers().await.unwrap().is_empty());
    assert!(module.goodbye(PEER).await.is_err());
    module.stop().await.unwrap();
}

#[tokio::test]
async fn test_md5_keyed_session() {
    let key = Md5Key {
        key_id: 1,
        key: Bytes::from_static(b"cisco"),
    };
    let injector = InjectorHandle::new("eigrp");
    let module = module(config(Some(key)), Arc::new(RecordingObserver::new()), &injector);
    module.start().await.unwrap();

    let wrong = update(3).authenticate(1, b"guess").unwrap();
    feed(&module, &from_peer(&wrong, LOCAL));
    assert!(module.peers().await.unwrap().is_empty());

    let right = update(4).authenticate(1, b"cisco").unwrap();
    feed(&module, &from_peer(&right, LOCAL));
    assert_eq!(module.peers().await.unwrap().len(), 1);

    let ack = wait_for(&injector, |s| s.dst_ip == PEER).await;
    assert_eq!(ack.packet.ack, 4);
    assert!(ack.packet.verify(b"cisco").unwrap());
    module.stop().await.unwrap();
}
