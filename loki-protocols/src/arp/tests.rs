//! ARP module tests: scanning, spoof lifecycle and the relay hook

use crate::arp::{scan_targets, ArpConfig, ArpModule, ArpPacket};
use loki_core::{
    ChangeKind, Frame, InjectorHandle, Layer, MacAddr, ModuleContext, PacketView,
    ProtocolModule, RecordingObserver, TracingLog, Verdict,
};
use loki_packet::{EtherType, EthernetFrame, IpProtocol, Ipv4Packet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

const A: MacAddr = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x0a]);
const B: MacAddr = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x0b]);
const IP_A: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 10);
const IP_B: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 11);

fn request(src: MacAddr, ip: Ipv4Addr, target: Ipv4Addr) -> Frame {
    Frame::new(ArpPacket::request(src, ip, target).to_frame(MacAddr::broadcast(), src))
}

fn ip_frame(dst: MacAddr, src: MacAddr) -> Frame {
    let ip = Ipv4Packet::new(IP_A, IP_B, IpProtocol::UDP, vec![0u8; 8]);
    Frame::new(EthernetFrame::new(dst, src, EtherType::IPv4, ip.to_bytes()).to_bytes())
}

fn arp_of(data: &[u8]) -> Option<ArpPacket> {
    let frame = Frame::new(data.to_vec());
    let eth = frame.ethernet().ok()?;
    ArpPacket::parse(eth.payload).ok()
}

async fn wait_for(injector: &InjectorHandle, wanted: impl Fn(&[u8]) -> bool) -> Vec<u8> {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Some(data) = injector.take() {
                if wanted(&data) {
                    return data.to_vec();
                }
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("expected frame not injected")
}

fn module(observer: Arc<RecordingObserver>, injector: &InjectorHandle) -> ArpModule {
    let config = ArpConfig {
        period: Duration::from_secs(600),
    };
    let module = ArpModule::new(config, ModuleContext::new(Arc::new(TracingLog), observer));
    module.set_injector(injector.clone());
    module
}

fn feed(module: &ArpModule, frame: &Frame) {
    let hooks = module.hooks();
    hooks
        .get(Layer::Ethernet)
        .unwrap()
        .handle(&PacketView::new(frame).unwrap())
        .unwrap();
}

/// Two known hosts with an active A/B group; the replay burst is drained
async fn spoofing(module: &ArpModule, injector: &InjectorHandle) -> crate::arp::SpoofId {
    module.start().await.unwrap();
    feed(module, &request(A, IP_A, IP_B));
    feed(module, &request(B, IP_B, IP_A));
    assert_eq!(module.hosts().await.unwrap().len(), 2);

    let id = module.add_spoof(vec![A], vec![B]).await.unwrap();
    module.activate(id).await.unwrap();
    wait_for(injector, |data| {
        arp_of(data).is_some_and(|arp| arp.sender_mac != A && arp.sender_mac != B)
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    injector.take();
    id
}

#[test]
fn test_scan_targets() {
    let mask = Ipv4Addr::new(255, 255, 255, 252);
    assert_eq!(
        scan_targets(Ipv4Addr::new(10, 0, 0, 1), mask).unwrap(),
        vec![Ipv4Addr::new(10, 0, 0, 2)]
    );
    let mask = Ipv4Addr::new(255, 255, 255, 0);
    assert_eq!(scan_targets(Ipv4Addr::new(10, 0, 0, 1), mask).unwrap().len(), 253);
    let mask = Ipv4Addr::new(255, 255, 255, 254);
    assert_eq!(
        scan_targets(Ipv4Addr::new(10, 0, 0, 0), mask).unwrap(),
        vec![Ipv4Addr::new(10, 0, 0, 1)]
    );
    assert!(scan_targets(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(255, 0, 255, 0)).is_err());
}

#[tokio::test]
async fn test_hooks_only_while_running() {
    let injector = InjectorHandle::new("arp");
    let module = module(Arc::new(RecordingObserver::new()), &injector);
    assert!(module.hooks().is_empty());
    module.start().await.unwrap();

    let hooks = module.hooks();
    let frame = request(A, IP_A, IP_B);
    let view = PacketView::new(&frame).unwrap();
    assert_eq!(hooks.get(Layer::Ethernet).unwrap().check(&view), Verdict::CLAIM);

    let frame = ip_frame(B, A);
    let mut view = PacketView::new(&frame).unwrap();
    assert_eq!(hooks.get(Layer::Ethernet).unwrap().check(&view), Verdict::SKIP);
    view.ip = Some(frame.ipv4().unwrap());
    // nothing spoofed yet
    assert_eq!(hooks.get(Layer::Ip).unwrap().check(&view), Verdict::SKIP);

    module.stop().await.unwrap();
    assert!(module.hooks().is_empty());
    module.stop().await.unwrap();
}

#[tokio::test]
async fn test_spoof_relay_and_restore() {
    let observer = Arc::new(RecordingObserver::new());
    let injector = InjectorHandle::new("arp");
    let module = module(observer.clone(), &injector);
    let id = spoofing(&module, &injector).await;

    let hosts = module.hosts().await.unwrap();
    assert!(hosts.iter().all(|h| h.spoofed));
    let ghost = |mac| hosts.iter().find(|h| h.mac == mac).unwrap().ghost;

    // A talks to ghost(B): forwarded to B from ghost(A)
    let frame = ip_frame(ghost(B), A);
    let mut view = PacketView::new(&frame).unwrap();
    view.ip = Some(frame.ipv4().unwrap());
    let hooks = module.hooks();
    let relay = hooks.get(Layer::Ip).unwrap();
    assert_eq!(relay.check(&view), Verdict::MATCH);
    relay.handle(&view).unwrap();
    let relayed = injector.take().unwrap();
    assert_eq!(&relayed[0..6], B.as_bytes());
    assert_eq!(&relayed[6..12], ghost(A).as_bytes());
    assert_eq!(&relayed[12..], &frame.data()[12..]);

    let spoofs = module.spoofs().await.unwrap();
    assert_eq!(spoofs[0].pairs[0].relayed, 1);

    module.deactivate(id).await.unwrap();
    let restore = arp_of(&injector.take().unwrap()).unwrap();
    assert!(restore.sender_mac == A || restore.sender_mac == B);
    assert!(module.hosts().await.unwrap().iter().all(|h| !h.spoofed));
    assert_eq!(relay.check(&view), Verdict::SKIP);

    module.remove_spoof(id).await.unwrap();
    assert!(module.spoofs().await.unwrap().is_empty());
    assert!(module.activate(id).await.is_err());
    module.stop().await.unwrap();

    let host_changes: Vec<ChangeKind> = observer
        .changes()
        .into_iter()
        .filter(|(table, _)| *table == "host")
        .map(|(_, change)| change.kind)
        .collect();
    assert_eq!(host_changes.len(), 6);
    assert_eq!(&host_changes[..2], &[ChangeKind::Added, ChangeKind::Added]);
    assert!(host_changes[2..].iter().all(|k| *k == ChangeKind::Updated));
}

#[tokio::test]
async fn test_relay_outlives_restore_replies() {
    let injector = InjectorHandle::new("arp");
    let module = Arc::new(module(Arc::new(RecordingObserver::new()), &injector));
    let id = spoofing(&module, &injector).await;
    let ghost_b = module
        .hosts()
        .await
        .unwrap()
        .into_iter()
        .find(|h| h.mac == B)
        .unwrap()
        .ghost;
    let frame = ip_frame(ghost_b, A);
    let mut view = PacketView::new(&frame).unwrap();
    view.ip = Some(frame.ipv4().unwrap());
    let hooks = module.hooks();
    let relay = hooks.get(Layer::Ip).unwrap();

    let deactivating = tokio::spawn({
        let module = Arc::clone(&module);
        async move { module.deactivate(id).await }
    });
    // first restore reply: the worker is pacing before the next one
    loop {
        if let Some(data) = injector.take() {
            let arp = arp_of(&data).unwrap();
            assert!(arp.sender_mac == A || arp.sender_mac == B);
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(relay.check(&view), Verdict::MATCH);

    deactivating.await.unwrap().unwrap();
    assert_eq!(relay.check(&view), Verdict::SKIP);
    module.stop().await.unwrap();
}

#[tokio::test]
async fn test_request_between_spoofed_hosts_answered() {
    let injector = InjectorHandle::new("arp");
    let module = module(Arc::new(RecordingObserver::new()), &injector);
    spoofing(&module, &injector).await;
    let ghost_b = module
        .hosts()
        .await
        .unwrap()
        .into_iter()
        .find(|h| h.mac == B)
        .unwrap()
        .ghost;

    feed(&module, &request(A, IP_A, IP_B));
    let answer = wait_for(&injector, |data| data[0..6] == *A.as_bytes()).await;
    let arp = arp_of(&answer).unwrap();
    assert!(!arp.is_request());
    assert_eq!(arp.sender_mac, ghost_b);
    assert_eq!(arp.sender_ip, IP_B);
    module.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_restores_active_groups() {
    let injector = InjectorHandle::new("arp");
    let module = module(Arc::new(RecordingObserver::new()), &injector);
    spoofing(&module, &injector).await;

    module.stop().await.unwrap();
    let restore = arp_of(&injector.take().unwrap()).unwrap();
    assert!(restore.sender_mac == A || restore.sender_mac == B);
}

#[tokio::test]
async fn test_scan_uses_local_network() {
    let injector = InjectorHandle::new("arp");
    let module = module(Arc::new(RecordingObserver::new()), &injector);
    module.start().await.unwrap();
    assert!(module.scan().await.is_err());
    module.stop().await.unwrap();

    module.set_address(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(255, 255, 255, 252));
    module.start().await.unwrap();
    assert_eq!(module.scan().await.unwrap(), 1);
    let request = arp_of(&injector.take().unwrap()).unwrap();
    assert!(request.is_request());
    assert_eq!(request.sender_ip, Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!(request.target_ip, Ipv4Addr::new(10, 0, 0, 2));
    module.stop().await.unwrap();
}
