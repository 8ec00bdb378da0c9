//! Device lifecycle tests against the loopback transport.
//!
//! These drive the full load → create → ready → enslave flow without
//! touching a kernel: requests queue in the mock, the tests decide how
//! each completes, and readiness notifications are injected by hand.

use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;

use netdev::attr::{Attr, AttrIter};
use netdev::definition::{DeviceSettings, MemoryDefinition, MemorySource};
use netdev::kind::{
    BridgeConfig, DummyConfig, Kind, KindConfig, TunnelConfig, VlanConfig, VrfConfig,
};
use netdev::message::{MessageIter, RTM_NEWLINK, RTM_SETLINK};
use netdev::rtnl::mock::{self, MockRtnl, TestLink};
use netdev::rtnl::{Reply, Rtnl};
use netdev::types::{IfInfoMsg, IflaAttr, IflaInfo};
use netdev::{Error, LinkHandle, MachineId, Manager, State};

fn manager_with(definitions: Vec<MemoryDefinition>) -> (Rc<Manager>, Rc<MockRtnl>) {
    let rtnl = MockRtnl::new();
    let manager = Rc::new(Manager::new(
        rtnl.clone() as Rc<dyn Rtnl>,
        Box::new(MemorySource::new(definitions)),
        MachineId::from_bytes([0x11; 16]),
    ));
    manager.attach();
    (manager, rtnl)
}

fn bridge(name: &str) -> MemoryDefinition {
    MemoryDefinition::new(
        name,
        DeviceSettings::new(KindConfig::Bridge(BridgeConfig::default())),
    )
}

fn recorder() -> (Rc<RefCell<Vec<i32>>>, impl Fn() -> Box<dyn FnOnce(&Reply)>) {
    let fired: Rc<RefCell<Vec<i32>>> = Rc::new(RefCell::new(Vec::new()));
    let make = {
        let fired = fired.clone();
        move || {
            let fired = fired.clone();
            Box::new(move |reply: &Reply| fired.borrow_mut().push(reply.errno()))
                as Box<dyn FnOnce(&Reply)>
        }
    };
    (fired, make)
}

/// One parsed request as it went out on the wire.
struct SentRequest {
    msg_type: u16,
    ifindex: i32,
    payload: Vec<u8>,
}

impl SentRequest {
    fn parse(buf: &[u8]) -> Self {
        let (header, payload) = MessageIter::new(buf)
            .next()
            .expect("empty request")
            .expect("malformed request");
        let ifinfo = IfInfoMsg::from_bytes(payload).expect("missing ifinfomsg");
        Self {
            msg_type: header.nlmsg_type,
            ifindex: ifinfo.ifi_index,
            payload: payload[IfInfoMsg::SIZE..].to_vec(),
        }
    }

    fn attr(&self, kind: u16) -> Option<Attr<'_>> {
        AttrIter::new(&self.payload).find(|attr| attr.kind() == kind)
    }
}

#[test]
fn test_master_is_created_at_load_and_becomes_ready() {
    let (manager, rtnl) = manager_with(vec![bridge("br0")]);
    manager.load_all().unwrap();

    let dev = manager.get("br0").unwrap();
    assert_eq!(dev.state(), State::Creating);
    assert_eq!(rtnl.pending(), 1);

    let request = SentRequest::parse(&rtnl.sent()[0]);
    assert_eq!(request.msg_type, RTM_NEWLINK);
    assert_eq!(
        request
            .attr(IflaAttr::Ifname as u16)
            .unwrap()
            .as_str()
            .unwrap(),
        "br0"
    );

    rtnl.complete_next(Reply::ack());
    assert_eq!(dev.state(), State::Creating);

    rtnl.notify(&mock::newlink(7, "br0", "bridge"));
    assert_eq!(dev.state(), State::Ready);
    assert_eq!(dev.ifindex(), Some(7));
}

#[test]
fn test_joins_before_readiness_queue_and_drain_in_order() {
    let (manager, rtnl) = manager_with(vec![bridge("br0")]);
    manager.load_all().unwrap();
    let dev = manager.get("br0").unwrap();

    let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
    for (name, index) in [("eth0", 2u32), ("eth1", 3u32)] {
        let link: LinkHandle = TestLink::new(name, index);
        let order = order.clone();
        dev.join(
            &link,
            Box::new(move |reply| {
                assert!(reply.is_ack());
                order.borrow_mut().push(name);
            }),
        )
        .unwrap();
    }
    assert_eq!(dev.pending_joins(), 2);

    // Creation acknowledged, then the kernel reports the interface.
    rtnl.complete_next(Reply::ack());
    rtnl.notify(&mock::newlink(7, "br0", "bridge"));

    // The drain issued one enslave request per queued join.
    assert_eq!(dev.pending_joins(), 0);
    assert_eq!(rtnl.pending(), 2);

    let enslave = SentRequest::parse(&rtnl.sent()[1]);
    assert_eq!(enslave.msg_type, RTM_SETLINK);
    assert_eq!(enslave.ifindex, 2);
    assert_eq!(
        enslave
            .attr(IflaAttr::Master as u16)
            .unwrap()
            .as_u32()
            .unwrap(),
        7
    );

    rtnl.complete_all(Reply::ack());
    assert_eq!(*order.borrow(), vec!["eth0", "eth1"]);
}

#[test]
fn test_join_on_ready_master_dispatches_immediately() {
    let (manager, rtnl) = manager_with(vec![bridge("br0")]);
    manager.load_all().unwrap();
    let dev = manager.get("br0").unwrap();
    rtnl.complete_next(Reply::ack());
    rtnl.notify(&mock::newlink(7, "br0", "bridge"));
    assert_eq!(dev.state(), State::Ready);

    let (fired, completion) = recorder();
    let link: LinkHandle = TestLink::new("eth0", 2);
    dev.join(&link, completion()).unwrap();

    // Dispatched, not queued.
    assert_eq!(dev.pending_joins(), 0);
    assert_eq!(rtnl.pending(), 1);
    assert!(fired.borrow().is_empty());

    rtnl.complete_next(Reply::ack());
    assert_eq!(*fired.borrow(), vec![0]);
}

#[test]
fn test_join_on_failed_master_completes_synchronously() {
    let (manager, rtnl) = manager_with(vec![bridge("br0")]);
    manager.load_all().unwrap();
    let dev = manager.get("br0").unwrap();
    rtnl.complete_next(Reply::from_errno(-libc::EPERM));
    assert_eq!(dev.state(), State::Failed);

    let (fired, completion) = recorder();
    let link: LinkHandle = TestLink::new("eth0", 2);
    dev.join(&link, completion()).unwrap();

    // No transport round-trip: the completion already ran.
    assert_eq!(*fired.borrow(), vec![-libc::ENODEV]);
    assert_eq!(rtnl.pending(), 0);
}

#[test]
fn test_creation_failure_cancels_queued_joins() {
    let (manager, rtnl) = manager_with(vec![bridge("br0")]);
    manager.load_all().unwrap();
    let dev = manager.get("br0").unwrap();

    let (fired, completion) = recorder();
    let link: LinkHandle = TestLink::new("eth0", 2);
    dev.join(&link, completion()).unwrap();

    rtnl.complete_next(Reply::from_errno(-libc::EINVAL));
    assert_eq!(dev.state(), State::Failed);
    assert_eq!(*fired.borrow(), vec![-libc::ENODEV]);
    assert_eq!(dev.pending_joins(), 0);
}

#[test]
fn test_eexist_reply_adopts_the_existing_device() {
    let (manager, rtnl) = manager_with(vec![bridge("br0")]);
    manager.load_all().unwrap();
    let dev = manager.get("br0").unwrap();

    rtnl.complete_next(Reply::from_errno(-libc::EEXIST));
    assert_eq!(dev.state(), State::Creating);

    rtnl.notify(&mock::newlink(4, "br0", "bridge"));
    assert_eq!(dev.state(), State::Ready);
    assert_eq!(dev.ifindex(), Some(4));
}

#[test]
fn test_conflicting_ifindex_fails_the_device() {
    let (manager, rtnl) = manager_with(vec![bridge("br0")]);
    manager.load_all().unwrap();
    let dev = manager.get("br0").unwrap();
    rtnl.complete_next(Reply::ack());
    rtnl.notify(&mock::newlink(5, "br0", "bridge"));
    assert_eq!(dev.ifindex(), Some(5));

    let err = dev
        .set_ifindex(&mock::newlink(7, "br0", "bridge"))
        .unwrap_err();
    assert!(err.is_already_exists());
    assert_eq!(dev.state(), State::Failed);

    let (fired, completion) = recorder();
    let link: LinkHandle = TestLink::new("eth0", 2);
    dev.join(&link, completion()).unwrap();
    assert_eq!(*fired.borrow(), vec![-libc::ENODEV]);
}

#[test]
fn test_duplicate_names_register_once_and_last_definition_wins() {
    // Enumeration order: bridge first, dummy second. Reverse loading
    // means the dummy loads first and the bridge is rejected.
    let definitions = vec![
        bridge("dev0"),
        MemoryDefinition::new("dev0", DeviceSettings::new(KindConfig::Dummy(DummyConfig))),
    ];
    let (manager, rtnl) = manager_with(definitions);
    manager.load_all().unwrap();

    let dev = manager.get("dev0").unwrap();
    assert_eq!(dev.kind(), Kind::Dummy);
    assert_eq!(manager.netdevs().len(), 1);
    // Only the surviving record asked the kernel for anything.
    assert_eq!(rtnl.sent().len(), 1);
}

#[test]
fn test_inapplicable_definitions_are_skipped_without_aborting() {
    let definitions = vec![
        bridge("br0").unmatched(),
        MemoryDefinition::kindless("memory:no-kind", "mystery0"),
        MemoryDefinition::nameless("memory:no-name", Kind::Bridge),
        bridge("br1"),
    ];
    let (manager, _rtnl) = manager_with(definitions);
    manager.load_all().unwrap();

    assert!(manager.get("br0").is_err());
    assert!(manager.get("mystery0").is_err());
    assert!(manager.get("br1").is_ok());
    assert_eq!(manager.netdevs().len(), 1);
}

#[test]
fn test_broken_definition_aborts_the_reload() {
    let definitions = vec![
        MemoryDefinition::broken("memory:bad", "unbalanced section"),
        bridge("br0"),
    ];
    let (manager, _rtnl) = manager_with(definitions);
    let err = manager.load_all().unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
    // br0 loaded before the broken definition aborted the pass.
    assert!(manager.get("br0").is_ok());
}

#[test]
fn test_failed_verification_skips_the_definition() {
    let definitions = vec![
        MemoryDefinition::new(
            "vrf-blue",
            DeviceSettings::new(KindConfig::Vrf(VrfConfig::default())),
        ),
        bridge("br0"),
    ];
    let (manager, _rtnl) = manager_with(definitions);
    manager.load_all().unwrap();

    assert!(manager.get("vrf-blue").is_err());
    assert!(manager.get("br0").is_ok());
}

#[test]
fn test_generated_macs_are_stable_and_vlan_is_exempt() {
    let vlan = MemoryDefinition::new(
        "vlan10",
        DeviceSettings::new(KindConfig::Vlan(VlanConfig { id: Some(10) })),
    );
    let (manager, _rtnl) = manager_with(vec![bridge("br0"), vlan]);
    manager.load_all().unwrap();

    let bridge_mac = manager.get("br0").unwrap().mac().unwrap();
    assert_eq!(bridge_mac[0] & 0x01, 0, "unicast");
    assert_eq!(bridge_mac[0] & 0x02, 0x02, "locally administered");

    // Same machine id and name produce the same address on reload.
    manager.load_all().unwrap();
    assert_eq!(manager.get("br0").unwrap().mac().unwrap(), bridge_mac);

    assert_eq!(manager.get("vlan10").unwrap().mac(), None);
}

#[test]
fn test_stacked_join_creates_on_top_of_the_link() {
    let vlan = MemoryDefinition::new(
        "vlan10",
        DeviceSettings::new(KindConfig::Vlan(VlanConfig { id: Some(10) })),
    );
    let (manager, rtnl) = manager_with(vec![vlan]);
    manager.load_all().unwrap();

    let dev = manager.get("vlan10").unwrap();
    // Stacked kinds wait for a backing link.
    assert_eq!(dev.state(), State::Loading);
    assert_eq!(rtnl.pending(), 0);

    let (fired, completion) = recorder();
    let link: LinkHandle = TestLink::new("eth0", 2);
    dev.join(&link, completion()).unwrap();
    assert_eq!(dev.state(), State::Creating);

    let request = SentRequest::parse(&rtnl.sent()[0]);
    assert_eq!(request.msg_type, RTM_NEWLINK);
    assert_eq!(
        request
            .attr(IflaAttr::Link as u16)
            .unwrap()
            .as_u32()
            .unwrap(),
        2
    );

    // The id rides inside IFLA_LINKINFO / IFLA_INFO_DATA.
    let linkinfo = request.attr(IflaAttr::Linkinfo as u16).unwrap();
    let kind = linkinfo
        .nested()
        .find(|attr| attr.kind() == IflaInfo::Kind as u16)
        .unwrap();
    assert_eq!(kind.as_str().unwrap(), "vlan");
    let vlan_id = linkinfo
        .nested()
        .find(|attr| attr.kind() == IflaInfo::Data as u16)
        .unwrap()
        .nested()
        .find(|attr| attr.kind() == 1) // IFLA_VLAN_ID
        .unwrap();
    assert_eq!(vlan_id.as_u16().unwrap(), 10);

    rtnl.complete_next(Reply::ack());
    assert_eq!(*fired.borrow(), vec![0]);
}

#[test]
fn test_enslaving_brings_an_up_link_down_first() {
    let (manager, rtnl) = manager_with(vec![bridge("br0")]);
    manager.load_all().unwrap();
    let dev = manager.get("br0").unwrap();
    rtnl.complete_next(Reply::ack());
    rtnl.notify(&mock::newlink(7, "br0", "bridge"));

    let up = TestLink::up("eth0", 2);
    let up_handle: LinkHandle = up.clone();
    dev.join(&up_handle, Box::new(|_| {})).unwrap();
    assert_eq!(up.times_brought_down(), 1);

    let down = TestLink::new("eth1", 3);
    let down_handle: LinkHandle = down.clone();
    dev.join(&down_handle, Box::new(|_| {})).unwrap();
    assert_eq!(down.times_brought_down(), 0);
}

#[test]
fn test_bridge_properties_follow_readiness() {
    let config = BridgeConfig {
        stp: Some(true),
        ..Default::default()
    };
    let definition = MemoryDefinition::new("br0", DeviceSettings::new(KindConfig::Bridge(config)));
    let (manager, rtnl) = manager_with(vec![definition]);
    manager.load_all().unwrap();
    rtnl.complete_next(Reply::ack());
    rtnl.notify(&mock::newlink(7, "br0", "bridge"));

    // The post-create request targets the now-known index.
    assert_eq!(rtnl.pending(), 1);
    let request = SentRequest::parse(&rtnl.sent()[1]);
    assert_eq!(request.msg_type, RTM_NEWLINK);
    assert_eq!(request.ifindex, 7);

    let stp = request
        .attr(IflaAttr::Linkinfo as u16)
        .unwrap()
        .nested()
        .find(|attr| attr.kind() == IflaInfo::Data as u16)
        .unwrap()
        .nested()
        .find(|attr| attr.kind() == 5) // IFLA_BR_STP_STATE
        .unwrap();
    assert_eq!(stp.as_u32().unwrap(), 1);

    rtnl.complete_next(Reply::ack());
}

#[test]
fn test_independent_tunnel_is_created_at_load() {
    let tunnel = TunnelConfig {
        remote: Some(Ipv4Addr::new(192, 0, 2, 1)),
        independent: true,
        ..Default::default()
    };
    let definition = MemoryDefinition::new("tun0", DeviceSettings::new(KindConfig::Ipip(tunnel)));
    let (manager, rtnl) = manager_with(vec![definition]);
    manager.load_all().unwrap();

    let dev = manager.get("tun0").unwrap();
    assert_eq!(dev.state(), State::Creating);

    let request = SentRequest::parse(&rtnl.sent()[0]);
    assert_eq!(request.msg_type, RTM_NEWLINK);
    assert!(request.attr(IflaAttr::Link as u16).is_none());
    assert_eq!(
        request
            .attr(IflaAttr::Ifname as u16)
            .unwrap()
            .as_str()
            .unwrap(),
        "tun0"
    );
}

#[test]
fn test_removal_cancels_joins_and_late_replies_are_ignored() {
    let (manager, rtnl) = manager_with(vec![bridge("br0")]);
    manager.load_all().unwrap();
    let dev = manager.get("br0").unwrap();

    let (fired, completion) = recorder();
    let link: LinkHandle = TestLink::new("eth0", 2);
    dev.join(&link, completion()).unwrap();

    manager.remove("br0").unwrap();
    assert_eq!(dev.state(), State::Linger);
    assert_eq!(*fired.borrow(), vec![-libc::ENODEV]);
    assert!(matches!(
        manager.get("br0"),
        Err(Error::NotFound { .. })
    ));

    // The creation reply is still in flight; it must not resurrect the
    // record.
    rtnl.complete_next(Reply::ack());
    assert_eq!(dev.state(), State::Linger);

    // A notification for the gone device is not routed anywhere.
    rtnl.notify(&mock::newlink(7, "br0", "bridge"));
    assert_eq!(dev.ifindex(), None);
}

#[test]
fn test_reload_releases_every_previous_record() {
    let (manager, rtnl) = manager_with(vec![bridge("br0")]);
    manager.load_all().unwrap();
    let first = manager.get("br0").unwrap();

    let (fired, completion) = recorder();
    let link: LinkHandle = TestLink::new("eth0", 2);
    first.join(&link, completion()).unwrap();

    manager.load_all().unwrap();

    // Full reload semantics: the old record lingers with its joins
    // cancelled, and a fresh record took its place.
    assert_eq!(first.state(), State::Linger);
    assert_eq!(*fired.borrow(), vec![-libc::ENODEV]);
    let second = manager.get("br0").unwrap();
    assert_eq!(second.state(), State::Creating);
    assert_eq!(rtnl.sent().len(), 2);
}

#[test]
fn test_notifications_only_reach_the_named_record() {
    let (manager, rtnl) = manager_with(vec![bridge("br0"), bridge("br1")]);
    manager.load_all().unwrap();
    rtnl.complete_all(Reply::ack());

    rtnl.notify(&mock::newlink(9, "br1", "bridge"));
    assert_eq!(manager.get("br1").unwrap().ifindex(), Some(9));
    assert_eq!(manager.get("br0").unwrap().ifindex(), None);

    // Interfaces nobody configured are ignored entirely.
    rtnl.notify(&mock::newlink(12, "wlan0", "cfg80211"));
}
