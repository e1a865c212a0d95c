use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use ipnet::Ipv4Net;

use netsim::protocol::{RipConfig, RipProtocol, RipRoute, RipRouteState};
use netsim::{
    ConnectionType, Device, Interface, Network, ProtocolRegistry, ProtocolType, Route,
    SimulationDriver, Vendor,
};

fn net(s: &str) -> Ipv4Net {
    s.parse().unwrap()
}

fn rip_router(
    name: &str,
    vendor: Vendor,
    ports: &[(&str, &str)],
    config: RipConfig,
) -> Arc<Device> {
    let device = Device::new(name, vendor);
    for (port, addr) in ports {
        device.add_interface(Interface::new(*port).with_address(net(addr)));
    }
    device.set_rip_configuration(Some(config));
    device.install_protocols(&ProtocolRegistry::with_defaults());
    Arc::new(device)
}

fn rip_route(device: &Device, network: Ipv4Net) -> Option<RipRoute> {
    device
        .with_protocol(ProtocolType::Rip, |rip: &mut RipProtocol| {
            rip.rip_state().routes.get(&network).cloned()
        })
        .flatten()
}

fn assert_never_valid_at_infinity(device: &Device) {
    device.with_protocol(ProtocolType::Rip, |rip: &mut RipProtocol| {
        for route in rip.rip_state().routes.values() {
            assert!(
                !(route.state == RipRouteState::Valid && route.metric >= 16),
                "{:?}",
                route
            );
        }
    });
}

/// A(e0) -- (e0)B, with B holding a static route to 172.16.0.0/16 at metric 1.
async fn pair(b_config: RipConfig) -> (Arc<Network>, Arc<Device>, Arc<Device>) {
    let network = Network::new();
    let a = rip_router("A", Vendor::Cisco, &[("e0", "10.0.0.1/24")], RipConfig::enabled());
    let b = rip_router(
        "B",
        Vendor::Juniper,
        &[("e0", "10.0.0.2/24"), ("e1", "192.168.50.1/24")],
        b_config,
    );
    b.add_route(Route::new(
        net("172.16.0.0/16"),
        Ipv4Addr::new(192, 168, 50, 254),
        "e1",
        "STATIC",
        1,
        1,
    ));

    network.add_device(a.clone()).await;
    network.add_device(b.clone()).await;
    network
        .add_physical_connection("A", "e0", "B", "e0", ConnectionType::Ethernet)
        .await
        .unwrap();
    (network, a, b)
}

#[tokio::test]
async fn test_learns_neighbor_route_one_hop_further() {
    let (_network, a, _b) = pair(RipConfig::enabled()).await;
    a.tick_protocols();

    let learned = rip_route(&a, net("172.16.0.0/16")).unwrap();
    assert_eq!(learned.metric, 2);
    assert_eq!(learned.next_hop, Ipv4Addr::new(10, 0, 0, 2));
    assert_eq!(learned.interface, "e0");
    assert_eq!(learned.state, RipRouteState::Valid);

    let installed = a.routes_by_protocol("RIP");
    assert_eq!(installed.len(), 1);
    assert_eq!(installed[0].administrative_distance, 120);
    assert_eq!(a.find_best_route(Ipv4Addr::new(172, 16, 9, 9)).unwrap().protocol, "RIP");

    // The shared subnet is directly attached and never learned
    assert!(rip_route(&a, net("10.0.0.0/24")).is_none());
}

#[tokio::test]
async fn test_withdrawn_route_ages_out_and_flushes() {
    let (_network, a, b) = pair(RipConfig::enabled()).await;
    let dest = net("172.16.0.0/16");
    a.tick_protocols();
    assert!(rip_route(&a, dest).is_some());

    // B's route becomes unreachable: it stops being advertised
    b.clear_routes_by_protocol("STATIC");
    b.add_route(Route::new(dest, Ipv4Addr::new(192, 168, 50, 254), "e1", "STATIC", 16, 1));

    a.tick_protocols();
    assert_eq!(rip_route(&a, dest).unwrap().state, RipRouteState::Valid);
    assert_never_valid_at_infinity(&a);

    a.with_protocol(ProtocolType::Rip, |rip: &mut RipProtocol| {
        rip.rip_state_mut().routes.get_mut(&dest).unwrap().last_updated =
            Utc::now() - Duration::seconds(181);
    });
    a.tick_protocols();

    let aged = rip_route(&a, dest).unwrap();
    assert_eq!(aged.state, RipRouteState::Invalid);
    assert_eq!(aged.metric, 16);
    assert!(a.routes_by_protocol("RIP").is_empty());
    assert_never_valid_at_infinity(&a);

    a.with_protocol(ProtocolType::Rip, |rip: &mut RipProtocol| {
        rip.rip_state_mut().routes.get_mut(&dest).unwrap().invalid_time =
            Some(Utc::now() - Duration::seconds(61));
    });
    a.tick_protocols();
    assert!(rip_route(&a, dest).is_none());
}

#[tokio::test]
async fn test_metric_fifteen_poisons_route_from_same_source() {
    let (_network, a, b) = pair(RipConfig::enabled()).await;
    let dest = net("172.16.0.0/16");
    a.tick_protocols();

    b.add_route(Route::new(dest, Ipv4Addr::new(192, 168, 50, 254), "e1", "STATIC", 15, 1));
    a.tick_protocols();

    let poisoned = rip_route(&a, dest).unwrap();
    assert_eq!(poisoned.state, RipRouteState::Invalid);
    assert_eq!(poisoned.metric, 16);
    assert!(a.routes_by_protocol("RIP").is_empty());
}

#[tokio::test]
async fn test_passive_neighbor_is_not_learned_from() {
    let (_network, a, _b) = pair(RipConfig::enabled().with_passive_interface("e0")).await;
    a.tick_protocols();
    assert!(rip_route(&a, net("172.16.0.0/16")).is_none());
}

#[tokio::test]
async fn test_disabled_neighbor_is_ignored() {
    let (_network, a, b) = pair(RipConfig::enabled()).await;
    b.set_rip_configuration(Some(RipConfig::default()));
    a.tick_protocols();
    assert!(rip_route(&a, net("172.16.0.0/16")).is_none());
}

#[tokio::test]
async fn test_chain_converges_and_reacts_to_failure() {
    let network = Network::new();
    let a = rip_router("A", Vendor::Cisco, &[("e0", "10.0.1.1/30")], RipConfig::enabled());
    let b = rip_router(
        "B",
        Vendor::Arista,
        &[("e0", "10.0.1.2/30"), ("e1", "10.0.2.1/30")],
        RipConfig::enabled(),
    );
    let c = rip_router(
        "C",
        Vendor::Linux,
        &[("e0", "10.0.2.2/30"), ("lan", "192.168.10.1/24")],
        RipConfig::enabled().with_passive_interface("lan"),
    );
    for device in [&a, &b, &c] {
        network.add_device(device.clone()).await;
    }
    network
        .add_physical_connection("A", "e0", "B", "e0", ConnectionType::Ethernet)
        .await
        .unwrap();
    network
        .add_physical_connection("B", "e1", "C", "e0", ConnectionType::Fiber)
        .await
        .unwrap();
    let lan_c = Device::new("LAN-C", Vendor::Generic);
    lan_c.add_interface(Interface::new("p1"));
    network.add_device(Arc::new(lan_c)).await;
    network
        .add_physical_connection("C", "lan", "LAN-C", "p1", ConnectionType::Ethernet)
        .await
        .unwrap();

    let driver = SimulationDriver::new(network.clone(), StdDuration::from_millis(100));
    for _ in 0..4 {
        assert_eq!(driver.tick_once(), 0);
    }

    let lan = net("192.168.10.0/24");
    assert_eq!(rip_route(&b, lan).unwrap().metric, 1);
    assert_eq!(rip_route(&a, lan).unwrap().metric, 2);
    assert_eq!(rip_route(&a, net("10.0.2.0/30")).unwrap().metric, 1);
    // Split horizon: A never learns its own link back through B
    assert!(rip_route(&a, net("10.0.1.0/30")).is_none());

    network
        .simulate_cable_failure("B", "e1", "C", "e0", "maintenance")
        .await
        .unwrap();
    driver.tick_once();

    assert_eq!(rip_route(&b, lan).unwrap().state, RipRouteState::Invalid);
    assert!(b.routes_by_protocol("RIP").is_empty());
    assert_never_valid_at_infinity(&a);
    assert_never_valid_at_infinity(&b);
}
