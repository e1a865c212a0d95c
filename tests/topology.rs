use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use netsim::events::{InterfaceStateChanged, PhysicalConnectionStateChanged};
use netsim::{
    ConnectionState, ConnectionType, Device, EventBus, Interface, Network, NetworkError, Vendor,
};

fn device(name: &str, ports: &[(&str, &str)]) -> Arc<Device> {
    let device = Device::new(name, Vendor::Cisco);
    for (port, addr) in ports {
        device.add_interface(Interface::new(*port).with_address(addr.parse().unwrap()));
    }
    Arc::new(device)
}

async fn square() -> Arc<Network> {
    let network = Network::new();
    network.add_device(device("A", &[("e0", "10.0.1.1/30"), ("e1", "10.0.4.2/30")])).await;
    network.add_device(device("B", &[("e0", "10.0.1.2/30"), ("e1", "10.0.2.1/30")])).await;
    network.add_device(device("C", &[("e0", "10.0.2.2/30"), ("e1", "10.0.3.1/30")])).await;
    network.add_device(device("D", &[("e0", "10.0.3.2/30"), ("e1", "10.0.4.1/30")])).await;
    network
}

async fn link(network: &Network, d1: &str, i1: &str, d2: &str, i2: &str) {
    network
        .add_physical_connection(d1, i1, d2, i2, ConnectionType::Ethernet)
        .await
        .unwrap();
}

fn collect<E: netsim::events::BusEvent>(bus: &EventBus) -> Arc<Mutex<Vec<E>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.subscribe(move |event: E| {
        let sink = sink.clone();
        async move {
            sink.lock().push(event);
            Ok(())
        }
    });
    seen
}

#[tokio::test]
async fn test_connected_interfaces_follow_shutdown_flag() {
    let network = Network::new();
    network.add_device(device("A", &[("e0", "10.0.1.1/30")])).await;
    let b = Device::new("B", Vendor::Huawei);
    b.add_interface(Interface::new("e0").with_address("10.0.1.2/30".parse().unwrap()).shutdown());
    network.add_device(Arc::new(b)).await;

    link(&network, "A", "e0", "B", "e0").await;

    assert!(network.are_connected("A", "e0", "B", "e0"));
    for name in ["A", "B"] {
        let iface = network.get_device(name).unwrap().interface("e0").unwrap();
        assert_eq!(iface.is_up(), !iface.is_shutdown(), "{}", name);
    }
}

#[tokio::test]
async fn test_duplicate_connection_leaves_registry_unchanged() {
    let network = square().await;
    link(&network, "A", "e0", "B", "e0").await;
    link(&network, "B", "e1", "C", "e0").await;

    let err = network
        .add_physical_connection("B", "e0", "A", "e0", ConnectionType::Serial)
        .await
        .unwrap_err();

    assert!(matches!(err, NetworkError::DuplicateConnection(_)));
    assert_eq!(network.connections().len(), 2);
    assert_eq!(
        network.get_physical_connection("A", "e0", "B", "e0").unwrap().connection_type(),
        ConnectionType::Ethernet
    );
}

#[tokio::test]
async fn test_unregistered_device_is_rejected() {
    let network = square().await;
    let err = network
        .add_physical_connection("A", "e0", "Z", "e0", ConnectionType::Ethernet)
        .await
        .unwrap_err();
    assert_eq!(err, NetworkError::DeviceNotFound("Z".to_string()));
    assert!(network.connections().is_empty());
    assert!(!network.get_device("A").unwrap().interface("e0").unwrap().is_up());
}

#[tokio::test]
async fn test_cable_failure_downs_both_ends_and_reports_flips() {
    let network = square().await;
    link(&network, "A", "e0", "B", "e0").await;
    network.set_interface_shutdown("B", "e0", true).await.unwrap();

    let flips = collect::<InterfaceStateChanged>(network.event_bus());
    network
        .simulate_cable_failure("A", "e0", "B", "e0", "fiber cut")
        .await
        .unwrap();

    for name in ["A", "B"] {
        assert!(!network.get_device(name).unwrap().interface("e0").unwrap().is_up());
    }
    // B:e0 was already down because of the shutdown, so only A flips
    let flips = flips.lock();
    assert_eq!(flips.len(), 1);
    assert_eq!(flips[0].device_name, "A");
    assert!(!flips[0].is_up);
}

#[tokio::test]
async fn test_bus_isolates_failing_subscriber() {
    let bus = EventBus::new();
    let first = Arc::new(AtomicUsize::new(0));
    let third = Arc::new(AtomicUsize::new(0));

    let counter = first.clone();
    bus.subscribe(move |_: InterfaceStateChanged| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });
    bus.subscribe(|_: InterfaceStateChanged| async {
        Err::<(), _>(anyhow::anyhow!("subscriber failed"))
    });
    let counter = third.clone();
    bus.subscribe(move |_: InterfaceStateChanged| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    bus.publish(InterfaceStateChanged {
        device_name: "A".to_string(),
        interface_name: "e0".to_string(),
        is_up: true,
        is_shutdown: false,
    })
    .await;

    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(third.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_reliability_statistics() {
    let network = square().await;
    assert_eq!(network.network_statistics().connection_reliability, 0.0);

    link(&network, "A", "e0", "B", "e0").await;
    link(&network, "B", "e1", "C", "e0").await;
    link(&network, "C", "e1", "D", "e0").await;
    link(&network, "D", "e1", "A", "e1").await;
    assert_eq!(network.network_statistics().connection_reliability, 100.0);

    network.simulate_cable_failure("A", "e0", "B", "e0", "cut").await.unwrap();
    let stats = network.network_statistics();
    assert_eq!(stats.connection_reliability, 75.0);
    assert_eq!(stats.failed_connections, 1);

    network.simulate_cable_failure("B", "e1", "C", "e0", "cut").await.unwrap();
    network.simulate_cable_failure("C", "e1", "D", "e0", "cut").await.unwrap();
    network.simulate_cable_failure("D", "e1", "A", "e1", "cut").await.unwrap();
    let stats = network.network_statistics();
    assert_eq!(stats.connection_reliability, 0.0);
    assert_eq!(stats.total_devices, 4);
}

#[tokio::test]
async fn test_restore_on_healthy_link_is_silent() {
    let network = square().await;
    link(&network, "A", "e0", "B", "e0").await;
    let transitions = collect::<PhysicalConnectionStateChanged>(network.event_bus());

    network.restore_connection("A", "e0", "B", "e0").await.unwrap();
    assert!(transitions.lock().is_empty());

    network.simulate_cable_failure("A", "e0", "B", "e0", "cut").await.unwrap();
    network.restore_connection("B", "e0", "A", "e0").await.unwrap();
    network.restore_connection("B", "e0", "A", "e0").await.unwrap();

    let transitions = transitions.lock();
    assert_eq!(transitions.len(), 2);
    assert!(transitions.iter().all(|t| t.old_state != t.new_state));
    assert_eq!(transitions[1].new_state, ConnectionState::Connected);
}

#[tokio::test]
async fn test_connected_devices_sees_only_operational_links() {
    let network = square().await;
    link(&network, "A", "e0", "B", "e0").await;

    let a = network.get_device("A").unwrap();
    let (peer, port) = a.connected_device("e0").unwrap();
    assert_eq!((peer.name(), port.as_str()), ("B", "e0"));
    assert!(network.is_interface_connected("B", "e0"));

    network
        .simulate_connection_degradation("A", "e0", "B", "e0", 30.0, 80, "bad optics")
        .await
        .unwrap();
    assert!(a.connected_device("e0").is_some());

    network.simulate_cable_failure("A", "e0", "B", "e0", "cut").await.unwrap();
    assert!(a.connected_device("e0").is_none());
    assert!(!network.is_interface_connected("B", "e0"));

    network.remove_physical_connection("A", "e0", "B", "e0").await.unwrap();
    assert!(network.get_physical_connection("A", "e0", "B", "e0").is_none());
    assert!(matches!(
        network.remove_physical_connection("A", "e0", "B", "e0").await,
        Err(NetworkError::ConnectionNotFound(_))
    ));
}

#[tokio::test]
async fn test_state_watch_mirrors_transitions() {
    let network = square().await;
    link(&network, "A", "e0", "B", "e0").await;
    let conn = network.get_physical_connection("A", "e0", "B", "e0").unwrap();
    let mut rx = conn.subscribe_state();
    assert_eq!(*rx.borrow(), ConnectionState::Connected);

    network.simulate_cable_failure("A", "e0", "B", "e0", "cut").await.unwrap();
    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow_and_update(), ConnectionState::Failed);
}
