use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::network::Network;

/// Ticks the protocols of every device in a [`Network`] on a fixed interval.
pub struct SimulationDriver {
    network: Arc<Network>,
    tick_interval: Duration,
    ticks: Arc<AtomicU64>,
    stop_tx: watch::Sender<bool>,
}

impl SimulationDriver {
    pub fn new(network: Arc<Network>, tick_interval: Duration) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            network,
            tick_interval,
            ticks: Arc::new(AtomicU64::new(0)),
            stop_tx,
        }
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// One pass over all devices. Returns the number of devices whose tick
    /// panicked; the others are unaffected.
    pub fn tick_once(&self) -> usize {
        let failed = tick_devices(&self.network);
        self.ticks.fetch_add(1, Ordering::SeqCst);
        failed
    }

    /// Spawn the tick loop. It runs until [`stop`](Self::stop) is called.
    pub fn start(&self) -> JoinHandle<()> {
        let network = self.network.clone();
        let ticks = self.ticks.clone();
        let period = self.tick_interval;
        let mut stop_rx = self.stop_tx.subscribe();

        info!("Starting simulation driver, tick every {:?}", period);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let failed = tick_devices(&network);
                        let count = ticks.fetch_add(1, Ordering::SeqCst) + 1;
                        debug!(tick = count, failed, "Simulation tick complete");
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Simulation driver stopped");
        })
    }

    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }
}

fn tick_devices(network: &Network) -> usize {
    let mut failed = 0;
    for device in network.devices() {
        if panic::catch_unwind(AssertUnwindSafe(|| device.tick_protocols())).is_err() {
            error!(device = device.name(), "Protocol tick panicked");
            failed += 1;
        }
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{ConnectionType, Device, Interface, Vendor};
    use crate::protocol::{
        ProtocolRegistry, ProtocolState, ProtocolType, RipConfig, RoutingProtocol,
    };

    async fn linked_pair() -> Arc<Network> {
        let network = Network::new();
        let registry = ProtocolRegistry::with_defaults();
        for (name, addr) in [("R1", "10.0.0.1/24"), ("R2", "10.0.0.2/24")] {
            let device = Device::new(name, Vendor::Generic);
            device.add_interface(Interface::new("eth0").with_address(addr.parse().unwrap()));
            device.set_rip_configuration(Some(RipConfig::enabled()));
            device.install_protocols(&registry);
            network.add_device(Arc::new(device)).await;
        }
        network
            .add_physical_connection("R1", "eth0", "R2", "eth0", ConnectionType::Ethernet)
            .await
            .unwrap();
        network
    }

    #[tokio::test]
    async fn test_tick_once_installs_connected_routes() {
        let network = linked_pair().await;
        let driver = SimulationDriver::new(network.clone(), Duration::from_millis(10));

        assert_eq!(driver.tick_once(), 0);
        assert_eq!(driver.ticks(), 1);
        let r1 = network.get_device("R1").unwrap();
        assert_eq!(r1.routes_by_protocol("CONNECTED").len(), 1);
    }

    #[derive(Default)]
    struct Faulty {
        state: ProtocolState,
    }

    impl RoutingProtocol for Faulty {
        fn protocol_type(&self) -> ProtocolType {
            ProtocolType::Ospf
        }

        fn state(&self) -> &ProtocolState {
            &self.state
        }

        fn state_mut(&mut self) -> &mut ProtocolState {
            &mut self.state
        }

        fn initialize(&mut self, _device: &Device) {
            self.state.set_active(true);
            self.state.set_initialized();
        }

        fn apply_configuration(&mut self, _device: &Device) {}

        fn update_neighbors(&mut self, _device: &Device) {
            panic!("neighbor table corrupted");
        }

        fn run_protocol_calculation(&mut self, _device: &Device) {}

        fn process_timers(&mut self, _device: &Device) {}

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    #[tokio::test]
    async fn test_panicking_device_does_not_stop_others() {
        let network = linked_pair().await;
        network
            .get_device("R1")
            .unwrap()
            .register_protocol(Box::new(Faulty::default()));
        let driver = SimulationDriver::new(network.clone(), Duration::from_millis(10));

        assert_eq!(driver.tick_once(), 1);
        assert_eq!(driver.tick_once(), 1);
        let r2 = network.get_device("R2").unwrap();
        assert_eq!(r2.routes_by_protocol("CONNECTED").len(), 1);
        // Connected runs before the faulty protocol and still completed
        let r1 = network.get_device("R1").unwrap();
        assert_eq!(r1.routes_by_protocol("CONNECTED").len(), 1);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let network = linked_pair().await;
        let driver = SimulationDriver::new(network, Duration::from_millis(5));

        let handle = driver.start();
        tokio::time::sleep(Duration::from_millis(40)).await;
        driver.stop();
        handle.await.unwrap();

        let ticks = driver.ticks();
        assert!(ticks >= 1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(driver.ticks(), ticks);
    }
}
