//! Topology registry: devices, physical connections and the glue that turns
//! link state changes into interface events.

pub mod connection;
pub mod device;
pub mod interface;
pub mod topology;

pub use connection::{
    ConnectionState, ConnectionStateChange, ConnectionType, Endpoint, PhysicalConnection,
};
pub use device::{CliMode, Device, InterfaceSettings, Vendor};
pub use interface::Interface;
pub use topology::NetworkStatistics;

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::RwLock;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::NetworkError;
use crate::events::{
    ChangeType, DeviceChanged, EventBus, LinkChanged, PhysicalConnectionStateChanged,
};

#[derive(Default)]
struct DeviceRegistry {
    by_name: HashMap<String, Arc<Device>>,
    by_id: HashMap<String, Arc<Device>>,
}

/// Devices and links of one simulated network.
///
/// Topology mutations are serialized by `mutation`, held from validation to
/// the last published event. Bus handlers must not call back into a
/// mutation on the same network.
pub struct Network {
    devices: RwLock<DeviceRegistry>,
    connections: RwLock<HashMap<String, Arc<PhysicalConnection>>>,
    mutation: AsyncMutex<()>,
    event_bus: Arc<EventBus>,
}

impl Network {
    pub fn new() -> Arc<Self> {
        Self::with_event_bus(Arc::new(EventBus::new()))
    }

    pub fn with_event_bus(event_bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            devices: RwLock::new(DeviceRegistry::default()),
            connections: RwLock::new(HashMap::new()),
            mutation: AsyncMutex::new(()),
            event_bus,
        })
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    // Devices

    /// Register `device`. Returns false, changing nothing, if a device with
    /// the same name is already present.
    pub async fn add_device(self: &Arc<Self>, device: Arc<Device>) -> bool {
        let _guard = self.mutation.lock().await;
        {
            let mut registry = self.devices.write();
            if registry.by_name.contains_key(device.name()) {
                debug!("Device {} already registered", device.name());
                return false;
            }
            registry.by_name.insert(device.name().to_string(), device.clone());
            registry.by_id.insert(device.device_id(), device.clone());
        }

        device.attach_network(Arc::downgrade(self));
        device.subscribe_protocols_to_events(&self.event_bus);
        info!("Device {} ({}) added to network", device.name(), device.vendor());

        self.event_bus
            .publish(DeviceChanged {
                device_name: device.name().to_string(),
                device_id: device.device_id(),
                change: ChangeType::Added,
            })
            .await;
        true
    }

    /// Unregister a device. Its physical connections are removed first so the
    /// interfaces on the other side go down.
    pub async fn remove_device(&self, name: &str) -> Option<Arc<Device>> {
        let _guard = self.mutation.lock().await;
        self.remove_device_locked(name).await
    }

    pub async fn remove_device_by_id(&self, device_id: &str) -> Option<Arc<Device>> {
        let _guard = self.mutation.lock().await;
        let name = self.get_device_by_id(device_id)?.name().to_string();
        self.remove_device_locked(&name).await
    }

    async fn remove_device_locked(&self, name: &str) -> Option<Arc<Device>> {
        if self.get_device(name).is_none() {
            return None;
        }

        let attached: Vec<Arc<PhysicalConnection>> = self
            .connections
            .read()
            .values()
            .filter(|conn| conn.involves_device(name))
            .cloned()
            .collect();
        for connection in attached {
            self.detach_connection(&connection, "Device removed").await;
        }

        let device = {
            let mut registry = self.devices.write();
            let device = registry.by_name.remove(name)?;
            registry.by_id.remove(&device.device_id());
            device
        };

        device.detach_network();
        info!("Device {} removed from network", name);

        self.event_bus
            .publish(DeviceChanged {
                device_name: device.name().to_string(),
                device_id: device.device_id(),
                change: ChangeType::Removed,
            })
            .await;
        Some(device)
    }

    /// Give a registered device a new ID, keeping both lookups in sync.
    pub fn update_device_id(&self, name: &str, new_id: &str) -> Result<(), NetworkError> {
        let mut registry = self.devices.write();
        let device = registry
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| NetworkError::DeviceNotFound(name.to_string()))?;

        let old_id = device.device_id();
        if old_id == new_id {
            return Ok(());
        }
        if registry.by_id.contains_key(new_id) {
            return Err(NetworkError::InvalidArgument(format!(
                "device ID {} is already in use",
                new_id
            )));
        }

        registry.by_id.remove(&old_id);
        device.set_device_id(new_id.to_string());
        registry.by_id.insert(new_id.to_string(), device);
        debug!("Device {} renamed ID {} -> {}", name, old_id, new_id);
        Ok(())
    }

    pub fn get_device(&self, name: &str) -> Option<Arc<Device>> {
        self.devices.read().by_name.get(name).cloned()
    }

    pub fn get_device_by_id(&self, device_id: &str) -> Option<Arc<Device>> {
        self.devices.read().by_id.get(device_id).cloned()
    }

    pub fn devices(&self) -> Vec<Arc<Device>> {
        let mut devices: Vec<_> = self.devices.read().by_name.values().cloned().collect();
        devices.sort_by(|a, b| a.name().cmp(b.name()));
        devices
    }

    pub fn device_count(&self) -> usize {
        self.devices.read().by_name.len()
    }

    /// First device owning `address` on one of its interfaces.
    pub fn find_device_by_ip(&self, address: Ipv4Addr) -> Option<Arc<Device>> {
        self.devices()
            .into_iter()
            .find(|device| device.owns_address(address))
    }

    // Physical connections

    pub async fn add_physical_connection(
        &self,
        device1: &str,
        interface1: &str,
        device2: &str,
        interface2: &str,
        connection_type: ConnectionType,
    ) -> Result<Arc<PhysicalConnection>, NetworkError> {
        let _guard = self.mutation.lock().await;
        let endpoint1 = Endpoint::new(device1, interface1);
        let endpoint2 = Endpoint::new(device2, interface2);
        if endpoint1 == endpoint2 {
            return Err(NetworkError::InvalidArgument(format!(
                "cannot connect {} to itself",
                endpoint1
            )));
        }

        for endpoint in [&endpoint1, &endpoint2] {
            let device = self
                .get_device(&endpoint.device)
                .ok_or_else(|| NetworkError::DeviceNotFound(endpoint.device.clone()))?;
            if !device.has_interface(&endpoint.interface) {
                return Err(NetworkError::InterfaceNotFound {
                    device: endpoint.device.clone(),
                    interface: endpoint.interface.clone(),
                });
            }
        }

        let connection = Arc::new(PhysicalConnection::new(endpoint1, endpoint2, connection_type));
        {
            let mut connections = self.connections.write();
            if connections.contains_key(connection.id()) {
                return Err(NetworkError::DuplicateConnection(connection.id().to_string()));
            }
            connections.insert(connection.id().to_string(), connection.clone());
        }
        info!("Physical connection {} added ({:?})", connection.id(), connection_type);

        if let Some(change) = connection.connect() {
            self.apply_state_change(&connection, change).await;
        }
        Ok(connection)
    }

    pub async fn remove_physical_connection(
        &self,
        device1: &str,
        interface1: &str,
        device2: &str,
        interface2: &str,
    ) -> Result<(), NetworkError> {
        let _guard = self.mutation.lock().await;
        let connection = self.require_connection(device1, interface1, device2, interface2)?;
        self.detach_connection(&connection, "Connection removed").await;
        Ok(())
    }

    pub fn get_physical_connection(
        &self,
        device1: &str,
        interface1: &str,
        device2: &str,
        interface2: &str,
    ) -> Option<Arc<PhysicalConnection>> {
        let id = PhysicalConnection::canonical_id(
            &Endpoint::new(device1, interface1),
            &Endpoint::new(device2, interface2),
        );
        self.get_connection(&id)
    }

    pub fn get_connection(&self, id: &str) -> Option<Arc<PhysicalConnection>> {
        self.connections.read().get(id).cloned()
    }

    pub fn connections(&self) -> Vec<Arc<PhysicalConnection>> {
        let mut connections: Vec<_> = self.connections.read().values().cloned().collect();
        connections.sort_by(|a, b| a.id().cmp(b.id()));
        connections
    }

    pub fn connections_for_device(&self, device: &str) -> Vec<Arc<PhysicalConnection>> {
        self.connections()
            .into_iter()
            .filter(|conn| conn.involves_device(device))
            .collect()
    }

    pub async fn simulate_cable_failure(
        &self,
        device1: &str,
        interface1: &str,
        device2: &str,
        interface2: &str,
        reason: &str,
    ) -> Result<(), NetworkError> {
        let _guard = self.mutation.lock().await;
        let connection = self.require_connection(device1, interface1, device2, interface2)?;
        if let Some(change) = connection.set_failed(reason) {
            self.apply_state_change(&connection, change).await;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn simulate_connection_degradation(
        &self,
        device1: &str,
        interface1: &str,
        device2: &str,
        interface2: &str,
        packet_loss: f64,
        extra_latency_ms: u32,
        reason: &str,
    ) -> Result<(), NetworkError> {
        let _guard = self.mutation.lock().await;
        let connection = self.require_connection(device1, interface1, device2, interface2)?;
        if let Some(change) = connection.set_degraded(packet_loss, extra_latency_ms, reason)? {
            self.apply_state_change(&connection, change).await;
        }
        Ok(())
    }

    pub async fn restore_connection(
        &self,
        device1: &str,
        interface1: &str,
        device2: &str,
        interface2: &str,
    ) -> Result<(), NetworkError> {
        let _guard = self.mutation.lock().await;
        let connection = self.require_connection(device1, interface1, device2, interface2)?;
        if let Some(change) = connection.restore() {
            self.apply_state_change(&connection, change).await;
        }
        Ok(())
    }

    // Interfaces

    /// Administratively shut or re-enable a port.
    pub async fn set_interface_shutdown(
        &self,
        device: &str,
        interface: &str,
        shutdown: bool,
    ) -> Result<(), NetworkError> {
        let _guard = self.mutation.lock().await;
        let target = self
            .get_device(device)
            .ok_or_else(|| NetworkError::DeviceNotFound(device.to_string()))?;
        let link_up = self.has_operational_link(device, interface);
        if let Some(event) = target.set_interface_shutdown(interface, shutdown, link_up)? {
            info!(
                "Interface {}:{} {}",
                device,
                interface,
                if shutdown { "administratively down" } else { "enabled" }
            );
            self.event_bus.publish(event).await;
        }
        Ok(())
    }

    // Queries

    /// Remote ends reachable through operational links on `(device, interface)`.
    pub fn connected_devices(&self, device: &str, interface: &str) -> Vec<(Arc<Device>, String)> {
        let remotes: Vec<Endpoint> = self
            .connections
            .read()
            .values()
            .filter(|conn| conn.is_operational())
            .filter_map(|conn| conn.remote_endpoint(device, interface).cloned())
            .collect();

        remotes
            .into_iter()
            .filter_map(|remote| {
                self.get_device(&remote.device)
                    .map(|peer| (peer, remote.interface))
            })
            .collect()
    }

    pub fn are_connected(
        &self,
        device1: &str,
        interface1: &str,
        device2: &str,
        interface2: &str,
    ) -> bool {
        self.get_physical_connection(device1, interface1, device2, interface2)
            .is_some_and(|conn| conn.is_operational())
    }

    pub fn is_interface_connected(&self, device: &str, interface: &str) -> bool {
        self.has_operational_link(device, interface)
    }

    pub fn network_statistics(&self) -> NetworkStatistics {
        let connections = self.connections();
        NetworkStatistics::collect(self.device_count(), &connections)
    }

    // Internals

    fn require_connection(
        &self,
        device1: &str,
        interface1: &str,
        device2: &str,
        interface2: &str,
    ) -> Result<Arc<PhysicalConnection>, NetworkError> {
        self.get_physical_connection(device1, interface1, device2, interface2)
            .ok_or_else(|| {
                NetworkError::ConnectionNotFound(PhysicalConnection::canonical_id(
                    &Endpoint::new(device1, interface1),
                    &Endpoint::new(device2, interface2),
                ))
            })
    }

    fn has_operational_link(&self, device: &str, interface: &str) -> bool {
        self.connections
            .read()
            .values()
            .any(|conn| conn.involves(device, interface) && conn.is_operational())
    }

    async fn detach_connection(&self, connection: &Arc<PhysicalConnection>, reason: &str) {
        self.connections.write().remove(connection.id());
        info!("Physical connection {} removed", connection.id());

        if let Some(change) = connection.disconnect(reason) {
            self.apply_state_change(connection, change).await;
        }
    }

    /// Propagate a link transition: raw state event, interface recomputation
    /// on both ends, then the legacy link event.
    async fn apply_state_change(
        &self,
        connection: &Arc<PhysicalConnection>,
        change: ConnectionStateChange,
    ) {
        self.event_bus
            .publish(PhysicalConnectionStateChanged {
                connection_id: connection.id().to_string(),
                endpoint1: connection.endpoint1().clone(),
                endpoint2: connection.endpoint2().clone(),
                connection_type: connection.connection_type(),
                old_state: change.old_state,
                new_state: change.new_state,
                reason: change.reason.clone(),
            })
            .await;

        for endpoint in [connection.endpoint1(), connection.endpoint2()] {
            let Some(device) = self.get_device(&endpoint.device) else {
                warn!(
                    "Link {} references unknown device {}",
                    connection.id(),
                    endpoint.device
                );
                continue;
            };

            let link_up = self.has_operational_link(&endpoint.device, &endpoint.interface);
            if let Some(event) = device.refresh_interface(&endpoint.interface, link_up) {
                info!(
                    "Interface {} is now {}",
                    endpoint,
                    if event.is_up { "up" } else { "down" }
                );
                self.event_bus.publish(event).await;
            }
        }

        let change_type = if change.new_state == ConnectionState::Connected {
            ChangeType::Added
        } else {
            ChangeType::Removed
        };
        self.event_bus
            .publish(LinkChanged {
                endpoint1: connection.endpoint1().clone(),
                endpoint2: connection.endpoint2().clone(),
                change: change_type,
            })
            .await;
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("devices", &self.device_count())
            .field("connections", &self.connections.read().len())
            .finish()
    }
}
