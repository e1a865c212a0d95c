use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::{Arc, Weak};

use chrono::Utc;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Interface, Network};
use crate::error::NetworkError;
use crate::events::{EventBus, InterfaceStateChanged};
use crate::protocol::{
    ProtocolRegistry, ProtocolType, RipConfig, Route, RoutingProtocol, RoutingTable,
};

const MAX_LOG_ENTRIES: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Cisco,
    Juniper,
    Arista,
    Huawei,
    Nokia,
    Extreme,
    Fortinet,
    Linux,
    Generic,
}

impl Vendor {
    pub const ALL: &'static [Vendor] = &[
        Vendor::Cisco,
        Vendor::Juniper,
        Vendor::Arista,
        Vendor::Huawei,
        Vendor::Nokia,
        Vendor::Extreme,
        Vendor::Fortinet,
        Vendor::Linux,
        Vendor::Generic,
    ];
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// CLI mode as tracked by the command layer. The core only stores it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CliMode {
    #[default]
    UserExec,
    PrivilegedExec,
    GlobalConfig,
    InterfaceConfig(String),
    RouterConfig(String),
}

#[derive(Debug, Default)]
struct DeviceState {
    interfaces: HashMap<String, Interface>,
    routing_table: RoutingTable,
    rip_config: Option<RipConfig>,
    cli_mode: CliMode,
    log: VecDeque<String>,
}

/// A simulated router or switch.
///
/// Interface and route maps sit behind one lock, protocol instances behind
/// another; neither is held while talking to other devices or the network.
pub struct Device {
    name: String,
    vendor: Vendor,
    device_id: RwLock<String>,
    state: RwLock<DeviceState>,
    protocols: Mutex<BTreeMap<ProtocolType, Box<dyn RoutingProtocol>>>,
    /// Bus each protocol instance last subscribed its handlers to.
    subscriptions: Mutex<HashMap<ProtocolType, Weak<EventBus>>>,
    network: RwLock<Weak<Network>>,
}

impl Device {
    pub fn new(name: impl Into<String>, vendor: Vendor) -> Self {
        Self {
            name: name.into(),
            vendor,
            device_id: RwLock::new(Uuid::new_v4().to_string()),
            state: RwLock::new(DeviceState::default()),
            protocols: Mutex::new(BTreeMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            network: RwLock::new(Weak::new()),
        }
    }

    pub fn with_device_id(self, device_id: impl Into<String>) -> Self {
        *self.device_id.write() = device_id.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    pub fn device_id(&self) -> String {
        self.device_id.read().clone()
    }

    pub(crate) fn set_device_id(&self, device_id: String) {
        *self.device_id.write() = device_id;
    }

    pub fn network(&self) -> Option<Arc<Network>> {
        self.network.read().upgrade()
    }

    pub(crate) fn attach_network(&self, network: Weak<Network>) {
        *self.network.write() = network;
    }

    pub(crate) fn detach_network(&self) {
        *self.network.write() = Weak::new();
    }

    pub fn cli_mode(&self) -> CliMode {
        self.state.read().cli_mode.clone()
    }

    pub fn set_cli_mode(&self, mode: CliMode) {
        self.state.write().cli_mode = mode;
    }

    // Interfaces

    /// Attach a port. Its operational state starts down until the network
    /// reports an operational link on it.
    pub fn add_interface(&self, mut interface: Interface) {
        interface.refresh_operational(false);
        let name = interface.name.clone();
        self.state.write().interfaces.insert(name.clone(), interface);
        debug!("{}: added interface {}", self.name, name);
    }

    pub fn interfaces(&self) -> HashMap<String, Interface> {
        self.state.read().interfaces.clone()
    }

    pub fn interface(&self, name: &str) -> Option<Interface> {
        self.state.read().interfaces.get(name).cloned()
    }

    pub fn has_interface(&self, name: &str) -> bool {
        self.state.read().interfaces.contains_key(name)
    }

    /// Update descriptive fields of a port. Shutdown and link state are not
    /// editable here.
    pub fn update_interface<F>(&self, name: &str, edit: F) -> Result<(), NetworkError>
    where
        F: FnOnce(&mut InterfaceSettings),
    {
        let mut state = self.state.write();
        let iface = state
            .interfaces
            .get_mut(name)
            .ok_or_else(|| self.missing_interface(name))?;

        let mut settings = InterfaceSettings {
            address: iface.address,
            description: iface.description.clone(),
            vlan_id: iface.vlan_id,
            acl_in: iface.acl_in.clone(),
            acl_out: iface.acl_out.clone(),
        };
        edit(&mut settings);

        iface.address = settings.address;
        iface.description = settings.description;
        iface.vlan_id = settings.vlan_id;
        iface.acl_in = settings.acl_in;
        iface.acl_out = settings.acl_out;
        Ok(())
    }

    /// Change the administrative state of `name` and recompute `is_up`.
    /// Returns the event to publish if either flag moved.
    pub(crate) fn set_interface_shutdown(
        &self,
        name: &str,
        shutdown: bool,
        link_operational: bool,
    ) -> Result<Option<InterfaceStateChanged>, NetworkError> {
        let mut state = self.state.write();
        let iface = state
            .interfaces
            .get_mut(name)
            .ok_or_else(|| self.missing_interface(name))?;

        let before = (iface.is_up(), iface.is_shutdown());
        iface.set_shutdown(shutdown);
        iface.refresh_operational(link_operational);
        if before == (iface.is_up(), iface.is_shutdown()) {
            return Ok(None);
        }

        let event = InterfaceStateChanged {
            device_name: self.name.clone(),
            interface_name: name.to_string(),
            is_up: iface.is_up(),
            is_shutdown: iface.is_shutdown(),
        };
        Self::push_log(
            &mut state.log,
            format!(
                "Interface {} {}",
                name,
                if shutdown { "shutdown" } else { "no shutdown" }
            ),
        );
        Ok(Some(event))
    }

    /// Recompute `is_up` for `name` given whether any of its links is
    /// operational. Returns the event to publish if the value flipped.
    pub(crate) fn refresh_interface(
        &self,
        name: &str,
        link_operational: bool,
    ) -> Option<InterfaceStateChanged> {
        let mut state = self.state.write();
        let iface = state.interfaces.get_mut(name)?;
        if !iface.refresh_operational(link_operational) {
            return None;
        }

        let event = InterfaceStateChanged {
            device_name: self.name.clone(),
            interface_name: name.to_string(),
            is_up: iface.is_up(),
            is_shutdown: iface.is_shutdown(),
        };
        Self::push_log(
            &mut state.log,
            format!(
                "Interface {} changed state to {}",
                name,
                if event.is_up { "up" } else { "down" }
            ),
        );
        Some(event)
    }

    pub fn owns_address(&self, address: Ipv4Addr) -> bool {
        self.state
            .read()
            .interfaces
            .values()
            .any(|iface| iface.ip_address() == Some(address))
    }

    /// The peer on the other end of `interface`, if the link is operational.
    pub fn connected_device(&self, interface: &str) -> Option<(Arc<Device>, String)> {
        self.network()?
            .connected_devices(&self.name, interface)
            .into_iter()
            .next()
    }

    // Routing table

    pub fn routing_table(&self) -> Vec<Route> {
        self.state.read().routing_table.routes()
    }

    pub fn routes_by_protocol(&self, protocol: &str) -> Vec<Route> {
        self.state.read().routing_table.routes_for_protocol(protocol)
    }

    pub fn find_best_route(&self, target: Ipv4Addr) -> Option<Route> {
        self.state.read().routing_table.find_best_route(target).cloned()
    }

    pub fn add_route(&self, route: Route) {
        self.state.write().routing_table.add_route(route);
    }

    pub fn remove_route(&self, route: &Route) -> Option<Route> {
        self.state
            .write()
            .routing_table
            .remove_route(&route.destination, &route.protocol)
    }

    pub fn clear_routes_by_protocol(&self, protocol: &str) -> usize {
        self.state.write().routing_table.clear_protocol(protocol)
    }

    // Protocol configuration

    pub fn rip_configuration(&self) -> Option<RipConfig> {
        self.state.read().rip_config.clone()
    }

    /// Store the RIP configuration and hand it to the running RIP instance.
    pub fn set_rip_configuration(&self, config: Option<RipConfig>) {
        self.state.write().rip_config = config;
        self.apply_protocol_configuration(ProtocolType::Rip);
    }

    pub fn apply_protocol_configuration(&self, protocol_type: ProtocolType) {
        let mut protocols = self.protocols.lock();
        if let Some(protocol) = protocols.get_mut(&protocol_type) {
            protocol.apply_configuration(self);
        }
    }

    // Protocol instances

    /// Register and initialize a protocol instance. Returns false if the
    /// protocol does not support this device's vendor.
    pub fn register_protocol(&self, mut protocol: Box<dyn RoutingProtocol>) -> bool {
        if !protocol.supports_vendor(self.vendor) {
            warn!(
                "{}: {} is not supported on {} devices",
                self.name,
                protocol.name(),
                self.vendor
            );
            return false;
        }

        let protocol_type = protocol.protocol_type();
        protocol.initialize(self);
        self.protocols.lock().insert(protocol_type, protocol);
        self.subscriptions.lock().remove(&protocol_type);
        info!("{}: registered protocol {}", self.name, protocol_type);

        if let Some(network) = self.network() {
            self.subscribe_protocols_to_events(network.event_bus());
        }
        true
    }

    /// Instantiate every protocol the registry offers for this vendor.
    pub fn install_protocols(&self, registry: &ProtocolRegistry) -> usize {
        let mut installed = 0;
        for protocol_type in registry.protocols_for(self.vendor) {
            for missing in registry.missing_dependencies(self.vendor, protocol_type) {
                debug!(
                    "{}: {} depends on {}, which is not available",
                    self.name, protocol_type, missing
                );
            }
            if let Some(protocol) = registry.create(self.vendor, protocol_type) {
                if self.register_protocol(protocol) {
                    installed += 1;
                }
            }
        }
        installed
    }

    pub fn protocol_types(&self) -> Vec<ProtocolType> {
        self.protocols.lock().keys().copied().collect()
    }

    pub fn has_protocol(&self, protocol_type: ProtocolType) -> bool {
        self.protocols.lock().contains_key(&protocol_type)
    }

    /// Run `f` against the registered protocol of concrete type `P`.
    pub fn with_protocol<P, R, F>(&self, protocol_type: ProtocolType, f: F) -> Option<R>
    where
        P: RoutingProtocol,
        F: FnOnce(&mut P) -> R,
    {
        let mut protocols = self.protocols.lock();
        let protocol = protocols.get_mut(&protocol_type)?;
        protocol.as_any_mut().downcast_mut::<P>().map(f)
    }

    /// Hook registered protocols up to `bus`. Instances already subscribed
    /// to this bus are skipped, so re-adding a device adds no handlers.
    pub fn subscribe_protocols_to_events(&self, bus: &Arc<EventBus>) {
        let protocols = self.protocols.lock();
        let mut subscriptions = self.subscriptions.lock();
        let mut subscribed = 0;
        for (protocol_type, protocol) in protocols.iter() {
            let current = subscriptions.get(protocol_type).and_then(Weak::upgrade);
            if current.is_some_and(|current| Arc::ptr_eq(&current, bus)) {
                continue;
            }
            protocol.subscribe_to_events(&self.name, bus);
            subscriptions.insert(*protocol_type, Arc::downgrade(bus));
            subscribed += 1;
        }
        debug!("{}: {} protocols subscribed to events", self.name, subscribed);
    }

    /// One lifecycle step for every registered protocol, in protocol order.
    pub fn tick_protocols(&self) {
        let mut protocols = self.protocols.lock();
        for protocol in protocols.values_mut() {
            protocol.tick(self);
        }
    }

    // Device log

    pub fn add_log_entry(&self, text: impl Into<String>) {
        let text = text.into();
        debug!("{}: {}", self.name, text);
        Self::push_log(&mut self.state.write().log, text);
    }

    pub fn log_entries(&self) -> Vec<String> {
        self.state.read().log.iter().cloned().collect()
    }

    fn push_log(log: &mut VecDeque<String>, text: String) {
        if log.len() == MAX_LOG_ENTRIES {
            log.pop_front();
        }
        log.push_back(format!("{} {}", Utc::now().format("%H:%M:%S%.3f"), text));
    }

    fn missing_interface(&self, name: &str) -> NetworkError {
        NetworkError::InterfaceNotFound {
            device: self.name.clone(),
            interface: name.to_string(),
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("device_id", &self.device_id())
            .field("vendor", &self.vendor)
            .field("protocols", &self.protocol_types())
            .finish()
    }
}

/// Editable, non-operational fields of an [`Interface`].
#[derive(Debug, Clone)]
pub struct InterfaceSettings {
    pub address: Option<ipnet::Ipv4Net>,
    pub description: Option<String>,
    pub vlan_id: Option<u16>,
    pub acl_in: Option<String>,
    pub acl_out: Option<String>,
}
