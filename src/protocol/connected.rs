use std::any::Any;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use log::{debug, info};

use super::{ProtocolState, ProtocolType, Route, RoutingProtocol};
use crate::network::Device;

pub const CONNECTED_ADMINISTRATIVE_DISTANCE: u8 = 0;

/// Installs a route for the subnet of every up interface with an address.
#[derive(Debug, Default)]
pub struct ConnectedProtocol {
    state: ProtocolState,
    attached: BTreeSet<(Ipv4Net, String)>,
}

impl ConnectedProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    fn scan(device: &Device) -> BTreeSet<(Ipv4Net, String)> {
        device
            .interfaces()
            .into_values()
            .filter(|iface| iface.is_up())
            .filter_map(|iface| iface.network().map(|net| (net, iface.name)))
            .collect()
    }
}

impl RoutingProtocol for ConnectedProtocol {
    fn protocol_type(&self) -> ProtocolType {
        ProtocolType::Connected
    }

    fn state(&self) -> &ProtocolState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ProtocolState {
        &mut self.state
    }

    fn initialize(&mut self, device: &Device) {
        self.state.set_active(true);
        self.state.set_initialized();
        self.state.mark_changed();
        info!("{}: connected routes initialized", device.name());
    }

    fn apply_configuration(&mut self, _device: &Device) {}

    fn update_neighbors(&mut self, device: &Device) {
        let attached = Self::scan(device);
        if attached != self.attached {
            self.attached = attached;
            self.state.mark_changed();
        }
    }

    fn run_protocol_calculation(&mut self, device: &Device) {
        device.clear_routes_by_protocol(ProtocolType::Connected.name());
        for (network, interface) in &self.attached {
            device.add_route(Route::new(
                *network,
                Ipv4Addr::UNSPECIFIED,
                interface.as_str(),
                ProtocolType::Connected.name(),
                0,
                CONNECTED_ADMINISTRATIVE_DISTANCE,
            ));
        }
        self.state.touch();
        debug!("{}: {} connected routes", device.name(), self.attached.len());
    }

    fn process_timers(&mut self, _device: &Device) {}

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
