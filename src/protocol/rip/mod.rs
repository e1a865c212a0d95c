//! Distance-vector RIP engine.
//!
//! Neighbors are the RIP-enabled devices at the far end of operational links.
//! Their installed routing tables are taken as advertisements, one hop further
//! away. Learned routes live in [`RipState`] and age through
//! Valid -> Invalid -> flushed; only valid ones are installed on the device.

mod types;

pub use types::{
    RIP_ADMINISTRATIVE_DISTANCE, RIP_INFINITY, RipConfig, RipRoute, RipRouteState, RipState,
    RipTimers,
};

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use log::{debug, info};

use super::timers::{Ageable, PeriodicTimer, age_table};
use super::{ProtocolState, ProtocolType, Route, RoutingProtocol};
use crate::network::{Device, Interface};

#[derive(Debug)]
pub struct RipProtocol {
    state: RipState,
    config: Option<RipConfig>,
    update_timer: PeriodicTimer,
}

impl Default for RipProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl RipProtocol {
    pub fn new() -> Self {
        Self {
            state: RipState::default(),
            config: None,
            update_timer: PeriodicTimer::new(RipTimers::default().update_interval()),
        }
    }

    pub fn rip_state(&self) -> &RipState {
        &self.state
    }

    pub fn rip_state_mut(&mut self) -> &mut RipState {
        &mut self.state
    }

    pub fn config(&self) -> Option<&RipConfig> {
        self.config.as_ref()
    }

    fn timers(&self) -> RipTimers {
        self.config.as_ref().map(|c| c.timers).unwrap_or_default()
    }

    /// Apply one advertisement for `network`. Returns true if the table changed.
    fn learn(
        &mut self,
        network: Ipv4Net,
        next_hop: Ipv4Addr,
        interface: &str,
        metric: u8,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(existing) = self.state.routes.get_mut(&network) else {
            if metric >= RIP_INFINITY {
                return false;
            }
            self.state
                .routes
                .insert(network, RipRoute::new(network, next_hop, interface, metric, now));
            return true;
        };

        if metric < existing.metric {
            existing.replace(next_hop, interface, metric, now);
            return true;
        }

        if existing.next_hop == next_hop {
            // The source we learned the route from is authoritative for it,
            // in both directions.
            if metric >= RIP_INFINITY {
                if existing.state == RipRouteState::Valid {
                    existing.invalidate(now);
                    return true;
                }
                return false;
            }
            if metric != existing.metric
                || existing.state != RipRouteState::Valid
                || existing.interface != interface
            {
                existing.replace(next_hop, interface, metric, now);
                return true;
            }
        }

        existing.last_updated = now;
        false
    }

    fn record_changes(&mut self, count: usize) {
        if count > 0 {
            self.state.route_changes += count as u64;
            self.state.base.mark_changed();
        }
    }

    /// Invalidate routes whose egress interface is no longer usable.
    fn invalidate_unreachable(
        &mut self,
        interfaces: &HashMap<String, Interface>,
        now: DateTime<Utc>,
    ) -> usize {
        let lost: Vec<Ipv4Net> = self
            .state
            .routes
            .values()
            .filter(|route| route.state == RipRouteState::Valid)
            .filter(|route| !interfaces.get(&route.interface).is_some_and(Interface::is_up))
            .map(|route| route.network)
            .collect();

        for network in &lost {
            if let Some(route) = self.state.routes.get_mut(network) {
                debug!("RIP: {} lost interface {}", network, route.interface);
                route.invalidate(now);
            }
        }
        lost.len()
    }

    fn age_routes(&mut self, now: DateTime<Utc>) -> usize {
        let timers = self.timers();
        let report = age_table(
            &mut self.state.routes,
            now,
            timers.invalid_after(),
            timers.flush_after_invalid(),
        );

        for network in &report.invalidated {
            info!("RIP: route {} timed out, marked invalid", network);
        }
        for network in &report.flushed {
            info!("RIP: route {} flushed", network);
        }
        report.invalidated.len() + report.flushed.len()
    }

    fn run_timers(&mut self, device: &Device, now: DateTime<Utc>) {
        let aged = self.age_routes(now);
        self.record_changes(aged);

        if self.update_timer.poll(now) {
            self.send_periodic_updates(device);
        }
    }

    /// Announce the current table on every RIP interface that may send.
    /// Nothing leaves the process; the announcement is only counted and logged.
    pub fn send_periodic_updates(&mut self, device: &Device) {
        let Some(config) = self.config.as_ref().filter(|c| c.enabled) else {
            return;
        };

        let advertised = device.routing_table().len();
        let mut interfaces: Vec<_> = device.interfaces().into_values().collect();
        interfaces.sort_by(|a, b| a.name.cmp(&b.name));

        for iface in interfaces {
            if !iface.is_up() || !config.runs_on(&iface) || config.is_passive(&iface.name) {
                continue;
            }
            debug!(
                "{}: RIP update on {} ({} routes)",
                device.name(),
                iface.name,
                advertised
            );
            self.state.updates_sent += 1;
        }
    }
}

/// The route each destination is advertised with: lowest distance, then
/// lowest metric.
fn best_per_destination(routes: Vec<Route>) -> BTreeMap<Ipv4Net, Route> {
    let mut best: BTreeMap<Ipv4Net, Route> = BTreeMap::new();
    for route in routes {
        match best.get(&route.destination) {
            Some(current)
                if (current.administrative_distance, current.metric)
                    <= (route.administrative_distance, route.metric) => {}
            _ => {
                best.insert(route.destination, route);
            }
        }
    }
    best
}

impl RoutingProtocol for RipProtocol {
    fn protocol_type(&self) -> ProtocolType {
        ProtocolType::Rip
    }

    fn state(&self) -> &ProtocolState {
        &self.state.base
    }

    fn state_mut(&mut self) -> &mut ProtocolState {
        &mut self.state.base
    }

    fn dependencies(&self) -> &'static [ProtocolType] {
        &[ProtocolType::Connected, ProtocolType::Arp]
    }

    fn initialize(&mut self, device: &Device) {
        self.apply_configuration(device);
        self.state.base.set_initialized();
        info!(
            "{}: RIP initialized ({})",
            device.name(),
            if self.is_active() { "active" } else { "inactive" }
        );
    }

    fn apply_configuration(&mut self, device: &Device) {
        let config = device.rip_configuration();
        let active = config.as_ref().is_some_and(|c| c.enabled);
        let was_active = self.state.base.is_active();

        if let Some(config) = &config {
            self.update_timer.set_interval(config.timers.update_interval());
        }
        self.config = config;
        self.state.base.set_active(active);

        if was_active && !active {
            self.state.routes.clear();
            let removed = device.clear_routes_by_protocol(ProtocolType::Rip.name());
            info!("{}: RIP disabled, {} routes withdrawn", device.name(), removed);
        }
        self.state.base.mark_changed();
    }

    fn update_neighbors(&mut self, device: &Device) {
        let Some(config) = self.config.clone() else {
            return;
        };
        let now = Utc::now();
        let interfaces = device.interfaces();

        let lost = self.invalidate_unreachable(&interfaces, now);
        let aged = self.age_routes(now);
        self.record_changes(lost + aged);

        let attached: Vec<Ipv4Net> = interfaces.values().filter_map(Interface::network).collect();
        let mut local: Vec<&Interface> = interfaces.values().collect();
        local.sort_by(|a, b| a.name.cmp(&b.name));

        let mut changes = 0;
        for iface in local {
            if !iface.is_up() || iface.is_shutdown() || !config.runs_on(iface) {
                continue;
            }
            let Some((peer, peer_interface)) = device.connected_device(&iface.name) else {
                continue;
            };
            let Some(peer_config) = peer.rip_configuration().filter(|c| c.enabled) else {
                continue;
            };
            let Some(peer_iface) = peer.interface(&peer_interface) else {
                continue;
            };
            if !peer_config.runs_on(&peer_iface) || peer_config.is_passive(&peer_interface) {
                continue;
            }
            let Some(next_hop) = peer_iface.ip_address() else {
                debug!(
                    "{}: RIP peer {} has no address on {}",
                    device.name(),
                    peer.name(),
                    peer_interface
                );
                continue;
            };

            self.state.updates_received += 1;
            for (network, route) in best_per_destination(peer.routing_table()) {
                // Split horizon: skip what the peer reaches through us.
                if route.interface == peer_interface || device.owns_address(route.next_hop) {
                    continue;
                }
                if attached.contains(&network) || route.metric >= RIP_INFINITY as u32 {
                    continue;
                }

                let metric = route.metric.saturating_add(1).min(RIP_INFINITY as u32) as u8;
                if self.learn(network, next_hop, &iface.name, metric, now) {
                    debug!(
                        "{}: RIP learned {} via {} metric {}",
                        device.name(),
                        network,
                        next_hop,
                        metric
                    );
                    changes += 1;
                }
            }
        }
        self.record_changes(changes);
    }

    fn run_protocol_calculation(&mut self, device: &Device) {
        device.clear_routes_by_protocol(ProtocolType::Rip.name());

        let mut installed = 0;
        for route in self.state.valid_routes() {
            device.add_route(Route::new(
                route.network,
                route.next_hop,
                route.interface.as_str(),
                ProtocolType::Rip.name(),
                route.metric as u32,
                RIP_ADMINISTRATIVE_DISTANCE,
            ));
            installed += 1;
        }
        self.state.base.touch();
        debug!("{}: RIP installed {} routes", device.name(), installed);
    }

    fn process_timers(&mut self, device: &Device) {
        self.run_timers(device, Utc::now());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
