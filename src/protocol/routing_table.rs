use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub destination: Ipv4Net,
    pub next_hop: Ipv4Addr,
    pub interface: String,
    pub protocol: String,
    pub metric: u32,
    pub administrative_distance: u8,
    pub area: Option<u32>,
    pub tag: Option<u32>,
}

impl Route {
    pub fn new(
        destination: Ipv4Net,
        next_hop: Ipv4Addr,
        interface: impl Into<String>,
        protocol: impl Into<String>,
        metric: u32,
        administrative_distance: u8,
    ) -> Self {
        Self {
            destination: destination.trunc(),
            next_hop,
            interface: interface.into(),
            protocol: protocol.into(),
            metric,
            administrative_distance,
            area: None,
            tag: None,
        }
    }

    pub fn with_area(mut self, area: u32) -> Self {
        self.area = Some(area);
        self
    }

    pub fn with_tag(mut self, tag: u32) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn mask(&self) -> Ipv4Addr {
        self.destination.netmask()
    }

    fn key(&self) -> (Ipv4Net, String) {
        (self.destination, self.protocol.clone())
    }
}

/// Device routing table. Routes are keyed by destination and owning protocol,
/// so several protocols can offer the same prefix side by side.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    entries: BTreeMap<(Ipv4Net, String), Route>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the route for `(destination, protocol)`.
    pub fn add_route(&mut self, route: Route) -> Option<Route> {
        let mut route = route;
        route.destination = route.destination.trunc();
        self.entries.insert(route.key(), route)
    }

    pub fn remove_route(&mut self, destination: &Ipv4Net, protocol: &str) -> Option<Route> {
        self.entries
            .remove(&(destination.trunc(), protocol.to_string()))
    }

    pub fn get_route(&self, destination: &Ipv4Net, protocol: &str) -> Option<&Route> {
        self.entries.get(&(destination.trunc(), protocol.to_string()))
    }

    /// Drop every route owned by `protocol`, returning how many were removed.
    pub fn clear_protocol(&mut self, protocol: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(_, owner), _| owner != protocol);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.entries.values()
    }

    pub fn routes(&self) -> Vec<Route> {
        self.entries.values().cloned().collect()
    }

    pub fn routes_for_protocol(&self, protocol: &str) -> Vec<Route> {
        self.entries
            .values()
            .filter(|route| route.protocol == protocol)
            .cloned()
            .collect()
    }

    /// Longest prefix match; ties go to the lowest administrative distance,
    /// then the lowest metric.
    pub fn find_best_route(&self, target: Ipv4Addr) -> Option<&Route> {
        self.entries
            .values()
            .filter(|route| route.destination.contains(&target))
            .min_by(|a, b| {
                b.destination
                    .prefix_len()
                    .cmp(&a.destination.prefix_len())
                    .then(a.administrative_distance.cmp(&b.administrative_distance))
                    .then(a.metric.cmp(&b.metric))
            })
    }
}
