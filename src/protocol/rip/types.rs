use chrono::{DateTime, Duration, Utc};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;

use crate::network::Interface;
use crate::protocol::timers::Ageable;
use crate::protocol::ProtocolState;

pub const RIP_INFINITY: u8 = 16;
pub const RIP_ADMINISTRATIVE_DISTANCE: u8 = 120;

fn default_update_secs() -> u64 {
    30
}

fn default_invalid_secs() -> u64 {
    180
}

fn default_flush_secs() -> u64 {
    240
}

fn default_version() -> u8 {
    2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RipTimers {
    #[serde(default = "default_update_secs")]
    pub update_secs: u64,
    #[serde(default = "default_invalid_secs")]
    pub invalid_secs: u64,
    /// Measured from the last update, so a route is flushed
    /// `flush_secs - invalid_secs` after it went invalid.
    #[serde(default = "default_flush_secs")]
    pub flush_secs: u64,
}

impl Default for RipTimers {
    fn default() -> Self {
        Self {
            update_secs: default_update_secs(),
            invalid_secs: default_invalid_secs(),
            flush_secs: default_flush_secs(),
        }
    }
}

impl RipTimers {
    pub fn update_interval(&self) -> Duration {
        Duration::seconds(self.update_secs as i64)
    }

    pub fn invalid_after(&self) -> Duration {
        Duration::seconds(self.invalid_secs as i64)
    }

    pub fn flush_after_invalid(&self) -> Duration {
        Duration::seconds(self.flush_secs.saturating_sub(self.invalid_secs) as i64)
    }
}

/// Per-device RIP configuration as entered through `router rip`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RipConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_version")]
    pub version: u8,
    /// `network` statements. Empty means RIP runs on every interface.
    #[serde(default)]
    pub networks: Vec<Ipv4Net>,
    #[serde(default)]
    pub passive_interfaces: Vec<String>,
    #[serde(default)]
    pub timers: RipTimers,
}

impl Default for RipConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            version: default_version(),
            networks: Vec::new(),
            passive_interfaces: Vec::new(),
            timers: RipTimers::default(),
        }
    }
}

impl RipConfig {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    pub fn with_network(mut self, network: Ipv4Net) -> Self {
        self.networks.push(network.trunc());
        self
    }

    pub fn with_passive_interface(mut self, interface: impl Into<String>) -> Self {
        self.passive_interfaces.push(interface.into());
        self
    }

    pub fn is_passive(&self, interface: &str) -> bool {
        self.passive_interfaces.iter().any(|name| name == interface)
    }

    /// Whether RIP is enabled on `interface` by a `network` statement.
    pub fn runs_on(&self, interface: &Interface) -> bool {
        if !self.enabled {
            return false;
        }
        if self.networks.is_empty() {
            return true;
        }
        match interface.ip_address() {
            Some(addr) => self.networks.iter().any(|net| net.contains(&addr)),
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RipRouteState {
    Valid,
    Invalid,
    Holddown,
    Flushing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RipRoute {
    pub network: Ipv4Net,
    pub next_hop: Ipv4Addr,
    pub interface: String,
    pub metric: u8,
    pub state: RipRouteState,
    pub last_updated: DateTime<Utc>,
    pub invalid_time: Option<DateTime<Utc>>,
}

impl RipRoute {
    pub fn new(
        network: Ipv4Net,
        next_hop: Ipv4Addr,
        interface: impl Into<String>,
        metric: u8,
        now: DateTime<Utc>,
    ) -> Self {
        let mut route = Self {
            network: network.trunc(),
            next_hop,
            interface: interface.into(),
            metric,
            state: RipRouteState::Valid,
            last_updated: now,
            invalid_time: None,
        };
        if metric >= RIP_INFINITY {
            route.invalidate(now);
        }
        route
    }

    pub fn is_usable(&self) -> bool {
        self.state == RipRouteState::Valid && self.metric < RIP_INFINITY
    }

    /// Take a new advertisement, making the route valid again unless it is
    /// unreachable.
    pub fn replace(
        &mut self,
        next_hop: Ipv4Addr,
        interface: &str,
        metric: u8,
        now: DateTime<Utc>,
    ) {
        self.next_hop = next_hop;
        self.interface = interface.to_string();
        self.last_updated = now;
        if metric >= RIP_INFINITY {
            self.invalidate(now);
            return;
        }
        self.metric = metric;
        self.state = RipRouteState::Valid;
        self.invalid_time = None;
    }
}

impl Ageable for RipRoute {
    fn last_refreshed(&self) -> DateTime<Utc> {
        self.last_updated
    }

    fn invalid_since(&self) -> Option<DateTime<Utc>> {
        match self.state {
            RipRouteState::Valid => None,
            _ => Some(self.invalid_time.unwrap_or(self.last_updated)),
        }
    }

    fn invalidate(&mut self, now: DateTime<Utc>) {
        self.state = RipRouteState::Invalid;
        self.metric = RIP_INFINITY;
        self.invalid_time = Some(now);
    }
}

#[derive(Debug, Clone, Default)]
pub struct RipState {
    pub base: ProtocolState,
    pub routes: HashMap<Ipv4Net, RipRoute>,
    pub updates_sent: u64,
    pub updates_received: u64,
    pub route_changes: u64,
}

impl RipState {
    pub fn valid_routes(&self) -> impl Iterator<Item = &RipRoute> {
        self.routes.values().filter(|route| route.is_usable())
    }
}
