use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// A device port. `is_up` is derived by the [`Network`](super::Network) from
/// the administrative state and the physical connections on this port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    pub address: Option<Ipv4Net>,
    pub description: Option<String>,
    pub vlan_id: Option<u16>,
    pub acl_in: Option<String>,
    pub acl_out: Option<String>,
    is_shutdown: bool,
    is_up: bool,
}

impl Interface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: None,
            description: None,
            vlan_id: None,
            acl_in: None,
            acl_out: None,
            is_shutdown: false,
            is_up: false,
        }
    }

    pub fn with_address(mut self, address: Ipv4Net) -> Self {
        self.address = Some(address);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_vlan(mut self, vlan_id: u16) -> Self {
        self.vlan_id = Some(vlan_id);
        self
    }

    /// Administratively disable the port before it is attached to a device.
    pub fn shutdown(mut self) -> Self {
        self.is_shutdown = true;
        self
    }

    pub fn is_up(&self) -> bool {
        self.is_up
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown
    }

    pub fn ip_address(&self) -> Option<Ipv4Addr> {
        self.address.map(|net| net.addr())
    }

    /// The attached subnet, host bits cleared.
    pub fn network(&self) -> Option<Ipv4Net> {
        self.address.map(|net| net.trunc())
    }

    pub(crate) fn set_shutdown(&mut self, shutdown: bool) {
        self.is_shutdown = shutdown;
        if shutdown {
            self.is_up = false;
        }
    }

    /// Recompute `is_up` from the link state. Returns true if it flipped.
    pub(crate) fn refresh_operational(&mut self, link_operational: bool) -> bool {
        let up = !self.is_shutdown && link_operational;
        let flipped = up != self.is_up;
        self.is_up = up;
        flipped
    }
}
