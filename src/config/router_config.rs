use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::error::ConfigError;
use crate::network::{Device, Interface, Vendor};
use crate::protocol::{RipConfig, Route};

pub const STATIC_ADMINISTRATIVE_DISTANCE: u8 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    #[serde(default = "default_vendor")]
    pub vendor: Vendor,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,
    #[serde(default)]
    pub rip: Option<RipConfig>,
    #[serde(default)]
    pub static_routes: Vec<StaticRouteConfig>,
}

fn default_vendor() -> Vendor {
    Vendor::Generic
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceConfig {
    pub name: String,
    #[serde(default)]
    pub address: Option<Ipv4Net>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub vlan_id: Option<u16>,
    #[serde(default)]
    pub shutdown: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticRouteConfig {
    pub destination: Ipv4Net,
    pub next_hop: Ipv4Addr,
    pub interface: String,
    #[serde(default)]
    pub metric: u32,
}

impl InterfaceConfig {
    pub fn to_interface(&self) -> Interface {
        let mut interface = Interface::new(self.name.clone());
        interface.address = self.address;
        interface.description = self.description.clone();
        interface.vlan_id = self.vlan_id;
        if self.shutdown {
            interface = interface.shutdown();
        }
        interface
    }
}

impl StaticRouteConfig {
    pub fn to_route(&self) -> Route {
        Route::new(
            self.destination,
            self.next_hop,
            self.interface.as_str(),
            "STATIC",
            self.metric,
            STATIC_ADMINISTRATIVE_DISTANCE,
        )
    }
}

impl DeviceConfig {
    pub fn new(name: impl Into<String>, vendor: Vendor) -> Self {
        Self {
            name: name.into(),
            vendor,
            device_id: None,
            interfaces: Vec::new(),
            rip: None,
            static_routes: Vec::new(),
        }
    }

    pub fn get_interface_by_name(&self, name: &str) -> Option<&InterfaceConfig> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("device with empty name".to_string()));
        }
        for (index, iface) in self.interfaces.iter().enumerate() {
            if self.interfaces[..index].iter().any(|other| other.name == iface.name) {
                return Err(ConfigError::Invalid(format!(
                    "{}: interface {} declared twice",
                    self.name, iface.name
                )));
            }
        }
        for route in &self.static_routes {
            if self.get_interface_by_name(&route.interface).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "{}: static route {} uses unknown interface {}",
                    self.name, route.destination, route.interface
                )));
            }
        }
        Ok(())
    }

    /// Build the device with its interfaces, static routes and RIP settings.
    /// Protocol instances are installed separately.
    pub fn to_device(&self) -> Device {
        let mut device = Device::new(self.name.clone(), self.vendor);
        if let Some(id) = &self.device_id {
            device = device.with_device_id(id.clone());
        }
        for iface in &self.interfaces {
            device.add_interface(iface.to_interface());
        }
        for route in &self.static_routes {
            device.add_route(route.to_route());
        }
        device.set_rip_configuration(self.rip.clone());
        device
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_config_from_json() {
        let config: DeviceConfig = serde_json::from_str(
            r#"{
                "name": "R1",
                "vendor": "arista",
                "interfaces": [
                    { "name": "eth0", "address": "10.0.0.1/24" },
                    { "name": "eth1", "shutdown": true }
                ],
                "rip": { "enabled": true, "passive_interfaces": ["eth1"] },
                "static_routes": [
                    { "destination": "0.0.0.0/0", "next_hop": "10.0.0.254", "interface": "eth0" }
                ]
            }"#,
        )
        .unwrap();
        config.validate().unwrap();

        let device = config.to_device();
        assert_eq!(device.vendor(), Vendor::Arista);
        assert!(device.interface("eth1").unwrap().is_shutdown());
        assert_eq!(device.routes_by_protocol("STATIC")[0].administrative_distance, 1);

        let rip = device.rip_configuration().unwrap();
        assert!(rip.enabled && rip.is_passive("eth1"));
        assert_eq!(rip.timers.update_secs, 30);
    }

    #[test]
    fn test_static_route_on_unknown_interface_is_rejected() {
        let mut config = DeviceConfig::new("R1", Vendor::Cisco);
        config.static_routes.push(StaticRouteConfig {
            destination: "0.0.0.0/0".parse().unwrap(),
            next_hop: Ipv4Addr::new(10, 0, 0, 254),
            interface: "eth0".to_string(),
            metric: 0,
        });
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
