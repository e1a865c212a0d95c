//! Scenario files: the devices, links and driver settings of one simulation.

pub mod router_config;

pub use router_config::{DeviceConfig, InterfaceConfig, StaticRouteConfig};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::info;

use crate::error::ConfigError;
use crate::network::{ConnectionType, Network};
use crate::protocol::ProtocolRegistry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    pub device1: String,
    pub interface1: String,
    pub device2: String,
    pub interface2: String,
    #[serde(default)]
    pub connection_type: ConnectionType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    1000
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub links: Vec<LinkConfig>,
    #[serde(default)]
    pub driver: DriverConfig,
}

impl SimulationConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: SimulationConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for device in &self.devices {
            device.validate()?;
            if !names.insert(device.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "device {} declared twice",
                    device.name
                )));
            }
        }

        for link in &self.links {
            for (device, interface) in [
                (&link.device1, &link.interface1),
                (&link.device2, &link.interface2),
            ] {
                let known = self
                    .devices
                    .iter()
                    .find(|d| &d.name == device)
                    .is_some_and(|d| d.get_interface_by_name(interface).is_some());
                if !known {
                    return Err(ConfigError::Invalid(format!(
                        "link references unknown endpoint {}:{}",
                        device, interface
                    )));
                }
            }
        }

        if self.driver.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be positive".to_string()));
        }
        Ok(())
    }

    /// Create every device, install the registry's protocols on it and wire
    /// up the links.
    pub async fn build_network(&self, registry: &ProtocolRegistry) -> anyhow::Result<Arc<Network>> {
        let network = Network::new();

        for device_config in &self.devices {
            let device = device_config.to_device();
            let installed = device.install_protocols(registry);
            info!("{}: {} protocols installed", device.name(), installed);
            network.add_device(Arc::new(device)).await;
        }

        for link in &self.links {
            network
                .add_physical_connection(
                    &link.device1,
                    &link.interface1,
                    &link.device2,
                    &link.interface2,
                    link.connection_type,
                )
                .await?;
        }

        Ok(network)
    }
}
