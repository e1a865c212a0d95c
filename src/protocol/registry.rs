//! Which protocol engines exist for which vendor.
//!
//! A table from `(vendor, protocol)` to a constructor, filled in at startup.
//! Supporting a new vendor or protocol means adding rows here.

use std::collections::HashMap;

use super::{ConnectedProtocol, ProtocolType, RipProtocol, RoutingProtocol};
use crate::network::Vendor;

pub type ProtocolFactory = fn() -> Box<dyn RoutingProtocol>;

fn connected() -> Box<dyn RoutingProtocol> {
    Box::new(ConnectedProtocol::new())
}

fn rip() -> Box<dyn RoutingProtocol> {
    Box::new(RipProtocol::new())
}

#[derive(Debug, Default, Clone)]
pub struct ProtocolRegistry {
    factories: HashMap<(Vendor, ProtocolType), ProtocolFactory>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connected routes and RIP for every vendor.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for vendor in Vendor::ALL {
            registry.register(*vendor, ProtocolType::Connected, connected);
            registry.register(*vendor, ProtocolType::Rip, rip);
        }
        registry
    }

    /// Returns the factory previously registered for the same pair, if any.
    pub fn register(
        &mut self,
        vendor: Vendor,
        protocol_type: ProtocolType,
        factory: ProtocolFactory,
    ) -> Option<ProtocolFactory> {
        self.factories.insert((vendor, protocol_type), factory)
    }

    pub fn create(
        &self,
        vendor: Vendor,
        protocol_type: ProtocolType,
    ) -> Option<Box<dyn RoutingProtocol>> {
        self.factories
            .get(&(vendor, protocol_type))
            .map(|factory| factory())
    }

    pub fn supports(&self, vendor: Vendor, protocol_type: ProtocolType) -> bool {
        self.factories.contains_key(&(vendor, protocol_type))
    }

    /// Protocols available for `vendor`, in execution order.
    pub fn protocols_for(&self, vendor: Vendor) -> Vec<ProtocolType> {
        let mut types: Vec<ProtocolType> = self
            .factories
            .keys()
            .filter(|(v, _)| *v == vendor)
            .map(|(_, protocol_type)| *protocol_type)
            .collect();
        types.sort();
        types
    }

    /// Declared dependencies of `protocol_type` that have no factory for
    /// `vendor`. Dependencies are advisory, so this is informational only.
    pub fn missing_dependencies(
        &self,
        vendor: Vendor,
        protocol_type: ProtocolType,
    ) -> Vec<ProtocolType> {
        let Some(protocol) = self.create(vendor, protocol_type) else {
            return Vec::new();
        };
        protocol
            .dependencies()
            .iter()
            .copied()
            .filter(|dependency| !self.supports(vendor, *dependency))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_every_vendor() {
        let registry = ProtocolRegistry::with_defaults();
        for vendor in Vendor::ALL {
            assert_eq!(
                registry.protocols_for(*vendor),
                vec![ProtocolType::Connected, ProtocolType::Rip]
            );
        }
        let rip = registry.create(Vendor::Nokia, ProtocolType::Rip).unwrap();
        assert_eq!(rip.protocol_type(), ProtocolType::Rip);
        assert!(registry.create(Vendor::Nokia, ProtocolType::Bgp).is_none());
    }

    #[test]
    fn test_missing_dependencies_are_reported() {
        let mut registry = ProtocolRegistry::new();
        registry.register(Vendor::Linux, ProtocolType::Rip, rip);

        assert_eq!(
            registry.missing_dependencies(Vendor::Linux, ProtocolType::Rip),
            vec![ProtocolType::Connected, ProtocolType::Arp]
        );

        registry.register(Vendor::Linux, ProtocolType::Connected, connected);
        assert_eq!(
            registry.missing_dependencies(Vendor::Linux, ProtocolType::Rip),
            vec![ProtocolType::Arp]
        );
    }
}
