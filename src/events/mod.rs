//! Events published on the network [`EventBus`].
//!
//! Every state change in the topology travels as one of the variants of
//! [`NetworkEvent`]. Subscribers register for a concrete payload type
//! (`DeviceChanged`, `InterfaceStateChanged`, ...) and only receive events of
//! that kind.

pub mod bus;

pub use bus::EventBus;

use serde::{Deserialize, Serialize};

use crate::network::{ConnectionState, ConnectionType, Endpoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    Added,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    DeviceChanged,
    InterfaceStateChanged,
    PhysicalConnectionStateChanged,
    LinkChanged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceChanged {
    pub device_name: String,
    pub device_id: String,
    pub change: ChangeType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceStateChanged {
    pub device_name: String,
    pub interface_name: String,
    pub is_up: bool,
    pub is_shutdown: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalConnectionStateChanged {
    pub connection_id: String,
    pub endpoint1: Endpoint,
    pub endpoint2: Endpoint,
    pub connection_type: ConnectionType,
    pub old_state: ConnectionState,
    pub new_state: ConnectionState,
    pub reason: String,
}

/// Legacy link notification kept for subscribers that only care whether a
/// cable is usable or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkChanged {
    pub endpoint1: Endpoint,
    pub endpoint2: Endpoint,
    pub change: ChangeType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NetworkEvent {
    DeviceChanged(DeviceChanged),
    InterfaceStateChanged(InterfaceStateChanged),
    PhysicalConnectionStateChanged(PhysicalConnectionStateChanged),
    LinkChanged(LinkChanged),
}

impl NetworkEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            NetworkEvent::DeviceChanged(_) => EventKind::DeviceChanged,
            NetworkEvent::InterfaceStateChanged(_) => EventKind::InterfaceStateChanged,
            NetworkEvent::PhysicalConnectionStateChanged(_) => {
                EventKind::PhysicalConnectionStateChanged
            }
            NetworkEvent::LinkChanged(_) => EventKind::LinkChanged,
        }
    }
}

/// A payload type that can travel on the bus.
pub trait BusEvent: Clone + Send + Sync + 'static {
    const KIND: EventKind;

    fn into_event(self) -> NetworkEvent;

    fn from_event(event: NetworkEvent) -> Option<Self>;
}

macro_rules! bus_event {
    ($payload:ident) => {
        impl BusEvent for $payload {
            const KIND: EventKind = EventKind::$payload;

            fn into_event(self) -> NetworkEvent {
                NetworkEvent::$payload(self)
            }

            fn from_event(event: NetworkEvent) -> Option<Self> {
                match event {
                    NetworkEvent::$payload(payload) => Some(payload),
                    _ => None,
                }
            }
        }
    };
}

bus_event!(DeviceChanged);
bus_event!(InterfaceStateChanged);
bus_event!(PhysicalConnectionStateChanged);
bus_event!(LinkChanged);
