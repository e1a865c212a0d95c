//! Routing protocol lifecycle.
//!
//! Every protocol engine implements [`RoutingProtocol`]. A host driver calls
//! [`RoutingProtocol::tick`] on a recurring schedule; each tick refreshes
//! neighbor information, recomputes routes if anything changed since the last
//! computation, and then runs the protocol timers.

pub mod connected;
pub mod registry;
pub mod rip;
pub mod routing_table;
pub mod timers;

pub use connected::ConnectedProtocol;
pub use registry::{ProtocolFactory, ProtocolRegistry};
pub use rip::{RipConfig, RipProtocol, RipRoute, RipRouteState, RipState, RipTimers};
pub use routing_table::{Route, RoutingTable};

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{EventBus, InterfaceStateChanged, PhysicalConnectionStateChanged};
use crate::network::{Device, Vendor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolType {
    // Declaration order is the per-tick execution order on a device.
    Connected,
    Arp,
    Rip,
    Ospf,
    Eigrp,
    Bgp,
}

impl ProtocolType {
    /// Tag carried by the routes this protocol installs.
    pub fn name(&self) -> &'static str {
        match self {
            ProtocolType::Connected => "CONNECTED",
            ProtocolType::Arp => "ARP",
            ProtocolType::Rip => "RIP",
            ProtocolType::Ospf => "OSPF",
            ProtocolType::Eigrp => "EIGRP",
            ProtocolType::Bgp => "BGP",
        }
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared handle on a protocol's change marker, usable from event handlers.
#[derive(Debug, Clone, Default)]
pub struct ChangeHandle(Arc<AtomicU64>);

impl ChangeHandle {
    pub fn mark_changed(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// State every protocol carries regardless of its algorithm.
#[derive(Debug, Clone)]
pub struct ProtocolState {
    active: bool,
    initialized: bool,
    changes: ChangeHandle,
    calculated: u64,
    last_update: DateTime<Utc>,
}

impl Default for ProtocolState {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolState {
    pub fn new() -> Self {
        Self {
            active: false,
            initialized: false,
            changes: ChangeHandle::default(),
            calculated: 0,
            last_update: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn set_initialized(&mut self) {
        self.initialized = true;
    }

    pub fn mark_changed(&self) {
        self.changes.mark_changed();
    }

    pub fn change_handle(&self) -> ChangeHandle {
        self.changes.clone()
    }

    pub fn change_marker(&self) -> u64 {
        self.changes.current()
    }

    /// True when something was learned since the last route computation.
    pub fn has_pending_changes(&self) -> bool {
        self.changes.current() != self.calculated
    }

    pub fn mark_calculated(&mut self, marker: u64) {
        self.calculated = marker;
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    pub fn touch(&mut self) {
        self.last_update = Utc::now();
    }
}

pub trait RoutingProtocol: Send + 'static {
    fn protocol_type(&self) -> ProtocolType;

    fn state(&self) -> &ProtocolState;

    fn state_mut(&mut self) -> &mut ProtocolState;

    fn initialize(&mut self, device: &Device);

    /// Read this protocol's configuration from `device` and adopt it.
    fn apply_configuration(&mut self, device: &Device);

    fn update_neighbors(&mut self, device: &Device);

    /// Replace the routes this protocol owns on `device`.
    fn run_protocol_calculation(&mut self, device: &Device);

    fn process_timers(&mut self, device: &Device);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn name(&self) -> &'static str {
        self.protocol_type().name()
    }

    fn is_active(&self) -> bool {
        self.state().is_active()
    }

    fn supported_vendors(&self) -> &'static [Vendor] {
        Vendor::ALL
    }

    fn supports_vendor(&self, vendor: Vendor) -> bool {
        self.supported_vendors().contains(&vendor)
    }

    /// Protocols this one relies on. Advisory only; nothing here enforces it.
    fn dependencies(&self) -> &'static [ProtocolType] {
        &[]
    }

    /// Bump the change marker whenever the link layer under `device_name`
    /// moves, so the next tick recomputes without waiting for timers.
    fn subscribe_to_events(&self, device_name: &str, bus: &EventBus) {
        let handle = self.state().change_handle();
        let device = device_name.to_string();
        bus.subscribe(move |event: InterfaceStateChanged| {
            let handle = handle.clone();
            let device = device.clone();
            async move {
                if event.device_name == device {
                    handle.mark_changed();
                }
                Ok(())
            }
        });

        let handle = self.state().change_handle();
        let device = device_name.to_string();
        bus.subscribe(move |event: PhysicalConnectionStateChanged| {
            let handle = handle.clone();
            let device = device.clone();
            async move {
                if event.endpoint1.device == device || event.endpoint2.device == device {
                    handle.mark_changed();
                }
                Ok(())
            }
        });
    }

    fn tick(&mut self, device: &Device) {
        if !self.state().is_initialized() {
            self.initialize(device);
        }
        if !self.is_active() {
            return;
        }

        self.update_neighbors(device);

        if self.state().has_pending_changes() {
            let marker = self.state().change_marker();
            self.run_protocol_calculation(device);
            self.state_mut().mark_calculated(marker);
        }

        self.process_timers(device);
    }
}
