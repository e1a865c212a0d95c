//! Physical link model.
//!
//! A [`PhysicalConnection`] joins two `(device, interface)` endpoints and
//! tracks the quality of the cable between them. Transitions return a
//! [`ConnectionStateChange`] describing what happened; applying that change to
//! the attached interfaces is the job of the [`Network`](super::Network).

use std::fmt;

use chrono::{DateTime, Utc};
use log::info;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::NetworkError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    pub device: String,
    pub interface: String,
}

impl Endpoint {
    pub fn new(device: impl Into<String>, interface: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            interface: interface.into(),
        }
    }

    pub fn key(&self) -> String {
        format!("{}:{}", self.device, self.interface)
    }

    pub fn matches(&self, device: &str, interface: &str) -> bool {
        self.device == device && self.interface == interface
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device, self.interface)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Cable registered but not plugged in yet, or unplugged on removal.
    Disconnected,
    Connected,
    Degraded,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    #[default]
    Ethernet,
    Fiber,
    Serial,
    Wireless,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStateChange {
    pub old_state: ConnectionState,
    pub new_state: ConnectionState,
    pub reason: String,
}

#[derive(Debug, Clone)]
struct LinkStatus {
    state: ConnectionState,
    packet_loss: f64,
    extra_latency_ms: u32,
    reason: String,
    last_changed: DateTime<Utc>,
}

#[derive(Debug)]
pub struct PhysicalConnection {
    id: String,
    endpoint1: Endpoint,
    endpoint2: Endpoint,
    connection_type: ConnectionType,
    status: Mutex<LinkStatus>,
    state_tx: watch::Sender<ConnectionState>,
}

impl PhysicalConnection {
    pub fn new(endpoint1: Endpoint, endpoint2: Endpoint, connection_type: ConnectionType) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            id: Self::canonical_id(&endpoint1, &endpoint2),
            endpoint1,
            endpoint2,
            connection_type,
            status: Mutex::new(LinkStatus {
                state: ConnectionState::Disconnected,
                packet_loss: 0.0,
                extra_latency_ms: 0,
                reason: String::new(),
                last_changed: Utc::now(),
            }),
            state_tx,
        }
    }

    /// Order-independent identifier for the link between `a` and `b`.
    pub fn canonical_id(a: &Endpoint, b: &Endpoint) -> String {
        let (a, b) = (a.key(), b.key());
        if a <= b {
            format!("{}<->{}", a, b)
        } else {
            format!("{}<->{}", b, a)
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn endpoint1(&self) -> &Endpoint {
        &self.endpoint1
    }

    pub fn endpoint2(&self) -> &Endpoint {
        &self.endpoint2
    }

    pub fn connection_type(&self) -> ConnectionType {
        self.connection_type
    }

    pub fn state(&self) -> ConnectionState {
        self.status.lock().state
    }

    /// Degraded links still carry traffic, with loss and latency attached.
    pub fn is_operational(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Connected | ConnectionState::Degraded
        )
    }

    pub fn packet_loss(&self) -> f64 {
        self.status.lock().packet_loss
    }

    pub fn extra_latency_ms(&self) -> u32 {
        self.status.lock().extra_latency_ms
    }

    pub fn last_reason(&self) -> String {
        self.status.lock().reason.clone()
    }

    pub fn last_changed(&self) -> DateTime<Utc> {
        self.status.lock().last_changed
    }

    pub fn involves(&self, device: &str, interface: &str) -> bool {
        self.endpoint1.matches(device, interface) || self.endpoint2.matches(device, interface)
    }

    pub fn involves_device(&self, device: &str) -> bool {
        self.endpoint1.device == device || self.endpoint2.device == device
    }

    /// The far end of the cable as seen from `(device, interface)`.
    pub fn remote_endpoint(&self, device: &str, interface: &str) -> Option<&Endpoint> {
        if self.endpoint1.matches(device, interface) {
            Some(&self.endpoint2)
        } else if self.endpoint2.matches(device, interface) {
            Some(&self.endpoint1)
        } else {
            None
        }
    }

    /// Watch the link state without going through the event bus.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn connect(&self) -> Option<ConnectionStateChange> {
        self.transition(ConnectionState::Connected, "Cable connected", None)
    }

    pub fn set_degraded(
        &self,
        packet_loss: f64,
        extra_latency_ms: u32,
        reason: &str,
    ) -> Result<Option<ConnectionStateChange>, NetworkError> {
        if !(0.0..=100.0).contains(&packet_loss) {
            return Err(NetworkError::InvalidArgument(format!(
                "packet loss must be within 0-100%, got {}",
                packet_loss
            )));
        }
        if self.state() == ConnectionState::Disconnected {
            return Err(NetworkError::InvalidArgument(format!(
                "cannot degrade disconnected link {}",
                self.id
            )));
        }

        Ok(self.transition(
            ConnectionState::Degraded,
            reason,
            Some((packet_loss, extra_latency_ms)),
        ))
    }

    pub fn set_failed(&self, reason: &str) -> Option<ConnectionStateChange> {
        self.transition(ConnectionState::Failed, reason, None)
    }

    /// Bring a degraded or failed link back to Connected. No-op otherwise.
    pub fn restore(&self) -> Option<ConnectionStateChange> {
        match self.state() {
            ConnectionState::Degraded | ConnectionState::Failed => {
                self.transition(ConnectionState::Connected, "Connection restored", None)
            }
            ConnectionState::Connected | ConnectionState::Disconnected => None,
        }
    }

    pub fn disconnect(&self, reason: &str) -> Option<ConnectionStateChange> {
        self.transition(ConnectionState::Disconnected, reason, None)
    }

    fn transition(
        &self,
        new_state: ConnectionState,
        reason: &str,
        degradation: Option<(f64, u32)>,
    ) -> Option<ConnectionStateChange> {
        let mut status = self.status.lock();
        let old_state = status.state;

        let (packet_loss, extra_latency_ms) = degradation.unwrap_or((0.0, 0));
        status.packet_loss = packet_loss;
        status.extra_latency_ms = extra_latency_ms;

        if old_state == new_state {
            return None;
        }

        status.state = new_state;
        status.reason = reason.to_string();
        status.last_changed = Utc::now();
        drop(status);

        self.state_tx.send_replace(new_state);
        info!(
            "Link {} changed {:?} -> {:?} ({})",
            self.id, old_state, new_state, reason
        );

        Some(ConnectionStateChange {
            old_state,
            new_state,
            reason: reason.to_string(),
        })
    }
}
