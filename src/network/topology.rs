use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ConnectionState, PhysicalConnection};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStatistics {
    pub total_devices: usize,
    pub total_connections: usize,
    pub operational_connections: usize,
    pub degraded_connections: usize,
    pub failed_connections: usize,
    /// Percentage of operational links, 0 when there are none.
    pub connection_reliability: f64,
}

impl NetworkStatistics {
    pub fn collect<'a, I>(total_devices: usize, connections: I) -> Self
    where
        I: IntoIterator<Item = &'a Arc<PhysicalConnection>>,
    {
        let mut stats = Self {
            total_devices,
            total_connections: 0,
            operational_connections: 0,
            degraded_connections: 0,
            failed_connections: 0,
            connection_reliability: 0.0,
        };

        for connection in connections {
            stats.total_connections += 1;
            if connection.is_operational() {
                stats.operational_connections += 1;
            }
            match connection.state() {
                ConnectionState::Degraded => stats.degraded_connections += 1,
                ConnectionState::Failed => stats.failed_connections += 1,
                ConnectionState::Connected | ConnectionState::Disconnected => {}
            }
        }

        if stats.total_connections > 0 {
            stats.connection_reliability =
                stats.operational_connections as f64 / stats.total_connections as f64 * 100.0;
        }

        stats
    }
}
