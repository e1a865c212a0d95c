pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod network;
pub mod protocol;

pub use config::SimulationConfig;
pub use driver::SimulationDriver;
pub use error::{ConfigError, NetworkError};
pub use events::EventBus;
pub use network::{
    ConnectionState, ConnectionType, Device, Interface, Network, NetworkStatistics,
    PhysicalConnection, Vendor,
};
pub use protocol::{ProtocolRegistry, ProtocolType, Route, RoutingProtocol};
