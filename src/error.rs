use std::io;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Device not registered in network: {0}")]
    DeviceNotFound(String),

    #[error("Interface {interface} not found on device {device}")]
    InterfaceNotFound { device: String, interface: String },

    #[error("Physical connection already exists: {0}")]
    DuplicateConnection(String),

    #[error("Physical connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
