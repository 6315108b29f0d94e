//! Transport and protocol errors

use thiserror::Error;

/// Errors raised by the transport layer and command sessions
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Not connected to any device")]
    NotConnected,

    #[error("Already connected to {0}")]
    AlreadyConnected(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Signal too weak to connect ({rssi} dBm)")]
    SignalTooWeak { rssi: i32 },

    #[error("Bind failed on {addr}: {source}")]
    BindFailed {
        addr: String,
        source: std::io::Error,
    },

    #[error("Discovery timed out")]
    DiscoveryTimeout,

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
