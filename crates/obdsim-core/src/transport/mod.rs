//! Transport layer
//!
//! Device discovery, outbound connections, and the two inbound bindings
//! (serial port and TCP server) that expose the command interpreter to
//! clients.

mod device;
pub mod discovery;
mod manager;
pub mod serial;
mod session;

pub use device::{Device, ServiceId};
pub use discovery::{DiscoveryConfig, SIMULATED_DEVICE_NAMES};
pub use manager::{ConnectTiming, TransportManager};
pub use session::{run_session, SessionEnd};
