//! # OBDsim Core Library
//!
//! Core functionality for the OBDsim ELM327 adapter emulator.
//!
//! This library provides:
//! - Vehicle telemetry simulation (engine, temperatures, pressures, fuel)
//! - Diagnostic trouble code lifecycle with condition-driven generation
//! - ELM327 command interpretation (AT commands and OBD-II mode+PID requests)
//! - Transport bindings: serial port emulation and a TCP server
//! - Device discovery with a synthetic fallback when no hardware is present
//!
//! ## Example
//!
//! ```rust,ignore
//! use obdsim_core::{Emulator, EmulatorConfig};
//!
//! let mut emulator = Emulator::new(EmulatorConfig {
//!     listen_addr: Some("127.0.0.1:35000".to_string()),
//!     ..Default::default()
//! });
//!
//! emulator.start_simulation();
//! let addr = emulator.start_server().await?;
//! println!("ELM327 emulator listening on {addr}");
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod diagnostics;
pub mod emulator;
pub mod events;
pub mod protocol;
pub mod telemetry;
pub mod transport;

pub use config::EmulatorConfig;
pub use emulator::Emulator;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::EmulatorConfig;
    pub use crate::diagnostics::DiagnosticState;
    pub use crate::emulator::Emulator;
    pub use crate::events::{EmulatorEvent, EventBus};
    pub use crate::protocol::{CommandInterpreter, InterpreterTiming, TransportError};
    pub use crate::telemetry::simulator::SimulationModes;
    pub use crate::telemetry::{SharedSnapshot, TelemetrySnapshot, VehicleProfile};
    pub use crate::transport::{Device, TransportManager};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
