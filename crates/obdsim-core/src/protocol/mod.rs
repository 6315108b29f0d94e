//! ELM327 wire protocol
//!
//! Implements the adapter side of the ELM327 serial protocol: AT
//! configuration commands plus OBD-II mode+PID requests answered from the
//! live telemetry snapshot. Lines end in a carriage return in both
//! directions.

pub mod encoder;
mod error;
mod interpreter;

pub use encoder::encode_request;
pub use error::TransportError;
pub use interpreter::{CommandInterpreter, InterpreterTiming};

/// Terminator appended to every response line
pub const LINE_TERMINATOR: &str = "\r";

/// Reply for a supported request the current state cannot answer
pub const NO_DATA: &str = "NO DATA";

/// Reply for unparseable or unsupported input
pub const UNKNOWN: &str = "?";

/// Prefix occasionally sent before an OBD answer to mimic protocol search
pub const SEARCHING_PREFIX: &str = "SEARCHING...\r";

/// Poll timeout for session reads, keeping cancellation responsive
pub const READ_POLL_TIMEOUT_MS: u64 = 100;
