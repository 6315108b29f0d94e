//! ELM327 command interpreter
//!
//! One interpreter serves every session concurrently. Requests are
//! normalized (uppercase, separators stripped), dispatched to the AT table
//! or the OBD encoder, and answered after a simulated processing delay so
//! clients see adapter-like latency instead of instant replies.

use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;

use crate::protocol::encoder::encode_request;
use crate::protocol::{SEARCHING_PREFIX, UNKNOWN};
use crate::telemetry::SharedSnapshot;

/// Adapter firmware banner returned by ATZ and ATWS
const ADAPTER_VERSION: &str = "ELM327 v2.1";

/// AT commands acknowledged with a bare OK. Mostly client-side toggles
/// (echo, linefeeds, headers, spaces, protocol select) that have no
/// observable effect on this side of the wire.
const ACK_ONLY_COMMANDS: &[&str] = &[
    "ATSP0", "ATSP6", "ATSP7", "ATSP8", "ATSP9", "ATE0", "ATE1", "ATL0", "ATL1", "ATH0", "ATH1",
    "ATS0", "ATS1", "ATMA", "ATAT0", "ATAT1", "ATAT2", "ATST", "ATKW",
];

/// Artificial latencies applied before responding.
///
/// Tests shrink these to zero (or run under a paused clock) so suites stay
/// fast while production sessions keep adapter-like pacing.
#[derive(Debug, Clone)]
pub struct InterpreterTiming {
    /// Full chip reset (ATZ)
    pub reset_delay: Duration,
    /// Extra delay when the adapter pretends to search for a protocol
    pub search_delay: Duration,
    /// Lower bound of the per-command processing delay
    pub processing_min: Duration,
    /// Upper bound of the per-command processing delay
    pub processing_max: Duration,
    /// Chance that a mode+PID answer is prefixed with `SEARCHING...`
    pub searching_probability: f64,
}

impl Default for InterpreterTiming {
    fn default() -> Self {
        Self {
            reset_delay: Duration::from_millis(1500),
            search_delay: Duration::from_millis(500),
            processing_min: Duration::from_millis(20),
            processing_max: Duration::from_millis(100),
            searching_probability: 0.1,
        }
    }
}

impl InterpreterTiming {
    /// Zero delays and no searching prefix, for deterministic tests
    pub fn instant() -> Self {
        Self {
            reset_delay: Duration::ZERO,
            search_delay: Duration::ZERO,
            processing_min: Duration::ZERO,
            processing_max: Duration::ZERO,
            searching_probability: 0.0,
        }
    }
}

/// Stateless-per-request command processor shared by all sessions
pub struct CommandInterpreter {
    snapshot: SharedSnapshot,
    timing: InterpreterTiming,
    rng: Mutex<StdRng>,
}

impl CommandInterpreter {
    pub fn new(snapshot: SharedSnapshot, timing: InterpreterTiming, rng: StdRng) -> Self {
        Self {
            snapshot,
            timing,
            rng: Mutex::new(rng),
        }
    }

    /// Uppercase and strip spaces and line terminators
    pub fn normalize(raw: &str) -> String {
        raw.chars()
            .filter(|c| !matches!(c, ' ' | '\r' | '\n' | '\t'))
            .collect::<String>()
            .to_ascii_uppercase()
    }

    fn with_rng<R>(&self, f: impl FnOnce(&mut StdRng) -> R) -> R {
        let mut guard = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    /// Process one raw request line and produce the response body.
    ///
    /// The caller appends the line terminator when writing to the wire.
    pub async fn process(&self, raw: &str) -> String {
        let command = Self::normalize(raw);

        let processing = self.with_rng(|rng| {
            let min = self.timing.processing_min;
            let max = self.timing.processing_max;
            if max > min {
                rng.gen_range(min..max)
            } else {
                min
            }
        });
        tokio::time::sleep(processing).await;

        if command.starts_with("AT") {
            return self.process_at(&command).await;
        }

        // Bare diagnostic modes carry no PID
        if matches!(command.as_str(), "03" | "04" | "07") {
            return self.process_obd(&command).await;
        }

        if command.len() >= 4 {
            return self.process_obd(&command).await;
        }

        UNKNOWN.to_string()
    }

    async fn process_at(&self, command: &str) -> String {
        if ACK_ONLY_COMMANDS.contains(&command) {
            return "OK".to_string();
        }
        match command {
            "ATZ" => {
                tokio::time::sleep(self.timing.reset_delay).await;
                format!("{ADAPTER_VERSION}\r>")
            }
            "ATWS" => format!("{ADAPTER_VERSION} Bluetooth Enhanced"),
            "ATRV" | "ATVD" => {
                let voltage = self.snapshot.with(|s| s.battery_voltage);
                format!("{voltage:.1}V")
            }
            "ATDP" => "AUTO, ISO 15765-4 (CAN 11/500)".to_string(),
            "ATDPN" => "A6".to_string(),
            "ATIGN" => {
                if self.snapshot.with(|s| s.engine_running()) {
                    "ON".to_string()
                } else {
                    "OFF".to_string()
                }
            }
            _ => UNKNOWN.to_string(),
        }
    }

    async fn process_obd(&self, command: &str) -> String {
        // Mode 04 mutates before encoding; every other request is a pure read
        if command == "04" {
            let cleared = self.snapshot.update(|s| s.diagnostics.clear_all());
            tracing::debug!(cleared, "trouble codes cleared by request");
        }

        let searching = self
            .with_rng(|rng| rng.gen_bool(self.timing.searching_probability));
        if searching {
            tokio::time::sleep(self.timing.search_delay).await;
            let body = self.snapshot.with(|s| encode_request(s, command));
            return format!("{SEARCHING_PREFIX}{body}");
        }

        self.snapshot.with(|s| encode_request(s, command))
    }
}
