//! Diagnostic trouble code lifecycle
//!
//! Codes move between three states: absent, pending, and active. Generation
//! is either condition-driven (an out-of-range telemetry value nominates a
//! specific code) or random from the catalog; promotion and repair are
//! probabilistic. Mode 04 empties both sets unconditionally.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::telemetry::TelemetrySnapshot;

/// Fault catalog drawn from when generating random codes
pub const DTC_CATALOG: [&str; 16] = [
    "P0300", // Random/multiple cylinder misfire
    "P0171", // System too lean (bank 1)
    "P0172", // System too rich (bank 1)
    "P0101", // Mass air flow circuit range/performance
    "P0113", // Intake air temperature circuit high input
    "P0118", // Engine coolant temperature circuit high input
    "P0201", // Injector circuit malfunction, cylinder 1
    "P0325", // Knock sensor 1 circuit malfunction
    "P0340", // Camshaft position sensor circuit malfunction
    "P0401", // EGR flow insufficient
    "P0420", // Catalyst system efficiency below threshold
    "P0505", // Idle control system malfunction
    "P0562", // System voltage low
    "P0563", // System voltage high
    "P0602", // Control module programming error
    "P2146", // Fuel injector group A supply voltage circuit open
];

/// Chance that a new code enters `pending` rather than going straight active
const PENDING_FIRST_PROBABILITY: f64 = 0.7;
/// Per-code promotion chance at each periodic check
const PROMOTION_PROBABILITY: f64 = 0.3;

/// Pending and active trouble code sets.
///
/// Invariant: a code appears in at most one of the two lists, never both,
/// and never twice within one list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticState {
    /// Codes detected but not yet confirmed (mode 07)
    pub pending: Vec<String>,
    /// Confirmed codes (mode 03)
    pub active: Vec<String>,
}

impl DiagnosticState {
    /// Populate a fresh vehicle with pre-existing faults: 30% of vehicles
    /// start with one or two codes, each 60% likely to still be pending.
    pub fn initial<R: Rng>(rng: &mut R) -> Self {
        let mut state = Self::default();
        if rng.gen_bool(0.3) {
            let count = rng.gen_range(1..3);
            for _ in 0..count {
                let code = DTC_CATALOG[rng.gen_range(0..DTC_CATALOG.len())];
                if !state.contains(code) {
                    if rng.gen_bool(0.6) {
                        state.pending.push(code.to_string());
                    } else {
                        state.active.push(code.to_string());
                    }
                }
            }
        }
        state
    }

    /// Whether the code is present in either set
    pub fn contains(&self, code: &str) -> bool {
        self.pending.iter().any(|c| c == code) || self.active.iter().any(|c| c == code)
    }

    /// Total code count across both sets
    pub fn total(&self) -> usize {
        self.pending.len() + self.active.len()
    }

    /// Add a code unless it already exists; 70% enter pending, 30% active.
    /// Returns true when the code was added.
    pub fn add_if_absent<R: Rng>(&mut self, code: &str, rng: &mut R) -> bool {
        if self.contains(code) {
            return false;
        }
        if rng.gen_bool(PENDING_FIRST_PROBABILITY) {
            self.pending.push(code.to_string());
            tracing::debug!(code, "pending DTC added");
        } else {
            self.active.push(code.to_string());
            tracing::debug!(code, "active DTC added");
        }
        true
    }

    /// Add a random catalog code (see [`DiagnosticState::add_if_absent`])
    pub fn add_random<R: Rng>(&mut self, rng: &mut R) -> bool {
        let code = DTC_CATALOG[rng.gen_range(0..DTC_CATALOG.len())];
        self.add_if_absent(code, rng)
    }

    /// Force a code into a specific set, for tests and the control surface
    pub fn force_add(&mut self, code: &str, active: bool) {
        if self.contains(code) {
            return;
        }
        if active {
            self.active.push(code.to_string());
        } else {
            self.pending.push(code.to_string());
        }
    }

    /// Independently promote each pending code to active with 30% chance
    pub fn promote_pending<R: Rng>(&mut self, rng: &mut R) {
        let mut i = 0;
        while i < self.pending.len() {
            if rng.gen_bool(PROMOTION_PROBABILITY) {
                let code = self.pending.remove(i);
                if !self.active.contains(&code) {
                    tracing::debug!(code, "DTC promoted to active");
                    self.active.push(code);
                }
            } else {
                i += 1;
            }
        }
    }

    /// Simulate a repair: remove the oldest pending code with 50% chance and
    /// the oldest active code with 30% chance
    pub fn clear_some<R: Rng>(&mut self, rng: &mut R) {
        if !self.pending.is_empty() && rng.gen_bool(0.5) {
            let code = self.pending.remove(0);
            tracing::debug!(code, "pending DTC cleared");
        }
        if !self.active.is_empty() && rng.gen_bool(0.3) {
            let code = self.active.remove(0);
            tracing::debug!(code, "active DTC cleared");
        }
    }

    /// Empty both sets; returns how many codes were removed
    pub fn clear_all(&mut self) -> usize {
        let cleared = self.total();
        self.pending.clear();
        self.active.clear();
        if cleared > 0 {
            tracing::info!(cleared, "all DTCs cleared");
        }
        cleared
    }
}

/// Codes nominated by out-of-range telemetry values
pub fn condition_codes(snapshot: &TelemetrySnapshot) -> Vec<&'static str> {
    let mut codes = Vec::new();
    let (volt_low, volt_high) = snapshot.profile.battery_fault_thresholds();

    if snapshot.coolant_temp > 110.0 {
        codes.push("P0118");
    }
    if snapshot.battery_voltage < volt_low {
        codes.push("P0562");
    } else if snapshot.battery_voltage > volt_high {
        codes.push("P0563");
    }
    if snapshot.intake_air_temp > 60.0 {
        codes.push("P0113");
    }
    if snapshot.engine_load > 90.0 {
        codes.push("P0300");
    }
    if snapshot.fuel_level < 10.0 {
        codes.push("P0171");
    }
    codes
}

/// Encode a DTC string into its two wire bytes.
///
/// The top two bits of the first byte carry the system letter (00=P, 01=C,
/// 10=B, 11=U); the remaining 6 bits and the second byte carry the numeric
/// part. Malformed codes encode as zero bytes.
pub fn encode_dtc(code: &str) -> (u8, u8) {
    if code.len() != 5 {
        return (0, 0);
    }
    let mut chars = code.chars();
    let first = match chars.next() {
        Some('P') => 0x00u16,
        Some('C') => 0x40,
        Some('B') => 0x80,
        Some('U') => 0xC0,
        _ => return (0, 0),
    };
    match code[1..].parse::<u16>() {
        Ok(number) => {
            let high = first | ((number >> 8) & 0x3F);
            let low = number & 0xFF;
            (high as u8, low as u8)
        }
        Err(_) => (0, 0),
    }
}
