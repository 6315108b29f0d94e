//! Vehicle telemetry model
//!
//! One mutable [`TelemetrySnapshot`] holds every simulated vehicle value.
//! The simulation tick loop is its single writer; protocol sessions and
//! external consumers read it through [`SharedSnapshot`].

pub mod simulator;

use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diagnostics::DiagnosticState;

/// Numeric regime the simulation runs in.
///
/// The electrical system, top speed, and fuel characteristics differ between
/// a 12 V passenger car and a 24 V heavy truck; everything else is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VehicleProfile {
    /// 12 V gasoline passenger car
    Car,
    /// 24 V diesel heavy truck (default)
    #[default]
    HeavyTruck,
}

impl VehicleProfile {
    /// Hard clamp applied to battery voltage every tick
    pub fn battery_clamp(&self) -> (f64, f64) {
        match self {
            VehicleProfile::Car => (9.0, 15.0),
            VehicleProfile::HeavyTruck => (18.0, 30.0),
        }
    }

    /// Alternator-charging band (engine above idle)
    pub fn charging_band(&self) -> (f64, f64) {
        match self {
            VehicleProfile::Car => (13.8, 14.4),
            VehicleProfile::HeavyTruck => (27.2, 28.0),
        }
    }

    /// Resting/idling battery band
    pub fn idle_band(&self) -> (f64, f64) {
        match self {
            VehicleProfile::Car => (12.4, 13.2),
            VehicleProfile::HeavyTruck => (24.0, 25.0),
        }
    }

    /// Low-voltage band used in critical mode
    pub fn critical_battery_band(&self) -> (f64, f64) {
        match self {
            VehicleProfile::Car => (10.5, 12.5),
            VehicleProfile::HeavyTruck => (18.0, 21.0),
        }
    }

    /// (low, high) thresholds that raise the system-voltage trouble codes
    pub fn battery_fault_thresholds(&self) -> (f64, f64) {
        match self {
            VehicleProfile::Car => (11.0, 15.0),
            VehicleProfile::HeavyTruck => (22.0, 28.0),
        }
    }

    /// Nominal battery voltage for the idle snapshot
    pub fn nominal_battery(&self) -> f64 {
        match self {
            VehicleProfile::Car => 12.6,
            VehicleProfile::HeavyTruck => 24.0,
        }
    }

    /// Top speed in km/h; also scales the RPM-to-speed target curve
    pub fn max_speed(&self) -> f64 {
        match self {
            VehicleProfile::Car => 150.0,
            VehicleProfile::HeavyTruck => 120.0,
        }
    }

    /// Baseline fuel consumption in L/100km
    pub fn base_consumption(&self) -> f64 {
        match self {
            VehicleProfile::Car => 8.0,
            VehicleProfile::HeavyTruck => 20.0,
        }
    }

    /// Clamp applied to the computed consumption rate
    pub fn consumption_clamp(&self) -> (f64, f64) {
        match self {
            VehicleProfile::Car => (5.0, 25.0),
            VehicleProfile::HeavyTruck => (15.0, 50.0),
        }
    }

    /// OBD-II fuel type byte (PID 51): 01 gasoline, 02 diesel
    pub fn fuel_type_byte(&self) -> u8 {
        match self {
            VehicleProfile::Car => 0x01,
            VehicleProfile::HeavyTruck => 0x02,
        }
    }
}

/// Fuel system status as reported by PID 03
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FuelSystemStatus {
    /// Open loop due to insufficient engine temperature
    OpenLoop,
    /// Closed loop, using oxygen sensor feedback
    #[default]
    ClosedLoop,
    /// Open loop due to driving conditions (e.g. power enrichment)
    OpenLoopDriving,
    /// Open loop due to detected system fault
    OpenLoopFault,
    /// Closed loop but with a fault in at least one oxygen sensor
    ClosedLoopFault,
}

impl FuelSystemStatus {
    /// Wire encoding for the PID 03 response byte
    pub fn encoding(&self) -> u8 {
        match self {
            FuelSystemStatus::OpenLoop => 0x01,
            FuelSystemStatus::ClosedLoop => 0x02,
            FuelSystemStatus::OpenLoopDriving => 0x04,
            FuelSystemStatus::OpenLoopFault => 0x08,
            FuelSystemStatus::ClosedLoopFault => 0x10,
        }
    }
}

impl fmt::Display for FuelSystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FuelSystemStatus::OpenLoop => "OPEN_LOOP",
            FuelSystemStatus::ClosedLoop => "CLOSED_LOOP",
            FuelSystemStatus::OpenLoopDriving => "OPEN_LOOP_DRIVE",
            FuelSystemStatus::OpenLoopFault => "OPEN_LOOP_FAULT",
            FuelSystemStatus::ClosedLoopFault => "CLOSED_LOOP_FAULT",
        };
        f.write_str(s)
    }
}

/// Point-in-time record of all simulated vehicle telemetry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Wall-clock time of the last update
    pub timestamp: DateTime<Utc>,
    /// Numeric regime this snapshot was generated under
    pub profile: VehicleProfile,

    // Engine
    /// Engine speed (RPM)
    pub engine_rpm: f64,
    /// Calculated engine load (%)
    pub engine_load: f64,
    /// Throttle position (%)
    pub throttle_position: f64,
    /// Seconds since engine start
    pub engine_run_time: u32,

    // Temperatures (°C)
    /// Coolant temperature
    pub coolant_temp: f64,
    /// Intake air temperature
    pub intake_air_temp: f64,
    /// Transmission fluid temperature
    pub transmission_temp: f64,

    // Pressures (kPa)
    /// Engine oil pressure
    pub oil_pressure: f64,
    /// Fuel pressure
    pub fuel_pressure: f64,
    /// Intake manifold absolute pressure
    pub manifold_pressure: f64,

    // Vehicle
    /// Road speed (km/h)
    pub vehicle_speed: f64,
    /// Current gear derived from speed
    pub current_gear: u8,
    /// Accumulated odometer distance (km)
    pub odometer_km: f64,

    // Fuel
    /// Consumption rate (L/100km)
    pub fuel_consumption: f64,
    /// Tank level (%)
    pub fuel_level: f64,
    /// Fuel system status
    pub fuel_system_status: FuelSystemStatus,

    // Sensors
    /// Oxygen sensor bank 1 (V)
    pub oxygen_sensor_1: f64,
    /// Oxygen sensor bank 2 (V)
    pub oxygen_sensor_2: f64,
    /// Control module / battery voltage (V)
    pub battery_voltage: f64,

    /// Diagnostic trouble code state
    pub diagnostics: DiagnosticState,
}

impl TelemetrySnapshot {
    /// Idle defaults for a freshly started vehicle
    pub fn new(profile: VehicleProfile) -> Self {
        Self {
            timestamp: Utc::now(),
            profile,
            engine_rpm: 900.0,
            engine_load: 5.0,
            throttle_position: 0.0,
            engine_run_time: 0,
            coolant_temp: 85.0,
            intake_air_temp: 25.0,
            transmission_temp: 90.0,
            oil_pressure: 450.0,
            fuel_pressure: 500.0,
            manifold_pressure: 30.0,
            vehicle_speed: 0.0,
            current_gear: 1,
            odometer_km: 125_000.0,
            fuel_consumption: profile.base_consumption(),
            fuel_level: 75.0,
            fuel_system_status: FuelSystemStatus::ClosedLoop,
            oxygen_sensor_1: 0.45,
            oxygen_sensor_2: 0.45,
            battery_voltage: profile.nominal_battery(),
            diagnostics: DiagnosticState::default(),
        }
    }

    /// Whether the engine counts as running (used by ATIGN)
    pub fn engine_running(&self) -> bool {
        self.engine_rpm > 500.0
    }
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self::new(VehicleProfile::default())
    }
}

/// Shared handle to the one live snapshot.
///
/// The tick loop is the only periodic writer; sessions take short read locks
/// when encoding a response. The mode-04 clear is the single write path from
/// a session loop and goes through [`SharedSnapshot::update`] as well, so all
/// cross-task access uses the same lock. Guards are never held across awaits.
#[derive(Clone)]
pub struct SharedSnapshot {
    inner: Arc<RwLock<TelemetrySnapshot>>,
}

impl SharedSnapshot {
    /// Wrap an initial snapshot
    pub fn new(snapshot: TelemetrySnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(snapshot)),
        }
    }

    /// Clone out the current snapshot
    pub fn read(&self) -> TelemetrySnapshot {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Run a closure against the current snapshot without cloning
    pub fn with<R>(&self, f: impl FnOnce(&TelemetrySnapshot) -> R) -> R {
        let guard = self
            .inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&guard)
    }

    /// Mutate the snapshot under the write lock
    pub fn update<R>(&self, f: impl FnOnce(&mut TelemetrySnapshot) -> R) -> R {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

impl Default for SharedSnapshot {
    fn default() -> Self {
        Self::new(TelemetrySnapshot::default())
    }
}
