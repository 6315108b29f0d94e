//! Telemetry simulation engine
//!
//! Advances the shared snapshot once per tick (100 ms by default) with
//! bounded stochastic formulas. Three mutually exclusive modes: normal,
//! critical (fault injection), and manual override; DTC generation is an
//! independent fourth switch. All noise comes from one explicit `StdRng`
//! owned by the tick loop so a seeded config reproduces runs exactly.

use std::f64::consts::PI;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Timelike, Utc};
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::EmulatorConfig;
use crate::diagnostics;
use crate::events::{EmulatorEvent, EventBus};
use crate::telemetry::{FuelSystemStatus, SharedSnapshot, TelemetrySnapshot};

/// Manual RPM requests are floored at a realistic idle
pub const MANUAL_RPM_FLOOR: f64 = 1000.0;

/// DTC-mode random generation runs every this many ticks (5 s at 100 ms)
const DTC_RANDOM_TICKS: u64 = 50;
/// Condition-driven DTC rules are evaluated at this coarse interval
const DTC_CHECK_INTERVAL: Duration = Duration::from_secs(30);
/// Minimum spacing between two generated condition/random codes
const DTC_GENERATION_COOLDOWN: Duration = Duration::from_secs(300);

/// Operator-controlled simulation switches
#[derive(Debug, Clone)]
pub struct SimulationModes {
    /// Fault injection: abnormal RPM/temperature/pressure/voltage bands
    pub critical: bool,
    /// Periodic random DTC generation, independent of the other modes
    pub dtc_generation: bool,
    /// Operator-forced RPM/temperature/speed
    pub manual: bool,
    /// Forced RPM (floored at [`MANUAL_RPM_FLOOR`])
    pub manual_rpm: f64,
    /// Forced coolant temperature (°C)
    pub manual_temp: f64,
    /// Forced road speed (km/h)
    pub manual_speed: f64,
}

impl Default for SimulationModes {
    fn default() -> Self {
        Self {
            critical: false,
            dtc_generation: false,
            manual: false,
            manual_rpm: 800.0,
            manual_temp: 85.0,
            manual_speed: 0.0,
        }
    }
}

/// Advance the snapshot by one tick.
///
/// `dt` is the tick duration, `elapsed` the time since simulation start.
/// Exposed so tests can drive the update functions directly with arbitrary
/// prior states and tick counts.
pub fn step<R: Rng>(
    snapshot: &mut TelemetrySnapshot,
    modes: &SimulationModes,
    rng: &mut R,
    dt: Duration,
    elapsed: Duration,
) {
    snapshot.timestamp = Utc::now();
    snapshot.engine_run_time = elapsed.as_secs() as u32;

    let t = elapsed.as_secs_f64();
    update_engine(snapshot, modes, rng, t);
    update_temperatures(snapshot, modes, rng);
    update_pressures(snapshot, modes, rng);
    update_vehicle(snapshot, modes, rng, dt);
    update_fuel(snapshot, modes, dt);
    update_oxygen_sensors(snapshot, rng, t);
    update_electrical(snapshot, modes, rng);
}

fn update_engine<R: Rng>(snap: &mut TelemetrySnapshot, modes: &SimulationModes, rng: &mut R, t: f64) {
    let max_speed = snap.profile.max_speed();

    snap.engine_rpm = if modes.manual {
        modes.manual_rpm.max(MANUAL_RPM_FLOOR)
    } else if modes.critical {
        // Erratic: stalls or overrevs
        if rng.gen_bool(0.5) {
            rng.gen_range(0.0..400.0)
        } else {
            rng.gen_range(3200.0..3800.0)
        }
    } else {
        let mut base = 600.0 + (t * PI).sin() * 50.0;
        if snap.vehicle_speed > 5.0 {
            base = 1000.0 + snap.vehicle_speed / max_speed * 1500.0;
        }
        (base + rng.gen_range(-50.0..50.0)).clamp(500.0, 3500.0)
    };

    let rpm_factor = ((snap.engine_rpm - 600.0) / 2400.0).max(0.0);
    let speed_factor = snap.vehicle_speed / max_speed;

    snap.engine_load = if modes.critical {
        rng.gen::<f64>() * 100.0
    } else {
        (rpm_factor * 60.0 + speed_factor * 40.0 + rng.gen_range(-10.0..10.0)).clamp(0.0, 100.0)
    };

    snap.throttle_position =
        (snap.engine_load * 0.8 + rng.gen_range(0.0..10.0)).clamp(0.0, 100.0);
}

fn update_temperatures<R: Rng>(snap: &mut TelemetrySnapshot, modes: &SimulationModes, rng: &mut R) {
    if modes.manual {
        snap.coolant_temp = modes.manual_temp;
    } else if modes.critical {
        // Stuck-cold thermostat or overheating
        snap.coolant_temp = if rng.gen_bool(0.5) {
            rng.gen_range(30.0..45.0)
        } else {
            rng.gen_range(125.0..145.0)
        };
    } else {
        let target = 85.0 + snap.engine_load / 100.0 * 15.0;
        snap.coolant_temp += (target - snap.coolant_temp) * 0.1;
        snap.coolant_temp += rng.gen_range(-2.0..2.0);
        snap.coolant_temp = snap.coolant_temp.clamp(60.0, 110.0);
    }

    let ambient = 25.0 + (Utc::now().hour() as f64 / 24.0 * 2.0 * PI).sin() * 10.0;
    snap.intake_air_temp =
        (ambient + snap.engine_load / 100.0 * 20.0 + rng.gen_range(0.0..5.0)).clamp(10.0, 70.0);
    snap.transmission_temp =
        (80.0 + snap.engine_load / 100.0 * 30.0 + rng.gen_range(0.0..10.0)).clamp(70.0, 130.0);
}

fn update_pressures<R: Rng>(snap: &mut TelemetrySnapshot, modes: &SimulationModes, rng: &mut R) {
    snap.oil_pressure = if modes.critical {
        rng.gen_range(50.0..90.0)
    } else {
        let rpm_factor = snap.engine_rpm / 3000.0;
        (250.0 + rpm_factor * 250.0 + rng.gen_range(0.0..50.0)).clamp(150.0, 600.0)
    };

    snap.fuel_pressure = if modes.critical {
        rng.gen_range(100.0..180.0)
    } else {
        (400.0 + snap.engine_load / 100.0 * 200.0 + rng.gen_range(0.0..50.0)).clamp(300.0, 700.0)
    };

    snap.manifold_pressure = if snap.engine_rpm < 800.0 {
        // Vacuum at idle
        20.0 + rng.gen_range(0.0..10.0)
    } else {
        let load_factor = snap.throttle_position / 100.0;
        (30.0 + load_factor * 70.0 + rng.gen_range(0.0..10.0)).clamp(15.0, 100.0)
    };
}

fn update_vehicle<R: Rng>(
    snap: &mut TelemetrySnapshot,
    modes: &SimulationModes,
    rng: &mut R,
    dt: Duration,
) {
    let max_speed = snap.profile.max_speed();

    if modes.manual {
        snap.vehicle_speed = modes.manual_speed.clamp(0.0, max_speed);
    } else {
        if snap.engine_rpm < 700.0 {
            snap.vehicle_speed = (snap.vehicle_speed - 2.0).max(0.0);
        } else {
            let target = (snap.engine_rpm - 600.0) / 2400.0 * max_speed;
            snap.vehicle_speed += (target - snap.vehicle_speed) * 0.1;
            snap.vehicle_speed += rng.gen_range(-2.0..2.0);
        }
        snap.vehicle_speed = snap.vehicle_speed.clamp(0.0, max_speed);
    }

    if snap.vehicle_speed > 1.0 {
        snap.odometer_km += snap.vehicle_speed * dt.as_secs_f64() / 3600.0;
    }

    snap.current_gear = gear_for_speed(snap.vehicle_speed);
}

/// Discrete gear from road speed via an ordered threshold table
pub fn gear_for_speed(speed: f64) -> u8 {
    match speed {
        s if s < 5.0 => 1,
        s if s < 15.0 => 2,
        s if s < 30.0 => 3,
        s if s < 50.0 => 4,
        s if s < 70.0 => 5,
        _ => 6,
    }
}

fn update_fuel(snap: &mut TelemetrySnapshot, modes: &SimulationModes, dt: Duration) {
    let (lo, hi) = snap.profile.consumption_clamp();
    let load_factor = snap.engine_load / 100.0;
    let rpm_factor = ((snap.engine_rpm - 600.0) / 2400.0).max(0.0);

    snap.fuel_consumption =
        (snap.profile.base_consumption() + load_factor * 15.0 + rpm_factor * 10.0).clamp(lo, hi);

    if snap.vehicle_speed > 1.0 {
        let per_tick = snap.fuel_consumption / 100_000.0 * (dt.as_secs_f64() / 0.1);
        snap.fuel_level = (snap.fuel_level - per_tick * snap.vehicle_speed).max(0.0);
    }

    snap.fuel_system_status = if snap.fuel_level < 10.0 {
        FuelSystemStatus::OpenLoopFault
    } else if snap.coolant_temp < 70.0 {
        FuelSystemStatus::OpenLoop
    } else if modes.critical {
        FuelSystemStatus::ClosedLoopFault
    } else {
        FuelSystemStatus::ClosedLoop
    };
}

fn update_oxygen_sensors<R: Rng>(snap: &mut TelemetrySnapshot, rng: &mut R, t: f64) {
    if snap.fuel_system_status == FuelSystemStatus::ClosedLoop {
        // Oscillation around stoichiometric voltage, banks out of phase
        snap.oxygen_sensor_1 = 0.45 + (t * 10.0).sin() * 0.3;
        snap.oxygen_sensor_2 = 0.45 + (t * 10.0 + 5.0).sin() * 0.3;
    } else {
        snap.oxygen_sensor_1 = 0.1 + rng.gen::<f64>() * 0.8;
        snap.oxygen_sensor_2 = 0.1 + rng.gen::<f64>() * 0.8;
    }

    snap.oxygen_sensor_1 = snap.oxygen_sensor_1.clamp(0.1, 0.9);
    snap.oxygen_sensor_2 = snap.oxygen_sensor_2.clamp(0.1, 0.9);
}

fn update_electrical<R: Rng>(snap: &mut TelemetrySnapshot, modes: &SimulationModes, rng: &mut R) {
    let profile = snap.profile;
    let band = if modes.critical {
        profile.critical_battery_band()
    } else if snap.engine_rpm > 1000.0 {
        profile.charging_band()
    } else {
        profile.idle_band()
    };
    let (clamp_lo, clamp_hi) = profile.battery_clamp();
    snap.battery_voltage = rng.gen_range(band.0..band.1).clamp(clamp_lo, clamp_hi);
}

/// Owns the tick loop and the operator mode switches
pub struct TelemetrySimulator {
    shared: SharedSnapshot,
    events: EventBus,
    modes: Arc<Mutex<SimulationModes>>,
    config: EmulatorConfig,
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl TelemetrySimulator {
    /// Create a stopped simulator over the shared snapshot
    pub fn new(shared: SharedSnapshot, events: EventBus, config: EmulatorConfig) -> Self {
        Self {
            shared,
            events,
            modes: Arc::new(Mutex::new(SimulationModes::default())),
            config,
            cancel: None,
            handle: None,
        }
    }

    fn with_modes(&self, f: impl FnOnce(&mut SimulationModes)) {
        let mut guard = self
            .modes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard);
    }

    /// Current mode switches
    pub fn modes(&self) -> SimulationModes {
        self.modes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Toggle fault-injection mode
    pub fn set_critical_mode(&self, on: bool) {
        self.with_modes(|m| m.critical = on);
    }

    /// Toggle random DTC generation
    pub fn set_dtc_mode(&self, on: bool) {
        self.with_modes(|m| m.dtc_generation = on);
    }

    /// Toggle operator override of RPM/temperature/speed
    pub fn set_manual_mode(&self, on: bool) {
        self.with_modes(|m| m.manual = on);
    }

    /// Force an RPM value for manual mode
    pub fn set_manual_rpm(&self, rpm: f64) {
        self.with_modes(|m| m.manual_rpm = rpm);
    }

    /// Force a coolant temperature for manual mode
    pub fn set_manual_temperature(&self, temp: f64) {
        self.with_modes(|m| m.manual_temp = temp);
    }

    /// Force a road speed for manual mode
    pub fn set_manual_speed(&self, speed: f64) {
        self.with_modes(|m| m.manual_speed = speed);
    }

    /// Whether the tick loop is running
    pub fn is_running(&self) -> bool {
        self.cancel.is_some()
    }

    /// Spawn the tick loop; no-op when already running
    pub fn start(&mut self) {
        if self.cancel.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_tick_loop(
            self.shared.clone(),
            self.events.clone(),
            Arc::clone(&self.modes),
            Duration::from_millis(self.config.tick_interval_ms),
            self.config.clone(),
            cancel.clone(),
        ));
        self.cancel = Some(cancel);
        self.handle = Some(handle);
        self.events.log("telemetry simulation started");
    }

    /// Stop the tick loop and wait for it to exit
    pub async fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        self.events.log("telemetry simulation stopped");
    }
}

async fn run_tick_loop(
    shared: SharedSnapshot,
    events: EventBus,
    modes: Arc<Mutex<SimulationModes>>,
    tick: Duration,
    config: EmulatorConfig,
    cancel: CancellationToken,
) {
    let mut rng = config.rng(0);
    let start = Instant::now();
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut tick_count: u64 = 0;
    let mut last_check = Instant::now();
    let mut last_generation: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        tick_count += 1;

        let modes = modes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        let snapshot = shared.update(|snap| {
            step(snap, &modes, &mut rng, tick, start.elapsed());

            if modes.dtc_generation && tick_count % DTC_RANDOM_TICKS == 0 {
                if rng.gen_bool(0.3) {
                    snap.diagnostics.add_random(&mut rng);
                }
                if rng.gen_bool(0.2) {
                    snap.diagnostics.promote_pending(&mut rng);
                }
            }

            if last_check.elapsed() >= DTC_CHECK_INTERVAL {
                last_check = Instant::now();
                snap.diagnostics.promote_pending(&mut rng);

                let cooled_down = last_generation
                    .map_or(true, |at| at.elapsed() >= DTC_GENERATION_COOLDOWN);
                if cooled_down {
                    let candidates = diagnostics::condition_codes(snap);
                    if !candidates.is_empty() {
                        let code = candidates[rng.gen_range(0..candidates.len())];
                        snap.diagnostics.add_if_absent(code, &mut rng);
                        last_generation = Some(Instant::now());
                    } else if rng.gen_bool(0.15) {
                        snap.diagnostics.add_random(&mut rng);
                        last_generation = Some(Instant::now());
                    }
                }

                if rng.gen_bool(0.05) {
                    snap.diagnostics.clear_some(&mut rng);
                }
            }

            snap.clone()
        });

        events.emit(EmulatorEvent::TelemetryUpdated(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::VehicleProfile;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tick(snap: &mut TelemetrySnapshot, modes: &SimulationModes, rng: &mut StdRng, n: u32) {
        let dt = Duration::from_millis(100);
        for i in 0..n {
            step(snap, modes, rng, dt, dt * (i + 1));
        }
    }

    #[test]
    fn test_normal_mode_stays_in_clamps() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut snap = TelemetrySnapshot::new(VehicleProfile::HeavyTruck);
        let modes = SimulationModes::default();
        let (batt_lo, batt_hi) = snap.profile.battery_clamp();

        for _ in 0..1000 {
            tick(&mut snap, &modes, &mut rng, 1);
            assert!((0.0..=3800.0).contains(&snap.engine_rpm), "rpm {}", snap.engine_rpm);
            assert!((60.0..=150.0).contains(&snap.coolant_temp));
            assert!((0.0..=100.0).contains(&snap.engine_load));
            assert!((0.0..=100.0).contains(&snap.throttle_position));
            assert!((0.0..=100.0).contains(&snap.fuel_level));
            assert!((batt_lo..=batt_hi).contains(&snap.battery_voltage));
            assert!((0.1..=0.9).contains(&snap.oxygen_sensor_1));
            assert!(snap.vehicle_speed >= 0.0 && snap.vehicle_speed <= snap.profile.max_speed());
        }
    }

    #[test]
    fn test_critical_mode_bands() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut snap = TelemetrySnapshot::new(VehicleProfile::HeavyTruck);
        let modes = SimulationModes {
            critical: true,
            ..Default::default()
        };
        let (crit_lo, crit_hi) = snap.profile.critical_battery_band();

        for _ in 0..500 {
            tick(&mut snap, &modes, &mut rng, 1);
            let rpm = snap.engine_rpm;
            assert!(
                (0.0..400.0).contains(&rpm) || (3200.0..3800.0).contains(&rpm),
                "rpm {rpm} outside critical bands"
            );
            let temp = snap.coolant_temp;
            assert!(
                (30.0..45.0).contains(&temp) || (125.0..145.0).contains(&temp),
                "coolant {temp} outside critical bands"
            );
            assert!((crit_lo..crit_hi).contains(&snap.battery_voltage));
        }
    }

    #[test]
    fn test_manual_mode_floors_rpm() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut snap = TelemetrySnapshot::new(VehicleProfile::HeavyTruck);
        let modes = SimulationModes {
            manual: true,
            manual_rpm: 300.0,
            manual_temp: 95.0,
            manual_speed: 40.0,
            ..Default::default()
        };
        tick(&mut snap, &modes, &mut rng, 10);
        assert_eq!(snap.engine_rpm, MANUAL_RPM_FLOOR);
        assert_eq!(snap.coolant_temp, 95.0);
        assert_eq!(snap.vehicle_speed, 40.0);
        assert_eq!(snap.current_gear, 4);
    }

    #[test]
    fn test_fuel_level_decreases_while_driving() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut snap = TelemetrySnapshot::new(VehicleProfile::HeavyTruck);
        let modes = SimulationModes {
            manual: true,
            manual_rpm: 2500.0,
            manual_speed: 80.0,
            ..Default::default()
        };
        let before = snap.fuel_level;
        let odo_before = snap.odometer_km;
        tick(&mut snap, &modes, &mut rng, 100);
        assert!(snap.fuel_level < before);
        assert!(snap.fuel_level >= 0.0);
        assert!(snap.odometer_km > odo_before);
    }

    #[test]
    fn test_gear_thresholds() {
        assert_eq!(gear_for_speed(0.0), 1);
        assert_eq!(gear_for_speed(4.9), 1);
        assert_eq!(gear_for_speed(5.0), 2);
        assert_eq!(gear_for_speed(14.9), 2);
        assert_eq!(gear_for_speed(29.9), 3);
        assert_eq!(gear_for_speed(49.9), 4);
        assert_eq!(gear_for_speed(69.9), 5);
        assert_eq!(gear_for_speed(120.0), 6);
    }

    #[test]
    fn test_run_time_tracks_elapsed() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut snap = TelemetrySnapshot::new(VehicleProfile::Car);
        let modes = SimulationModes::default();
        step(
            &mut snap,
            &modes,
            &mut rng,
            Duration::from_millis(100),
            Duration::from_secs(42),
        );
        assert_eq!(snap.engine_run_time, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_loop_publishes_updates_and_stops() {
        let shared = SharedSnapshot::default();
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let config = EmulatorConfig {
            rng_seed: Some(1),
            ..Default::default()
        };
        let mut sim = TelemetrySimulator::new(shared.clone(), events, config);
        sim.start();
        assert!(sim.is_running());

        let mut updates = 0;
        while updates < 5 {
            if let EmulatorEvent::TelemetryUpdated(_) = rx.recv().await.unwrap() {
                updates += 1;
            }
        }

        sim.stop().await;
        assert!(!sim.is_running());
    }
}
