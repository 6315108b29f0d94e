//! Long-run telemetry invariants across modes and profiles

use std::time::Duration;

use obdsim_core::telemetry::simulator::{step, SimulationModes};
use obdsim_core::telemetry::{TelemetrySnapshot, VehicleProfile};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const TICK: Duration = Duration::from_millis(100);

fn run(snap: &mut TelemetrySnapshot, modes: &SimulationModes, rng: &mut StdRng, ticks: u32) {
    for i in 0..ticks {
        step(snap, modes, rng, TICK, TICK * (i + 1));
    }
}

fn assert_in_contract(snap: &TelemetrySnapshot) {
    let (batt_lo, batt_hi) = snap.profile.battery_clamp();
    let (cons_lo, cons_hi) = snap.profile.consumption_clamp();

    assert!((0.0..=100.0).contains(&snap.engine_load));
    assert!((0.0..=100.0).contains(&snap.throttle_position));
    assert!((0.0..=100.0).contains(&snap.fuel_level));
    assert!((10.0..=70.0).contains(&snap.intake_air_temp));
    assert!((70.0..=130.0).contains(&snap.transmission_temp));
    assert!((15.0..=100.0).contains(&snap.manifold_pressure) || snap.engine_rpm < 800.0);
    assert!((batt_lo..=batt_hi).contains(&snap.battery_voltage));
    assert!((cons_lo..=cons_hi).contains(&snap.fuel_consumption));
    assert!((0.1..=0.9).contains(&snap.oxygen_sensor_1));
    assert!((0.1..=0.9).contains(&snap.oxygen_sensor_2));
    assert!(snap.vehicle_speed >= 0.0);
    assert!(snap.vehicle_speed <= snap.profile.max_speed());
    assert!((1..=6).contains(&snap.current_gear));
}

#[test]
fn test_contract_holds_over_long_normal_run() {
    for profile in [VehicleProfile::Car, VehicleProfile::HeavyTruck] {
        let mut rng = StdRng::seed_from_u64(17);
        let mut snap = TelemetrySnapshot::new(profile);
        let modes = SimulationModes::default();
        for i in 0..5000u32 {
            step(&mut snap, &modes, &mut rng, TICK, TICK * (i + 1));
            assert_in_contract(&snap);
        }
    }
}

#[test]
fn test_contract_holds_under_critical_mode() {
    let mut rng = StdRng::seed_from_u64(23);
    let mut snap = TelemetrySnapshot::new(VehicleProfile::HeavyTruck);
    let modes = SimulationModes {
        critical: true,
        ..Default::default()
    };
    for i in 0..2000u32 {
        step(&mut snap, &modes, &mut rng, TICK, TICK * (i + 1));
        // Critical RPM and coolant leave the normal clamps on purpose;
        // everything else keeps its contract
        assert_in_contract(&snap);
    }
}

#[test]
fn test_contract_holds_from_randomized_states() {
    // Survive arbitrary (even inconsistent) prior states in one step
    let mut rng = StdRng::seed_from_u64(31);
    for _ in 0..500 {
        let mut snap = TelemetrySnapshot::new(VehicleProfile::HeavyTruck);
        snap.engine_rpm = rng.gen_range(0.0..5000.0);
        snap.vehicle_speed = rng.gen_range(0.0..120.0);
        snap.coolant_temp = rng.gen_range(-10.0..150.0);
        snap.engine_load = rng.gen_range(0.0..100.0);
        snap.fuel_level = rng.gen_range(0.0..100.0);

        let modes = SimulationModes::default();
        run(&mut snap, &modes, &mut rng, 3);
        assert_in_contract(&snap);
    }
}

#[test]
fn test_mode_switches_do_not_break_contract() {
    let mut rng = StdRng::seed_from_u64(41);
    let mut snap = TelemetrySnapshot::new(VehicleProfile::HeavyTruck);
    let mut modes = SimulationModes::default();

    for round in 0..50 {
        modes.critical = round % 3 == 0;
        modes.manual = round % 3 == 1;
        modes.manual_rpm = rng.gen_range(0.0..4000.0);
        modes.manual_speed = rng.gen_range(0.0..200.0);
        modes.manual_temp = rng.gen_range(20.0..140.0);
        run(&mut snap, &modes, &mut rng, 20);

        assert!((0.0..=100.0).contains(&snap.engine_load));
        assert!((0.0..=100.0).contains(&snap.fuel_level));
        assert!(snap.vehicle_speed <= snap.profile.max_speed());
        if modes.manual {
            assert!(snap.engine_rpm >= 1000.0);
        }
    }
}

#[test]
fn test_speed_follows_rpm() {
    let mut rng = StdRng::seed_from_u64(53);
    let mut snap = TelemetrySnapshot::new(VehicleProfile::HeavyTruck);

    // Hold high RPM via manual mode, then release and let the engine idle
    let driving = SimulationModes {
        manual: true,
        manual_rpm: 3000.0,
        manual_speed: 90.0,
        ..Default::default()
    };
    run(&mut snap, &driving, &mut rng, 50);
    assert!(snap.vehicle_speed > 50.0);
    assert!(snap.current_gear >= 5);

    // Back to automatic low-RPM operation: speed bleeds off
    let idle = SimulationModes::default();
    let speed_before = snap.vehicle_speed;
    run(&mut snap, &idle, &mut rng, 300);
    assert!(snap.vehicle_speed < speed_before);
}

#[test]
fn test_odometer_monotonic() {
    let mut rng = StdRng::seed_from_u64(61);
    let mut snap = TelemetrySnapshot::new(VehicleProfile::HeavyTruck);
    let modes = SimulationModes {
        manual: true,
        manual_rpm: 2000.0,
        manual_speed: 60.0,
        ..Default::default()
    };
    let mut last = snap.odometer_km;
    for i in 0..100u32 {
        step(&mut snap, &modes, &mut rng, TICK, TICK * (i + 1));
        assert!(snap.odometer_km >= last);
        last = snap.odometer_km;
    }
    // 60 km/h for 10 s is about 1/6 km
    assert!((snap.odometer_km - 125_000.0 - 60.0 * 10.0 / 3600.0).abs() < 0.01);
}

#[test]
fn test_fuel_never_negative_even_when_empty() {
    let mut rng = StdRng::seed_from_u64(71);
    let mut snap = TelemetrySnapshot::new(VehicleProfile::HeavyTruck);
    snap.fuel_level = 0.05;
    let modes = SimulationModes {
        manual: true,
        manual_rpm: 3000.0,
        manual_speed: 100.0,
        ..Default::default()
    };
    run(&mut snap, &modes, &mut rng, 2000);
    assert_eq!(snap.fuel_level, 0.0);
}

#[test]
fn test_seeded_runs_are_reproducible() {
    let run_once = || {
        let mut rng = StdRng::seed_from_u64(99);
        let mut snap = TelemetrySnapshot::new(VehicleProfile::HeavyTruck);
        let modes = SimulationModes::default();
        run(&mut snap, &modes, &mut rng, 200);
        (snap.engine_rpm, snap.vehicle_speed, snap.battery_voltage)
    };
    assert_eq!(run_once(), run_once());
}
