//! Device discovery
//!
//! Enumerates real host serial ports first; when none exist the scan
//! synthesizes a plausible set of nearby adapters so the rest of the stack
//! can be exercised without hardware. Synthetic discovery is incremental,
//! devices trickle in over a few scan steps.

use std::time::Duration;

use rand::Rng;
use tokio::time::timeout;

use crate::events::{EmulatorEvent, EventBus};
use crate::transport::device::Device;
use crate::transport::serial;

/// Names drawn from when synthesizing nearby devices
pub const SIMULATED_DEVICE_NAMES: [&str; 10] = [
    "OBD-II Scanner",
    "ELM327 Bluetooth",
    "Torque Pro",
    "Car Diagnostic",
    "OBDII Reader",
    "Bluetooth OBD",
    "Scanner Tool",
    "Vehicle Monitor",
    "Auto Scanner",
    "Diagnostic Tool",
];

/// Tunable scan pacing; tests shrink the delays to zero
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Hard cap on the real-port enumeration
    pub scan_timeout: Duration,
    /// Number of synthetic scan steps
    pub synthetic_steps: u32,
    /// Pause between synthetic scan steps
    pub step_delay: Duration,
    /// Chance that a step surfaces a device
    pub appearance_probability: f64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            scan_timeout: Duration::from_secs(15),
            synthetic_steps: 5,
            step_delay: Duration::from_millis(500),
            appearance_probability: 0.7,
        }
    }
}

/// Run one discovery cycle and emit the result on the bus
pub async fn discover<R: Rng>(
    config: &DiscoveryConfig,
    events: &EventBus,
    rng: &mut R,
) -> Vec<Device> {
    events.log("scanning for devices");

    let real = timeout(config.scan_timeout, tokio::task::spawn_blocking(serial::list_ports)).await;
    let mut devices: Vec<Device> = match real {
        Ok(Ok(ports)) => ports
            .iter()
            .map(|p| Device::from_port(&p.name))
            .collect(),
        Ok(Err(join_err)) => {
            tracing::warn!("port enumeration task failed: {join_err}");
            Vec::new()
        }
        Err(_) => {
            tracing::warn!("port enumeration timed out");
            Vec::new()
        }
    };

    if devices.is_empty() {
        devices = discover_synthetic(config, events, rng).await;
    } else {
        events.log(format!("found {} serial port(s)", devices.len()));
    }

    events.emit(EmulatorEvent::DevicesDiscovered(devices.clone()));
    devices
}

async fn discover_synthetic<R: Rng>(
    config: &DiscoveryConfig,
    events: &EventBus,
    rng: &mut R,
) -> Vec<Device> {
    events.log("no serial ports found, simulating nearby devices");
    let mut devices: Vec<Device> = Vec::new();

    for _ in 0..config.synthetic_steps {
        tokio::time::sleep(config.step_delay).await;
        if !rng.gen_bool(config.appearance_probability) {
            continue;
        }
        let name = SIMULATED_DEVICE_NAMES[rng.gen_range(0..SIMULATED_DEVICE_NAMES.len())];
        let device = Device::synthetic(name, rng);
        if devices.iter().any(|d| d.address == device.address) {
            continue;
        }
        events.log(format!("device found: {device}"));
        devices.push(device);
    }

    devices
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn instant_config() -> DiscoveryConfig {
        DiscoveryConfig {
            scan_timeout: Duration::from_secs(5),
            synthetic_steps: 20,
            step_delay: Duration::ZERO,
            appearance_probability: 1.0,
        }
    }

    #[tokio::test]
    async fn test_synthetic_discovery_dedupes_addresses() {
        let events = EventBus::default();
        let mut rng = StdRng::seed_from_u64(21);
        let devices = discover_synthetic(&instant_config(), &events, &mut rng).await;
        assert!(!devices.is_empty());
        for (i, a) in devices.iter().enumerate() {
            for b in &devices[i + 1..] {
                assert_ne!(a.address, b.address);
            }
        }
        for device in &devices {
            assert!(device.is_synthetic());
            assert!(SIMULATED_DEVICE_NAMES.contains(&device.name.as_str()));
        }
    }

    #[tokio::test]
    async fn test_zero_probability_finds_nothing() {
        let events = EventBus::default();
        let mut rng = StdRng::seed_from_u64(3);
        let config = DiscoveryConfig {
            appearance_probability: 0.0,
            ..instant_config()
        };
        let devices = discover_synthetic(&config, &events, &mut rng).await;
        assert!(devices.is_empty());
    }

    #[tokio::test]
    async fn test_discover_emits_result_event() {
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let mut rng = StdRng::seed_from_u64(9);
        let devices = discover(&instant_config(), &events, &mut rng).await;

        loop {
            match rx.recv().await.unwrap() {
                EmulatorEvent::DevicesDiscovered(found) => {
                    assert_eq!(found.len(), devices.len());
                    break;
                }
                _ => continue,
            }
        }
    }
}
