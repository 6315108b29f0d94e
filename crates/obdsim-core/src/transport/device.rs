//! Discoverable device model
//!
//! A [`Device`] is either backed by a real serial port enumerated from the
//! host or synthesized by discovery when no hardware is present. Synthetic
//! devices carry no port name and connections to them are state-only.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Service classes a discovered device may advertise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceId {
    /// Serial port profile, the one OBD adapters actually use
    SerialPort,
    ObexObjectPush,
    HumanInterfaceDevice,
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceId::SerialPort => "SerialPort",
            ServiceId::ObexObjectPush => "ObexObjectPush",
            ServiceId::HumanInterfaceDevice => "HumanInterfaceDevice",
        };
        f.write_str(s)
    }
}

/// One discoverable adapter candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Advertised display name
    pub name: String,
    /// Stable identity, MAC-formatted for synthetic devices
    pub address: String,
    /// Last observed signal strength in dBm
    pub signal_strength: i32,
    /// Whether a session is currently established
    pub connected: bool,
    /// Whether pairing completed
    pub authenticated: bool,
    /// Advertised services
    pub services: Vec<ServiceId>,
    /// Host serial port backing this device; `None` marks a synthetic one
    pub port_name: Option<String>,
}

impl Device {
    /// Device backed by a real host serial port
    pub fn from_port(port_name: &str) -> Self {
        Self {
            name: format!("OBD adapter on {port_name}"),
            address: port_name.to_string(),
            signal_strength: 0,
            connected: false,
            authenticated: true,
            services: vec![ServiceId::SerialPort],
            port_name: Some(port_name.to_string()),
        }
    }

    /// Synthesized device with a random MAC-style address
    pub fn synthetic<R: Rng>(name: &str, rng: &mut R) -> Self {
        let mut mac = [0u8; 6];
        rng.fill(&mut mac);
        // Clear the multicast bit so the address reads as unicast
        mac[0] &= 0xFE;
        let address = mac
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(":");
        Self {
            name: name.to_string(),
            address,
            signal_strength: rng.gen_range(-80..-30),
            connected: false,
            authenticated: rng.gen_bool(0.5),
            services: vec![ServiceId::SerialPort, ServiceId::ObexObjectPush],
            port_name: None,
        }
    }

    /// Whether this device was synthesized rather than enumerated
    pub fn is_synthetic(&self) -> bool {
        self.port_name.is_none()
    }

    /// Whether the device advertises the given service
    pub fn has_service(&self, service: ServiceId) -> bool {
        self.services.contains(&service)
    }

    /// Estimate current signal strength from connection state plus noise
    pub fn estimate_signal<R: Rng>(&self, rng: &mut R) -> i32 {
        let mut base = -60;
        if self.connected {
            base += 10;
        }
        if self.authenticated {
            base += 5;
        }
        base + rng.gen_range(-20..20)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.connected {
            "connected"
        } else {
            "disconnected"
        };
        write!(
            f,
            "{} ({}) - {}dBm - {}{}",
            self.name,
            self.address,
            self.signal_strength,
            status,
            if self.authenticated { ", paired" } else { "" },
        )
    }
}
