//! Emulator facade
//!
//! Single entry point tying the telemetry simulator, command interpreter,
//! and transport manager together over one shared snapshot and event bus.
//! Frontends (CLI, dashboards) drive everything through this type.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::EmulatorConfig;
use crate::diagnostics::DiagnosticState;
use crate::events::{EmulatorEvent, EventBus};
use crate::protocol::{CommandInterpreter, InterpreterTiming, TransportError};
use crate::telemetry::simulator::TelemetrySimulator;
use crate::telemetry::{SharedSnapshot, TelemetrySnapshot};
use crate::transport::{Device, TransportManager};

/// The assembled adapter emulator
pub struct Emulator {
    config: EmulatorConfig,
    events: EventBus,
    snapshot: SharedSnapshot,
    simulator: TelemetrySimulator,
    transport: Arc<TransportManager>,
}

impl Emulator {
    /// Assemble an emulator from configuration. Nothing runs until
    /// [`Emulator::start_simulation`] or one of the bindings is started.
    pub fn new(config: EmulatorConfig) -> Self {
        let events = EventBus::default();

        let mut snapshot = TelemetrySnapshot::new(config.profile);
        snapshot.diagnostics = DiagnosticState::initial(&mut config.rng(3));
        let snapshot = SharedSnapshot::new(snapshot);

        let interpreter = Arc::new(CommandInterpreter::new(
            snapshot.clone(),
            InterpreterTiming::default(),
            config.rng(1),
        ));
        let simulator =
            TelemetrySimulator::new(snapshot.clone(), events.clone(), config.clone());
        let transport = Arc::new(TransportManager::new(
            config.clone(),
            interpreter,
            events.clone(),
        ));

        Self {
            config,
            events,
            snapshot,
            simulator,
            transport,
        }
    }

    /// The configuration this emulator was built from
    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    /// Subscribe to the emulator event stream
    pub fn subscribe(&self) -> broadcast::Receiver<EmulatorEvent> {
        self.events.subscribe()
    }

    /// Clone out the current telemetry snapshot
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.snapshot.read()
    }

    /// Start the telemetry tick loop
    pub fn start_simulation(&mut self) {
        self.simulator.start();
    }

    /// Stop the telemetry tick loop; telemetry freezes at its last values
    pub async fn stop_simulation(&mut self) {
        self.simulator.stop().await;
    }

    /// Whether the tick loop is running
    pub fn simulation_running(&self) -> bool {
        self.simulator.is_running()
    }

    /// Toggle fault-injection mode
    pub fn set_critical_mode(&self, on: bool) {
        self.simulator.set_critical_mode(on);
        self.events.log(format!(
            "critical mode {}",
            if on { "enabled" } else { "disabled" }
        ));
    }

    /// Toggle random DTC generation
    pub fn set_dtc_mode(&self, on: bool) {
        self.simulator.set_dtc_mode(on);
    }

    /// Toggle manual override of RPM, temperature, and speed
    pub fn set_manual_mode(&self, on: bool) {
        self.simulator.set_manual_mode(on);
    }

    /// Force an RPM value for manual mode
    pub fn set_manual_rpm(&self, rpm: f64) {
        self.simulator.set_manual_rpm(rpm);
    }

    /// Force a coolant temperature for manual mode
    pub fn set_manual_temperature(&self, temp: f64) {
        self.simulator.set_manual_temperature(temp);
    }

    /// Force a road speed for manual mode
    pub fn set_manual_speed(&self, speed: f64) {
        self.simulator.set_manual_speed(speed);
    }

    /// Clear all trouble codes, as a mode 04 request would
    pub fn clear_dtcs(&self) -> usize {
        self.snapshot.update(|s| s.diagnostics.clear_all())
    }

    /// Run a discovery cycle for nearby adapter devices
    pub async fn discover_devices(&self) -> Vec<Device> {
        self.transport.discover().await
    }

    /// Connect to a discovered device by address
    pub async fn connect(&self, address: &str) -> Result<Device, TransportError> {
        self.transport.connect(address).await
    }

    /// Drop the outbound connection
    pub fn disconnect(&self) {
        self.transport.disconnect();
    }

    /// The connected outbound device, if any
    pub fn connected_device(&self) -> Option<Device> {
        self.transport.connected_device()
    }

    /// Bind the configured serial port and answer commands on it
    pub fn start_serial(&self) -> Result<(), TransportError> {
        let port = self
            .config
            .serial_port
            .clone()
            .ok_or_else(|| TransportError::PortNotFound("no serial port configured".into()))?;
        self.transport.start_serial_emulation(&port)
    }

    /// Bind the configured TCP listener; returns the bound address
    pub async fn start_server(&self) -> Result<std::net::SocketAddr, TransportError> {
        let addr = self.config.listen_addr.clone().ok_or_else(|| {
            TransportError::ConnectionFailed("no listen address configured".into())
        })?;
        self.transport.start_server(&addr).await
    }

    /// Stop everything: tick loop, bindings, and outbound connection
    pub async fn stop(&mut self) {
        self.simulator.stop().await;
        self.transport.stop().await;
    }
}
