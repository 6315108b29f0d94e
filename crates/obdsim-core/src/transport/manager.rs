//! Connection manager
//!
//! Owns every transport binding: outbound connections to discovered
//! devices, the inbound serial binding, and the TCP server binding. All
//! spawned loops hang off one master cancellation token so `stop` tears
//! the whole layer down in one step. Methods take `&self`; state lives
//! behind interior mutability so the manager can be shared across tasks.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::EmulatorConfig;
use crate::events::{EmulatorEvent, EventBus};
use crate::protocol::{CommandInterpreter, TransportError};
use crate::transport::device::Device;
use crate::transport::discovery::{self, DiscoveryConfig};
use crate::transport::serial;
use crate::transport::session::{run_session, SessionEnd};

/// Below this signal strength a connection attempt fails outright
const WEAK_SIGNAL_THRESHOLD: i32 = -70;
/// Backoff between serial session reopen attempts
const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);
/// Health monitor evaluation period
const HEALTH_INTERVAL: Duration = Duration::from_secs(5);
/// Synthetic link is considered lost below this signal strength
const SIGNAL_LOST_THRESHOLD: i32 = -85;

/// Pacing for synthetic outbound connection attempts
#[derive(Debug, Clone)]
pub struct ConnectTiming {
    /// Simulated establishment delay range
    pub delay: (Duration, Duration),
    /// Chance that an adequate-signal attempt succeeds
    pub success_probability: f64,
}

impl Default for ConnectTiming {
    fn default() -> Self {
        Self {
            delay: (Duration::from_millis(1500), Duration::from_millis(2000)),
            success_probability: 0.8,
        }
    }
}

impl ConnectTiming {
    /// No delay and guaranteed success, for deterministic tests
    pub fn instant() -> Self {
        Self {
            delay: (Duration::ZERO, Duration::ZERO),
            success_probability: 1.0,
        }
    }
}

/// Transport bindings and outbound connection state
pub struct TransportManager {
    config: EmulatorConfig,
    discovery: DiscoveryConfig,
    connect_timing: ConnectTiming,
    interpreter: Arc<CommandInterpreter>,
    events: EventBus,
    cancel: CancellationToken,
    should_run: Arc<AtomicBool>,
    discovered: Mutex<Vec<Device>>,
    connected: Arc<Mutex<Option<Device>>>,
    /// Token covering the current outbound connection's tasks; cancelled
    /// on explicit disconnect so the session does not auto-reconnect
    session_cancel: Mutex<Option<CancellationToken>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    rng: Mutex<StdRng>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TransportManager {
    /// Create a manager with no active bindings
    pub fn new(
        config: EmulatorConfig,
        interpreter: Arc<CommandInterpreter>,
        events: EventBus,
    ) -> Self {
        let rng = config.rng(2);
        Self {
            config,
            discovery: DiscoveryConfig::default(),
            connect_timing: ConnectTiming::default(),
            interpreter,
            events,
            cancel: CancellationToken::new(),
            should_run: Arc::new(AtomicBool::new(true)),
            discovered: Mutex::new(Vec::new()),
            connected: Arc::new(Mutex::new(None)),
            session_cancel: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            rng: Mutex::new(rng),
        }
    }

    /// Override discovery pacing, mainly for tests
    pub fn set_discovery_config(&mut self, config: DiscoveryConfig) {
        self.discovery = config;
    }

    /// Override connection pacing, mainly for tests
    pub fn set_connect_timing(&mut self, timing: ConnectTiming) {
        self.connect_timing = timing;
    }

    /// Devices found by the most recent scan
    pub fn discovered_devices(&self) -> Vec<Device> {
        lock(&self.discovered).clone()
    }

    /// The currently connected outbound device, if any
    pub fn connected_device(&self) -> Option<Device> {
        lock(&self.connected).clone()
    }

    /// Run one discovery cycle and remember the result
    pub async fn discover(&self) -> Vec<Device> {
        let devices = {
            // RNG guard must not live across the await
            let mut rng: StdRng = {
                let mut shared = lock(&self.rng);
                let seed: u64 = shared.gen();
                rand::SeedableRng::seed_from_u64(seed)
            };
            discovery::discover(&self.discovery, &self.events, &mut rng).await
        };
        *lock(&self.discovered) = devices.clone();
        devices
    }

    /// Connect to a previously discovered device by address.
    ///
    /// Real-port devices get a live command session with automatic reopen;
    /// synthetic devices connect state-only after a simulated delay and
    /// may fail depending on signal strength.
    pub async fn connect(&self, address: &str) -> Result<Device, TransportError> {
        if let Some(current) = self.connected_device() {
            return Err(TransportError::AlreadyConnected(current.name));
        }
        let mut device = lock(&self.discovered)
            .iter()
            .find(|d| d.address == address)
            .cloned()
            .ok_or_else(|| TransportError::DeviceNotFound(address.to_string()))?;

        self.events.log(format!("connecting to {device}"));
        let session_cancel = self.cancel.child_token();

        if let Some(port) = device.port_name.clone() {
            // Probe the port before declaring success
            let stream = serial::open_port(&port, self.config.baud_rate)?;
            self.spawn_serial_session(stream, port, session_cancel.clone());
        } else {
            // Only synthetic devices get the simulated establishment latency
            let delay = {
                let mut rng = lock(&self.rng);
                let (min, max) = self.connect_timing.delay;
                if max > min {
                    rng.gen_range(min..max)
                } else {
                    min
                }
            };
            tokio::time::sleep(delay).await;

            if device.signal_strength < WEAK_SIGNAL_THRESHOLD {
                self.events
                    .log(format!("signal too weak for {}", device.name));
                return Err(TransportError::SignalTooWeak {
                    rssi: device.signal_strength,
                });
            }
            let success = lock(&self.rng).gen_bool(self.connect_timing.success_probability);
            if !success {
                self.events.log(format!("connection to {} failed", device.name));
                return Err(TransportError::ConnectionFailed(device.name));
            }
        }

        device.connected = true;
        *lock(&self.connected) = Some(device.clone());
        *lock(&self.session_cancel) = Some(session_cancel.clone());
        self.events.emit(EmulatorEvent::DeviceConnected(device.clone()));
        self.events.emit(EmulatorEvent::ConnectionStatusChanged(true));
        self.events.log(format!("connected to {}", device.name));
        self.spawn_health_monitor(session_cancel);
        Ok(device)
    }

    /// Drop the outbound connection; a no-op when not connected.
    ///
    /// Cancels the connection's session token so a live serial session ends
    /// instead of auto-reconnecting.
    pub fn disconnect(&self) {
        if let Some(cancel) = lock(&self.session_cancel).take() {
            cancel.cancel();
        }
        let device = lock(&self.connected).take();
        if let Some(mut device) = device {
            device.connected = false;
            self.events.log(format!("disconnected from {}", device.name));
            self.events.emit(EmulatorEvent::DeviceDisconnected(device));
            self.events.emit(EmulatorEvent::ConnectionStatusChanged(false));
        }
    }

    /// Bind the given serial port and answer commands on it.
    ///
    /// An unopenable port is a configuration error and is returned rather
    /// than retried; later drops of an opened port are retried with backoff.
    pub fn start_serial_emulation(&self, port: &str) -> Result<(), TransportError> {
        let stream = serial::open_port(port, self.config.baud_rate)?;
        self.events
            .log(format!("serial binding up on {port} at {} baud", self.config.baud_rate));
        self.spawn_serial_session(stream, port.to_string(), self.cancel.child_token());
        Ok(())
    }

    fn spawn_serial_session(
        &self,
        stream: tokio_serial::SerialStream,
        port: String,
        cancel: CancellationToken,
    ) {
        let interpreter = Arc::clone(&self.interpreter);
        let events = self.events.clone();
        let should_run = Arc::clone(&self.should_run);
        let baud = self.config.baud_rate;

        let handle = tokio::spawn(async move {
            let mut current = Some(stream);
            loop {
                let Some(stream) = current.take() else { break };
                let end = run_session(
                    stream,
                    &port,
                    Arc::clone(&interpreter),
                    events.clone(),
                    cancel.clone(),
                )
                .await;
                if end == SessionEnd::Cancelled {
                    break;
                }
                // Peer went away; reopen until shutdown
                while should_run.load(Ordering::SeqCst) && !cancel.is_cancelled() {
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                    match serial::open_port(&port, baud) {
                        Ok(stream) => {
                            events.log(format!("serial binding reopened on {port}"));
                            current = Some(stream);
                            break;
                        }
                        Err(e) => {
                            tracing::warn!("reopen of {port} failed: {e}");
                        }
                    }
                }
                if current.is_none() {
                    break;
                }
            }
        });
        lock(&self.tasks).push(handle);
    }

    /// Bind a TCP listener and serve each accepted client its own session.
    ///
    /// Returns the bound address, which differs from the requested one when
    /// the caller asked for port 0.
    pub async fn start_server(&self, addr: &str) -> Result<SocketAddr, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::BindFailed {
                addr: addr.to_string(),
                source,
            })?;
        let local = listener.local_addr()?;
        self.events.log(format!("server listening on {local}"));

        let interpreter = Arc::clone(&self.interpreter);
        let events = self.events.clone();
        let cancel = self.cancel.child_token();

        let handle = tokio::spawn(async move {
            loop {
                let accepted = tokio::select! {
                    _ = cancel.cancelled() => break,
                    accepted = listener.accept() => accepted,
                };
                match accepted {
                    Ok((stream, peer)) => {
                        events.log(format!("client connected from {peer}"));
                        let interpreter = Arc::clone(&interpreter);
                        let events = events.clone();
                        let client_cancel = cancel.child_token();
                        tokio::spawn(async move {
                            run_session(
                                stream,
                                &peer.to_string(),
                                interpreter,
                                events,
                                client_cancel,
                            )
                            .await;
                        });
                    }
                    Err(e) => {
                        tracing::warn!("accept failed: {e}");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });
        lock(&self.tasks).push(handle);
        Ok(local)
    }

    fn spawn_health_monitor(&self, cancel: CancellationToken) {
        let events = self.events.clone();
        let seed: u64 = lock(&self.rng).gen();
        let mut rng: StdRng = rand::SeedableRng::seed_from_u64(seed);
        let is_synthetic = self
            .connected_device()
            .map(|d| d.is_synthetic())
            .unwrap_or(false);
        let name = self
            .connected_device()
            .map(|d| d.name)
            .unwrap_or_default();
        let connected = Arc::clone(&self.connected);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEALTH_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }
                let Some(mut device) = lock(&connected).clone() else { break };

                if is_synthetic {
                    // Random walk models a device moving in and out of range
                    let step = rng.gen_range(-10..=10);
                    device.signal_strength = (device.signal_strength + step).clamp(-90, -20);
                    if device.signal_strength < SIGNAL_LOST_THRESHOLD {
                        events.log(format!("weak signal from {name}, reconnecting"));
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        device.signal_strength = device.signal_strength.max(-60);
                        events.log(format!("link to {name} recovered"));
                    }
                    *lock(&connected) = Some(device);
                } else if rng.gen_bool(0.05) {
                    events.log(format!("signal instability on link to {name}"));
                }
            }
        });
        lock(&self.tasks).push(handle);
    }

    /// Cancel every binding and wait for the spawned loops to exit
    pub async fn stop(&self) {
        self.should_run.store(false, Ordering::SeqCst);
        self.disconnect();
        self.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *lock(&self.tasks));
        for handle in handles {
            let _ = handle.await;
        }
        self.events.log("transport stopped");
    }
}
