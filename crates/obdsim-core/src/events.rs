//! Emulator event stream
//!
//! External collaborators (dashboard, persistence, alerting) observe the core
//! through a broadcast channel instead of multicast callbacks, so the core
//! never depends on a UI type. Dropped receivers or a lagging consumer never
//! block the emitting loop.

use tokio::sync::broadcast;

use crate::telemetry::TelemetrySnapshot;
use crate::transport::Device;

/// Default buffered event capacity per subscriber
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Notifications raised by the emulator core
#[derive(Debug, Clone)]
pub enum EmulatorEvent {
    /// The tick loop produced a new snapshot
    TelemetryUpdated(TelemetrySnapshot),
    /// A session processed one command/response pair
    CommandProcessed {
        /// Normalized request line
        request: String,
        /// Response written back to the client
        response: String,
    },
    /// The outbound connection went up or down
    ConnectionStatusChanged(bool),
    /// A discovery cycle finished
    DevicesDiscovered(Vec<Device>),
    /// An outbound device connected
    DeviceConnected(Device),
    /// The outbound device disconnected
    DeviceDisconnected(Device),
    /// Human-readable narration of state transitions and failures
    Log(String),
}

/// Cloneable sender half shared by every loop in the core
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EmulatorEvent>,
}

impl EventBus {
    /// Create a bus with the given per-subscriber capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to the event stream
    pub fn subscribe(&self) -> broadcast::Receiver<EmulatorEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; silently dropped when nobody is listening
    pub fn emit(&self, event: EmulatorEvent) {
        let _ = self.tx.send(event);
    }

    /// Emit a log event and mirror it to tracing
    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{message}");
        self.emit(EmulatorEvent::Log(message));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribe_receives_log() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.log("hello");
        match rx.recv().await.unwrap() {
            EmulatorEvent::Log(msg) => assert_eq!(msg, "hello"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_ok() {
        let bus = EventBus::default();
        bus.emit(EmulatorEvent::ConnectionStatusChanged(false));
    }
}
