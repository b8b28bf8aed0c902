//! Connection health model
//!
//! `HealthState` is what a connection reports when asked; `HealthEvent` is
//! what it announces on its own when it fails or comes back.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Point-in-time operability of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthState {
    /// Fully operative
    Connected,
    /// Connecting, authenticating, or running with minor faults
    Degraded,
    /// Disconnected or in error
    Offline,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Connected => "CONNECTED",
            HealthState::Degraded => "DEGRADED",
            HealthState::Offline => "OFFLINE",
        }
    }

    /// Only a connected link is operational
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthState::Connected)
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discrete health transitions announced by a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthEvent {
    /// Transitioned into a failed/disconnected condition
    Unhealthy,
    /// Transitioned back to fully operative after an outage
    Reconnected,
}

/// Receiving end of one health subscription
pub type HealthReceiver = mpsc::UnboundedReceiver<HealthEvent>;

/// Per-connection health event hub
///
/// Every subscriber owns an unbounded queue, so a slow subscriber never
/// loses an event. Adapters embed one and emit on it; observers call
/// [`subscribe`](Self::subscribe). Emitting with nobody subscribed is not
/// an error. Dropped receivers are pruned on the next emit.
#[derive(Debug, Clone, Default)]
pub struct HealthEvents {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<HealthEvent>>>>,
}

impl HealthEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> HealthReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Announce a failure; returns the number of subscribers notified
    pub fn emit_unhealthy(&self) -> usize {
        self.emit(HealthEvent::Unhealthy)
    }

    /// Announce a recovery; returns the number of subscribers notified
    pub fn emit_reconnected(&self) -> usize {
        self.emit(HealthEvent::Reconnected)
    }

    /// Live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    fn emit(&self, event: HealthEvent) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event).is_ok());
        subscribers.len()
    }
}
