//! System event bus.

use tokio::sync::broadcast;

use crate::config::ConfigParam;

/// Device-wide notifications the console reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemEvent {
    /// A network interface came up; start serving.
    NetworkAvailable,
    /// All networks went down; stop accepting new connections.
    NetworkStopped,
    /// A configuration parameter changed (`None` means all of them).
    ConfigChanged(Option<ConfigParam>),
    /// Configuration storage became available.
    ConfigMounted,
    /// Process shutdown.
    Shutdown,
}

/// Broadcast channel that all long-running tasks can subscribe to.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SystemEvent>,
}

impl EventBus {
    /// Create a new event bus.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    /// Subscribe to system events.
    pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: SystemEvent) {
        tracing::debug!(event = ?event, "System event");
        let _ = self.tx.send(event);
    }

    /// Number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
