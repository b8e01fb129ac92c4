//! Collaborators the reactor calls out to.

use std::sync::Arc;
use std::time::Instant;

use crate::config::ConfigStore;
use crate::http::websocket::{ClientCounter, TelemetryPool, WebSocketPool};
use crate::reactor::notifier::Notifier;
use crate::session::{DeviceState, HostDeviceState};

/// Runs a console command and returns its output.
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, command: &str) -> String;
}

impl<F> CommandExecutor for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn execute(&self, command: &str) -> String {
        self(command)
    }
}

/// Answers every command with an "unknown command" line.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCommands;

impl CommandExecutor for NoCommands {
    fn execute(&self, command: &str) -> String {
        format!("Unrecognised command: {command}\n")
    }
}

/// External subsystems supplied by the embedding application.
#[derive(Clone)]
pub struct Collaborators {
    pub device: Arc<dyn DeviceState>,
    pub websockets: Arc<dyn WebSocketPool>,
    pub commands: Arc<dyn CommandExecutor>,
}

impl Collaborators {
    /// Host defaults: configured serial, telemetry pool, no commands.
    pub fn host(serial: &str) -> Self {
        Self {
            device: Arc::new(HostDeviceState::new(serial)),
            websockets: Arc::new(TelemetryPool::new()),
            commands: Arc::new(NoCommands),
        }
    }
}

/// Everything page handlers can reach besides reactor-owned state.
#[derive(Clone)]
pub struct Services {
    pub config: ConfigStore,
    pub device: Arc<dyn DeviceState>,
    pub websockets: Arc<dyn WebSocketPool>,
    pub commands: Arc<dyn CommandExecutor>,
    pub clients: ClientCounter,
    pub notifier: Notifier,
    pub started: Instant,
}

impl Services {
    pub fn new(config: ConfigStore, collaborators: Collaborators, notifier: Notifier) -> Self {
        Self {
            config,
            device: collaborators.device,
            websockets: collaborators.websockets,
            commands: collaborators.commands,
            clients: ClientCounter::new(),
            notifier,
            started: Instant::now(),
        }
    }
}
