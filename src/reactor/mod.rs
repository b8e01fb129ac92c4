//! Single-threaded connection reactor.
//!
//! # Data Flow
//! ```text
//! transport tasks / other threads
//!     → ReactorMessage (unbounded channel)
//!     → dispatcher.rs on the reactor thread
//!         attached handler first (handler.rs: WebSocket, DataChunkSender, StringChunkSender)
//!         then PageRegistry → AuthGate → page handler
//!         or static file fallback / 404
//!     → Frame stream back to the transport (connection.rs Outbound)
//!
//! Maintenance:
//!     interval tick → SessionStore::sweep_idle
//! ```
//!
//! # Design Decisions
//! - One OS thread owns registry, sessions, runtime config and connections; no locks
//! - Every event is dispatched under catch_unwind; a faulting connection is dropped
//! - Other threads only reach handlers through Notifier with generation-checked tokens

pub mod connection;
pub mod dispatcher;
pub mod event;
pub mod handler;
pub mod notifier;
pub mod sender;
pub mod services;

use tokio::sync::mpsc;

use crate::http::websocket::ClientCounter;
use crate::net::ConnectionId;
use crate::routing::PageDescriptor;

pub use connection::{Frame, HandlerToken, Outbound, ResponseHead, StaticRequest};
pub use dispatcher::Reactor;
pub use event::{ConnectionEvent, HttpRequest};
pub use handler::AttachedHandler;
pub use notifier::Notifier;
pub use sender::{DataChunkSender, StringChunkSender};
pub use services::{Collaborators, CommandExecutor, NoCommands, Services};

/// Messages accepted by the reactor thread.
pub enum ReactorMessage {
    Open { id: ConnectionId, outbound: Outbound },
    Event { id: ConnectionId, event: ConnectionEvent },
    Poll(HandlerToken),
    RegisterPage(PageDescriptor),
    DeregisterPage(String),
    Shutdown,
}

/// Cloneable handle to a running reactor.
#[derive(Debug, Clone)]
pub struct ReactorHandle {
    tx: mpsc::UnboundedSender<ReactorMessage>,
    notifier: Notifier,
    clients: ClientCounter,
}

impl ReactorHandle {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<ReactorMessage>,
        notifier: Notifier,
        clients: ClientCounter,
    ) -> Self {
        Self {
            tx,
            notifier,
            clients,
        }
    }

    /// Returns `false` if the reactor has stopped.
    pub fn open(&self, id: ConnectionId, outbound: Outbound) -> bool {
        self.tx.send(ReactorMessage::Open { id, outbound }).is_ok()
    }

    pub fn event(&self, id: ConnectionId, event: ConnectionEvent) -> bool {
        self.tx.send(ReactorMessage::Event { id, event }).is_ok()
    }

    /// Add a page after startup. Duplicates are rejected by the registry.
    pub fn register_page(&self, page: PageDescriptor) {
        let _ = self.tx.send(ReactorMessage::RegisterPage(page));
    }

    pub fn deregister_page(&self, uri: impl Into<String>) {
        let _ = self.tx.send(ReactorMessage::DeregisterPage(uri.into()));
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(ReactorMessage::Shutdown);
    }

    pub fn notifier(&self) -> Notifier {
        self.notifier.clone()
    }

    /// Attached WebSocket clients.
    pub fn clients(&self) -> &ClientCounter {
        &self.clients
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}
