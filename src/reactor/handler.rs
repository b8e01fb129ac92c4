//! Handlers attached to a connection.

use crate::http::websocket::WebSocketHandler;
use crate::reactor::connection::Outbound;
use crate::reactor::event::ConnectionEvent;
use crate::reactor::sender::{DataChunkSender, SendProgress, StringChunkSender};

/// Per-connection state with its own event logic. At most one per connection.
pub enum AttachedHandler {
    /// Pool-owned; returned to its pool on close.
    WebSocket(Box<dyn WebSocketHandler>),
    /// Self-owned; dropped on completion or close.
    Data(DataChunkSender),
    Text(StringChunkSender),
}

/// What the attached handler did with an event.
#[derive(Debug)]
pub enum Handled {
    /// Not consumed; framework handling continues with the event.
    Pass(ConnectionEvent),
    Consumed,
    /// Consumed, and the handler is done and must be detached.
    Detach,
}

impl AttachedHandler {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WebSocket(_) => "websocket",
            Self::Data(_) => "data_sender",
            Self::Text(_) => "string_sender",
        }
    }

    /// First refusal on every event of the connection.
    pub fn handle_event(&mut self, event: ConnectionEvent, outbound: &Outbound) -> Handled {
        match self {
            Self::WebSocket(handler) => match handler.handle_event(event, outbound) {
                Some(event) => Handled::Pass(event),
                None => Handled::Consumed,
            },
            Self::Data(sender) => drive_sender(event, outbound, |o| sender.on_send_ready(o)),
            Self::Text(sender) => drive_sender(event, outbound, |o| sender.on_send_ready(o)),
        }
    }
}

fn drive_sender<F>(event: ConnectionEvent, outbound: &Outbound, mut step: F) -> Handled
where
    F: FnMut(&Outbound) -> SendProgress,
{
    match event {
        ConnectionEvent::SendReady | ConnectionEvent::Poll => match step(outbound) {
            SendProgress::Sent(_) => Handled::Consumed,
            SendProgress::Finished => Handled::Detach,
        },
        other => Handled::Pass(other),
    }
}
