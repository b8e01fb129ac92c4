//! Reactor-side connection state and its outbound frame channel.
//!
//! # Responsibilities
//! - Carry response output from the reactor to the transport task
//! - Own the handler attached to a connection
//! - Hand out generation-stamped tokens for cross-thread wake-ups

use std::path::PathBuf;

use axum::extract::ws::Message;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::net::{ConnectionId, ConnectionState};
use crate::reactor::handler::AttachedHandler;

/// Status line and headers of a response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// A request handed to the static file collaborator.
#[derive(Debug, Clone)]
pub struct StaticRequest {
    pub document_root: PathBuf,
    pub method: Method,
    /// Path component, already checked against protected paths.
    pub uri: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub directory_listing: bool,
    pub auth_domain: String,
    pub auth_file: String,
    /// Set when the global credentials file governs access.
    pub global_auth_file: Option<PathBuf>,
}

/// Output produced by the reactor for one connection.
#[derive(Debug)]
pub enum Frame {
    Head(ResponseHead),
    Chunk(Bytes),
    /// Terminal chunk. `close` asks the transport not to reuse the connection.
    End { close: bool },
    ServeStatic(Box<StaticRequest>),
    Message(Message),
}

/// Sending half of a connection's frame channel.
#[derive(Debug, Clone)]
pub struct Outbound {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Frame>,
}

impl Outbound {
    pub fn new(id: ConnectionId, tx: mpsc::UnboundedSender<Frame>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a frame. A transport that went away is not an error here;
    /// its close event is already on the way.
    pub fn send(&self, frame: Frame) {
        if self.tx.send(frame).is_err() {
            tracing::trace!(connection_id = %self.id, "Transport gone, frame dropped");
        }
    }

    pub fn head(&self, status: StatusCode, headers: HeaderMap) {
        self.send(Frame::Head(ResponseHead { status, headers }));
    }

    pub fn chunk(&self, bytes: Bytes) {
        self.send(Frame::Chunk(bytes));
    }

    pub fn end(&self, close: bool) {
        self.send(Frame::End { close });
    }

    pub fn message(&self, message: Message) {
        self.send(Frame::Message(message));
    }

    /// Complete plain-text response that closes the connection.
    pub fn error(&self, status: StatusCode, headers: HeaderMap, text: &str) {
        let mut headers = headers;
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        self.head(status, headers);
        self.chunk(Bytes::copy_from_slice(text.as_bytes()));
        self.end(true);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Identity of an attached handler, safe to hand to other threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerToken {
    pub connection: ConnectionId,
    pub generation: u64,
}

/// A live connection. Reactor thread only.
pub struct Connection {
    pub id: ConnectionId,
    pub state: ConnectionState,
    pub outbound: Outbound,
    pub handler: Option<AttachedHandler>,
    pub keep_alive: bool,
    generation: u64,
}

impl Connection {
    pub fn new(outbound: Outbound) -> Self {
        Self {
            id: outbound.id(),
            state: ConnectionState::New,
            outbound,
            handler: None,
            keep_alive: true,
            generation: 0,
        }
    }

    /// Reserve the token for the next handler to attach.
    pub fn next_token(&mut self) -> HandlerToken {
        self.generation += 1;
        self.token()
    }

    /// Token of the current handler generation.
    pub fn token(&self) -> HandlerToken {
        HandlerToken {
            connection: self.id,
            generation: self.generation,
        }
    }

    /// True when `token` names the handler attached right now.
    pub fn accepts(&self, token: HandlerToken) -> bool {
        token.connection == self.id && token.generation == self.generation && self.handler.is_some()
    }
}
