//! WebSocket handling.
//!
//! # Responsibilities
//! - Pump frames between an upgraded socket and its reactor connection
//! - Define the handler pool interface the reactor attaches handlers from
//! - Count attached clients (the only state mutated from several threads)
//! - Provide the default telemetry pool
//!
//! # Data Flow
//! ```text
//! Client ──frames──→ pump ──WebSocketFrame──→ reactor ──→ attached handler
//! Client ←─frames─── pump ←──Frame::Message── reactor ←── handler (event or Poll)
//! business thread → TelemetryFeed::publish → Notifier::request_poll(token) → Poll
//! ```
//!
//! # Design Decisions
//! - Handler lifetime belongs to the pool: the reactor hands it back on close
//! - Ping/pong handled transparently by axum
//! - Close frames end the pump; the drop guard closes the reactor connection

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};

use crate::http::stream::CloseGuard;
use crate::net::ConnectionId;
use crate::reactor::{ConnectionEvent, Frame, HandlerToken, Notifier, Outbound, ReactorHandle};

/// Application logic of one WebSocket connection.
pub trait WebSocketHandler: Send {
    fn token(&self) -> HandlerToken;

    /// Return the event to let framework handling continue, `None` if consumed.
    fn handle_event(&mut self, event: ConnectionEvent, outbound: &Outbound) -> Option<ConnectionEvent>;
}

/// Owner of WebSocket handlers.
pub trait WebSocketPool: Send + Sync {
    fn open(&self, token: HandlerToken) -> Box<dyn WebSocketHandler>;
    fn release(&self, handler: Box<dyn WebSocketHandler>);
}

/// Number of attached WebSocket clients.
#[derive(Debug, Clone, Default)]
pub struct ClientCounter(Arc<AtomicUsize>);

impl ClientCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new count.
    pub fn increment(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns the new count. Never goes below zero.
    pub fn decrement(&self) -> usize {
        let previous = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Default pool: echoes text frames and pushes telemetry snapshots on poll.
#[derive(Debug)]
pub struct TelemetryPool {
    live: DashMap<HandlerToken, ()>,
    snapshot: watch::Sender<String>,
}

impl TelemetryPool {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(String::new());
        Self {
            live: DashMap::new(),
            snapshot,
        }
    }

    /// Tokens of handlers currently attached.
    pub fn live_tokens(&self) -> Vec<HandlerToken> {
        self.live.iter().map(|entry| *entry.key()).collect()
    }
}

impl Default for TelemetryPool {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSocketPool for TelemetryPool {
    fn open(&self, token: HandlerToken) -> Box<dyn WebSocketHandler> {
        self.live.insert(token, ());
        let mut snapshot = self.snapshot.subscribe();
        snapshot.mark_changed();
        Box::new(TelemetryHandler { token, snapshot })
    }

    fn release(&self, handler: Box<dyn WebSocketHandler>) {
        self.live.remove(&handler.token());
    }
}

struct TelemetryHandler {
    token: HandlerToken,
    snapshot: watch::Receiver<String>,
}

impl WebSocketHandler for TelemetryHandler {
    fn token(&self) -> HandlerToken {
        self.token
    }

    fn handle_event(&mut self, event: ConnectionEvent, outbound: &Outbound) -> Option<ConnectionEvent> {
        match event {
            ConnectionEvent::WebSocketFrame(Message::Text(text)) => {
                outbound.message(Message::Text(text));
                None
            }
            ConnectionEvent::Poll => {
                if self.snapshot.has_changed().unwrap_or(false) {
                    let latest = self.snapshot.borrow_and_update().clone();
                    if !latest.is_empty() {
                        outbound.message(Message::Text(latest.into()));
                    }
                }
                None
            }
            other => Some(other),
        }
    }
}

/// Publishes telemetry from business threads into attached WebSocket handlers.
#[derive(Debug, Clone)]
pub struct TelemetryFeed {
    pool: Arc<TelemetryPool>,
    notifier: Notifier,
}

impl TelemetryFeed {
    pub fn new(pool: Arc<TelemetryPool>, notifier: Notifier) -> Self {
        Self { pool, notifier }
    }

    /// Store a snapshot and wake every attached handler.
    pub fn publish(&self, snapshot: String) {
        self.pool.snapshot.send_replace(snapshot);
        for token in self.pool.live_tokens() {
            self.notifier.request_poll(token);
        }
    }
}

/// Shuttle frames between an upgraded socket and the reactor.
pub(crate) async fn pump(
    socket: WebSocket,
    id: ConnectionId,
    mut frames: mpsc::UnboundedReceiver<Frame>,
    reactor: ReactorHandle,
    guard: CloseGuard,
) {
    let _guard = guard;
    let (mut sink, mut stream) = socket.split();
    reactor.event(id, ConnectionEvent::WebSocketHandshakeComplete);
    tracing::debug!(connection_id = %id, "WebSocket connected");

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(Frame::Message(message)) => {
                    if sink.send(message).await.is_err() {
                        break;
                    }
                }
                Some(Frame::End { .. }) | None => break,
                Some(_) => {}
            },
            incoming = stream.next() => match incoming {
                Some(Ok(message @ (Message::Text(_) | Message::Binary(_)))) => {
                    reactor.event(id, ConnectionEvent::WebSocketFrame(message));
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
        }
    }

    let _ = sink.close().await;
    tracing::debug!(connection_id = %id, "WebSocket disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbound() -> (Outbound, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Outbound::new(ConnectionId::new(), tx), rx)
    }

    fn token() -> HandlerToken {
        HandlerToken {
            connection: ConnectionId::new(),
            generation: 1,
        }
    }

    #[test]
    fn counter_never_underflows() {
        let counter = ClientCounter::new();
        assert_eq!(counter.increment(), 1);
        assert_eq!(counter.decrement(), 0);
        assert_eq!(counter.decrement(), 0);
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn telemetry_handler_echoes_text() {
        let pool = TelemetryPool::new();
        let mut handler = pool.open(token());
        let (out, mut rx) = outbound();

        let consumed = handler.handle_event(ConnectionEvent::WebSocketFrame(Message::Text("hi".into())), &out);
        assert!(consumed.is_none());
        assert!(matches!(rx.try_recv(), Ok(Frame::Message(Message::Text(t))) if t.as_str() == "hi"));

        assert!(matches!(
            handler.handle_event(ConnectionEvent::Close, &out),
            Some(ConnectionEvent::Close)
        ));
    }

    #[test]
    fn poll_pushes_latest_snapshot_once() {
        let pool = TelemetryPool::new();
        let t = token();
        let mut handler = pool.open(t);
        assert_eq!(pool.live_tokens(), vec![t]);
        let (out, mut rx) = outbound();

        pool.snapshot.send_replace("{\"soc\":80}".to_string());
        handler.handle_event(ConnectionEvent::Poll, &out);
        handler.handle_event(ConnectionEvent::Poll, &out);

        assert!(matches!(rx.try_recv(), Ok(Frame::Message(Message::Text(t))) if t.as_str() == "{\"soc\":80}"));
        assert!(rx.try_recv().is_err());

        pool.release(handler);
        assert!(pool.live_tokens().is_empty());
    }
}
