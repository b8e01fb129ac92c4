//! HTTP server setup and lifecycle.
//!
//! # Responsibilities
//! - Start listening when the network comes up, stop when it goes down
//! - Create the Axum router: one fallback handler feeding the reactor
//! - Translate each exchange into reactor events and reactor frames into a response
//! - Upgrade WebSocket requests and pump their frames
//! - Hand static requests to the file collaborator
//!
//! # Data Flow
//! ```text
//! Request → dispatch → Open + HttpRequest → reactor
//!                   ← Frame::Head ─────────── page / error
//!                   ← Frame::ServeStatic ──── files.rs
//! Response body ← FrameStream ← Frame::Chunk / Frame::End
//! ```
//!
//! # Design Decisions
//! - Each request is one reactor connection; keep-alive reuse is left to hyper
//! - The request timeout covers the time to the response head, not streaming
//! - A failed bind leaves the server stopped until the next network event

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ws::WebSocketUpgrade, FromRequestParts, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    serve::Listener,
    Router,
};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{ConfigParam, ConfigStore, ServerConfig};
use crate::http::files;
use crate::http::stream::{CloseGuard, FrameStream};
use crate::http::websocket;
use crate::lifecycle::{EventBus, SystemEvent};
use crate::net::{BoundedListener, ConnectionId, ListenerError};
use crate::reactor::{Collaborators, ConnectionEvent, Frame, HttpRequest, Outbound, Reactor, ReactorHandle};

/// Time allowed for in-flight exchanges when the listener is restarted.
const RESTART_GRACE: Duration = Duration::from_secs(5);

/// Error type for server startup.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Application state injected into the dispatch handler.
#[derive(Clone)]
struct AppState {
    reactor: ReactorHandle,
    max_body: usize,
}

struct Serving {
    local_addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// The web console server.
pub struct HttpServer {
    store: ConfigStore,
    events: broadcast::Receiver<SystemEvent>,
    reactor: ReactorHandle,
    serving: Option<Serving>,
}

impl HttpServer {
    /// Spawn the reactor. Listening starts on `NetworkAvailable` or [`HttpServer::start`].
    pub fn new(
        store: ConfigStore,
        bus: &EventBus,
        collaborators: Collaborators,
    ) -> Result<Self, ServerError> {
        let events = bus.subscribe();
        let reactor = Reactor::spawn(store.clone(), bus, collaborators)?;
        Ok(Self {
            store,
            events,
            reactor,
            serving: None,
        })
    }

    pub fn handle(&self) -> ReactorHandle {
        self.reactor.clone()
    }

    /// Address of the running listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.serving.as_ref().map(|s| s.local_addr)
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, reactor: ReactorHandle) -> Router {
        let state = AppState {
            reactor,
            max_body: config.transfer.max_request_body,
        };
        Router::new()
            .fallback(dispatch)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the listener and start serving. No-op while already serving.
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        if let Some(serving) = &self.serving {
            return Ok(serving.local_addr);
        }

        let config = self.store.load();
        let listener = BoundedListener::bind(&config.listener).await?;
        let local_addr = listener.local_addr()?;
        let router = Self::build_router(&config, self.reactor.clone());
        let (stop, stopped) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let shutdown = async {
                let _ = stopped.await;
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!(error = %e, "HTTP server failed");
            }
            tracing::info!(address = %local_addr, "HTTP server stopped");
        });

        tracing::info!(address = %local_addr, "HTTP server starting");
        self.serving = Some(Serving {
            local_addr,
            stop,
            task,
        });
        Ok(local_addr)
    }

    /// Stop accepting and let in-flight exchanges finish in the background.
    pub fn stop(&mut self) -> Option<JoinHandle<()>> {
        let serving = self.serving.take()?;
        let _ = serving.stop.send(());
        Some(serving.task)
    }

    /// Follow system events until shutdown.
    pub async fn run(mut self) -> Result<(), ServerError> {
        loop {
            match self.events.recv().await {
                Ok(SystemEvent::NetworkAvailable) => {
                    if let Err(e) = self.start().await {
                        tracing::error!(error = %e, "Failed to start HTTP server");
                    }
                }
                Ok(SystemEvent::NetworkStopped) => {
                    self.stop();
                }
                Ok(SystemEvent::ConfigChanged(Some(ConfigParam::Listener))) => {
                    self.restart().await;
                }
                Ok(SystemEvent::Shutdown) | Err(broadcast::error::RecvError::Closed) => break,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "HTTP server lagged behind system events");
                }
            }
        }

        if let Some(task) = self.stop() {
            let _ = tokio::time::timeout(RESTART_GRACE, task).await;
        }
        self.reactor.shutdown();
        Ok(())
    }

    async fn restart(&mut self) {
        let Some(task) = self.stop() else {
            return;
        };
        if tokio::time::timeout(RESTART_GRACE, task).await.is_err() {
            tracing::warn!("Previous listener still draining");
        }
        if let Err(e) = self.start().await {
            tracing::error!(error = %e, "Failed to restart HTTP server");
        }
    }
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

/// Fallback handler: every request becomes a reactor connection.
async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let id = ConnectionId::new();
    let (tx, mut frames) = mpsc::unbounded_channel();
    if !state.reactor.open(id, Outbound::new(id, tx)) {
        tracing::error!(connection_id = %id, "Reactor is not running");
        return (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable").into_response();
    }
    let guard = CloseGuard::new(id, state.reactor.clone());
    let (mut parts, body) = request.into_parts();

    if is_websocket_upgrade(&parts.headers) {
        return match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
            Ok(upgrade) => {
                let reactor = state.reactor.clone();
                upgrade.on_upgrade(move |socket| websocket::pump(socket, id, frames, reactor, guard))
            }
            Err(rejection) => rejection.into_response(),
        };
    }

    let body = match axum::body::to_bytes(body, state.max_body).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(connection_id = %id, error = %e, "Request body rejected");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large").into_response();
        }
    };

    let request = HttpRequest {
        method: parts.method,
        uri: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        version: parts.version,
        headers: parts.headers,
        body,
    };
    state.reactor.event(id, ConnectionEvent::HttpRequest(request));

    match frames.recv().await {
        Some(Frame::Head(head)) => {
            let stream = FrameStream::new(id, frames, state.reactor.clone(), guard);
            let mut response = Response::new(Body::from_stream(stream));
            *response.status_mut() = head.status;
            *response.headers_mut() = head.headers;
            response
        }
        Some(Frame::ServeStatic(request)) => {
            drop(guard);
            files::serve(*request).await
        }
        Some(other) => {
            tracing::error!(connection_id = %id, frame = ?other, "Response started without a head");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        None => {
            tracing::error!(connection_id = %id, "Connection dropped before responding");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
