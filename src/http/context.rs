//! Per-request context handed to page handlers.
//!
//! # Responsibilities
//! - Expose the request (method, URI, variables, headers) and resolved session
//! - Buffer a synchronous response (status, headers, body text)
//! - Start chunked responses by attaching a sender to the connection
//! - Give handlers access to sessions, registry, configuration and collaborators

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use bytes::Bytes;

use crate::config::{ConfigStore, ServerConfig};
use crate::reactor::connection::Connection;
use crate::reactor::event::HttpRequest;
use crate::reactor::handler::AttachedHandler;
use crate::reactor::sender::{DataChunkSender, StringChunkSender};
use crate::reactor::services::Services;
use crate::routing::PageRegistry;
use crate::session::{Session, SessionId, SessionStore};

struct PendingResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
    streaming: bool,
}

/// Everything a page handler can see and do for one request.
pub struct RequestContext<'a> {
    request: HttpRequest,
    session: Option<Session>,
    now: Instant,
    connection: &'a mut Connection,
    sessions: &'a mut SessionStore,
    registry: &'a PageRegistry,
    services: &'a Services,
    config: Arc<ServerConfig>,
    response: Option<PendingResponse>,
}

impl<'a> RequestContext<'a> {
    pub(crate) fn new(
        request: HttpRequest,
        session: Option<Session>,
        now: Instant,
        connection: &'a mut Connection,
        sessions: &'a mut SessionStore,
        registry: &'a PageRegistry,
        services: &'a Services,
    ) -> Self {
        Self {
            request,
            session,
            now,
            connection,
            sessions,
            registry,
            config: services.config.load(),
            services,
            response: None,
        }
    }

    pub fn method(&self) -> &Method {
        &self.request.method
    }

    pub fn is_post(&self) -> bool {
        self.request.method == Method::POST
    }

    /// Requested path.
    pub fn uri(&self) -> &str {
        &self.request.uri
    }

    /// Form or query variable.
    pub fn var(&self, name: &str) -> Option<String> {
        self.request.var(name)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Configuration snapshot taken when the request arrived.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.services.config
    }

    pub fn registry(&self) -> &PageRegistry {
        self.registry
    }

    /// Log the client in: new session from this request's bytes.
    pub fn create_session(&mut self) -> Session {
        let fingerprint = self.request.fingerprint();
        let session = self
            .sessions
            .create(&fingerprint, self.services.device.as_ref(), self.now);
        self.session = Some(session);
        session
    }

    pub fn destroy_session(&mut self, id: SessionId) {
        self.sessions.destroy(id);
        if self.session.is_some_and(|s| s.id == id) {
            self.session = None;
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn session_capacity(&self) -> usize {
        self.sessions.capacity()
    }

    pub fn websocket_clients(&self) -> usize {
        self.services.clients.get()
    }

    pub fn uptime(&self) -> Duration {
        self.services.started.elapsed()
    }

    /// Run a console command through the command collaborator.
    pub fn execute(&self, command: &str) -> String {
        self.services.commands.execute(command)
    }

    /// Start a `text/html` response.
    pub fn head(&mut self, status: StatusCode) {
        self.head_with(status, &[]);
    }

    /// Start a `text/html` response with extra headers.
    pub fn head_with(&mut self, status: StatusCode, extra: &[(HeaderName, String)]) {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        for (name, value) in extra {
            match HeaderValue::from_str(value) {
                Ok(value) => {
                    headers.append(name.clone(), value);
                }
                Err(_) => {
                    tracing::warn!(header = %name, "Invalid header value dropped");
                }
            }
        }
        self.response = Some(PendingResponse {
            status,
            headers,
            body: String::new(),
            streaming: false,
        });
    }

    /// Append body text. Starts a 200 response if none was started.
    pub fn print(&mut self, text: &str) {
        if self.response.is_none() {
            self.head(StatusCode::OK);
        }
        if let Some(response) = self.response.as_mut() {
            if !response.streaming {
                response.body.push_str(text);
            }
        }
    }

    /// Plain error page.
    pub fn send_error(&mut self, status: StatusCode, message: &str) {
        self.head(status);
        self.print(&format!(
            "<div class=\"alert alert-danger\">{}</div>",
            crate::pages::html::escape(message)
        ));
    }

    /// Stream shared bytes with a `DataChunkSender`.
    pub fn stream_bytes(&mut self, status: StatusCode, content_type: &'static str, body: Bytes) {
        let sender = DataChunkSender::new(
            body,
            self.config.transfer.chunk_size,
            self.connection.keep_alive,
            self.connection.id,
        );
        self.start_stream(status, content_type, AttachedHandler::Data(sender));
    }

    /// Stream owned text with a `StringChunkSender`.
    pub fn stream_text(&mut self, status: StatusCode, content_type: &'static str, body: String) {
        let sender = StringChunkSender::new(
            body,
            self.config.transfer.chunk_size,
            self.connection.keep_alive,
            self.connection.id,
        );
        self.start_stream(status, content_type, AttachedHandler::Text(sender));
    }

    fn start_stream(&mut self, status: StatusCode, content_type: &'static str, handler: AttachedHandler) {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        if !self.connection.keep_alive {
            headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        }

        let token = self.connection.next_token();
        tracing::trace!(
            connection_id = %self.connection.id,
            generation = token.generation,
            handler = handler.kind(),
            "Sender attached"
        );
        self.connection.handler = Some(handler);
        self.response = Some(PendingResponse {
            status,
            headers,
            body: String::new(),
            streaming: true,
        });
    }

    /// Whether the handler produced a response.
    pub fn responded(&self) -> bool {
        self.response.is_some()
    }

    /// Flush the response to the transport. Returns `false` if there was none.
    pub(crate) fn finish(self) -> bool {
        let Some(response) = self.response else {
            return false;
        };
        let keep_alive = self.connection.keep_alive;
        let mut headers = response.headers;
        if !keep_alive {
            headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        }

        let outbound = &self.connection.outbound;
        outbound.head(response.status, headers);
        if !response.streaming {
            if !response.body.is_empty() {
                outbound.chunk(Bytes::from(response.body));
            }
            outbound.end(!keep_alive);
        }
        true
    }
}
