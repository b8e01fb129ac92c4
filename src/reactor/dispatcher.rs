//! Connection event dispatcher.
//!
//! # Responsibilities
//! - Own all reactor state: page registry, session table, runtime config, connections
//! - Route each connection event: attached handler first, then framework handling
//! - Serve registered pages behind the auth gate, fall back to static files or 404
//! - Attach WebSocket handlers from the pool and release them on close
//! - Run the periodic session sweep
//! - Apply configuration changes and keep the global credentials file in sync
//!
//! # Data Flow
//! ```text
//! HttpRequest ─┬─ page found ──→ AuthGate ─┬─ Allow ──────────→ page handler
//!              │                           ├─ LoginRequired ──→ /login handler (requested URI kept)
//!              │                           └─ DigestChallenge → 401
//!              ├─ files enabled ─┬─ protected → 401, close
//!              │                 └─ ServeStatic
//!              └─ otherwise ───→ 404, close
//! ```

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;

use crate::auth::digest::{self, Credential, GlobalFileWriter};
use crate::auth::{AuthDecision, AuthGate};
use crate::config::{ConfigParam, ConfigStore, RuntimeConfig};
use crate::http::context::RequestContext;
use crate::lifecycle::{EventBus, SystemEvent};
use crate::net::{ConnectionId, ConnectionState};
use crate::observability::metrics;
use crate::pages;
use crate::reactor::connection::{Connection, Frame, HandlerToken, Outbound, StaticRequest};
use crate::reactor::event::{ConnectionEvent, HttpRequest};
use crate::reactor::handler::{AttachedHandler, Handled};
use crate::reactor::notifier::{take_local_polls, Notifier};
use crate::reactor::services::{Collaborators, Services};
use crate::reactor::{ReactorHandle, ReactorMessage};
use crate::routing::{PageDescriptor, PageRegistry};
use crate::session::{Session, SessionStore};

/// The reactor state. Lives on the reactor thread only.
pub struct Reactor {
    registry: PageRegistry,
    sessions: SessionStore,
    connections: HashMap<ConnectionId, Connection>,
    runtime: RuntimeConfig,
    credential: Option<Credential>,
    auth_file_writer: Option<GlobalFileWriter>,
    services: Services,
    max_connections: usize,
}

impl Reactor {
    /// Build the reactor with the standard pages registered.
    pub fn new(services: Services) -> Self {
        let config = services.config.load();
        let mut registry = PageRegistry::new();
        pages::register_standard_pages(&mut registry);

        Self {
            registry,
            sessions: SessionStore::new(
                config.sessions.capacity,
                Duration::from_secs(config.sessions.ttl_secs),
            ),
            connections: HashMap::new(),
            runtime: RuntimeConfig::from_config(&config),
            credential: Credential::admin(&config.http_server.auth_domain, &config.password.module),
            auth_file_writer: None,
            max_connections: config.listener.max_connections.saturating_mul(2).max(1),
            services,
        }
    }

    /// Start the reactor on its own thread with a current-thread runtime.
    pub fn spawn(
        config: ConfigStore,
        bus: &EventBus,
        collaborators: Collaborators,
    ) -> std::io::Result<ReactorHandle> {
        let (tx, rx) = mpsc::unbounded_channel();
        let notifier = Notifier::new(tx.clone());
        let services = Services::new(config, collaborators, notifier.clone());
        let handle = ReactorHandle::new(tx, notifier, services.clients.clone());
        let events = bus.subscribe();

        thread::Builder::new()
            .name("webconsole-reactor".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to build reactor runtime");
                        return;
                    }
                };
                runtime.block_on(Reactor::new(services).run(rx, events));
            })?;

        Ok(handle)
    }

    /// Event loop: inbox messages, maintenance ticks, system events.
    pub async fn run(
        mut self,
        mut inbox: mpsc::UnboundedReceiver<ReactorMessage>,
        mut events: broadcast::Receiver<SystemEvent>,
    ) {
        self.services.notifier.bind_current_thread();
        self.on_config_changed(None);

        let interval = Duration::from_millis(self.services.config.load().sessions.check_interval_ms.max(1));
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut bus_open = true;

        tracing::info!(
            pages = self.registry.len(),
            session_slots = self.sessions.capacity(),
            "Reactor started"
        );

        loop {
            tokio::select! {
                message = inbox.recv() => match message {
                    None | Some(ReactorMessage::Shutdown) => break,
                    Some(message) => self.handle_message(message, Instant::now()),
                },
                _ = ticker.tick() => self.on_timer(Instant::now()),
                event = events.recv(), if bus_open => match event {
                    Ok(SystemEvent::ConfigChanged(param)) => self.on_config_changed(param),
                    Ok(SystemEvent::ConfigMounted) => self.on_config_changed(None),
                    Ok(SystemEvent::Shutdown) => break,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "System events lagged, reloading configuration");
                        self.on_config_changed(None);
                    }
                    Err(broadcast::error::RecvError::Closed) => bus_open = false,
                },
            }
            self.drain_local_polls(Instant::now());
        }

        let remaining: Vec<_> = self.connections.keys().copied().collect();
        for id in remaining {
            self.close(id);
        }
        tracing::info!("Reactor stopped");
    }

    /// Handle one inbox message.
    pub fn handle_message(&mut self, message: ReactorMessage, now: Instant) {
        match message {
            ReactorMessage::Open { id, outbound } => self.open(id, outbound),
            ReactorMessage::Event { id, event } => self.dispatch(id, event, now),
            ReactorMessage::Poll(token) => self.poll(token, now),
            ReactorMessage::RegisterPage(page) => {
                self.registry.register(page);
            }
            ReactorMessage::DeregisterPage(uri) => {
                self.registry.deregister(&uri);
            }
            ReactorMessage::Shutdown => {}
        }
    }

    /// Maintenance tick.
    pub fn on_timer(&mut self, now: Instant) {
        let expired = self.sessions.sweep_idle(now);
        if expired > 0 {
            tracing::debug!(expired, remaining = self.sessions.len(), "Idle sessions swept");
        }
    }

    /// Rebuild derived state after a configuration change (`None` = everything).
    pub fn on_config_changed(&mut self, param: Option<ConfigParam>) {
        let config = self.services.config.load();
        tracing::debug!(param = ?param, "Configuration changed");

        if matches!(param, None | Some(ConfigParam::HttpServer)) {
            self.runtime = RuntimeConfig::from_config(&config);
        }
        if matches!(param, None | Some(ConfigParam::Sessions)) {
            self.sessions
                .set_ttl(Duration::from_secs(config.sessions.ttl_secs));
        }
        if matches!(
            param,
            None | Some(ConfigParam::Password) | Some(ConfigParam::HttpServer)
        ) {
            self.credential =
                Credential::admin(&self.runtime.auth_domain, &config.password.module);
            self.sync_global_auth_file();
        }
    }

    /// Write or remove the global credentials file off the reactor thread.
    fn sync_global_auth_file(&mut self) {
        if !self.runtime.global_auth {
            return;
        }
        if self.auth_file_writer.is_none() {
            let Ok(handle) = tokio::runtime::Handle::try_current() else {
                tracing::debug!("No runtime, global credentials file left untouched");
                return;
            };
            self.auth_file_writer = Some(GlobalFileWriter::spawn(&handle));
        }
        if let Some(writer) = &self.auth_file_writer {
            writer.request(self.runtime.global_auth_file.clone(), self.credential.clone());
        }
    }

    fn open(&mut self, id: ConnectionId, outbound: Outbound) {
        if self.connections.len() >= self.max_connections {
            tracing::warn!(
                connection_id = %id,
                connections = self.connections.len(),
                "Connection table full"
            );
            outbound.error(
                StatusCode::SERVICE_UNAVAILABLE,
                HeaderMap::new(),
                "Service Unavailable",
            );
            return;
        }
        tracing::trace!(connection_id = %id, "Connection opened");
        self.connections.insert(id, Connection::new(outbound));
    }

    /// Dispatch one event with fault isolation.
    fn dispatch(&mut self, id: ConnectionId, event: ConnectionEvent, now: Instant) {
        let kind = event.name();
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.handle_event(id, event, now)));

        if result.is_err() {
            tracing::error!(connection_id = %id, event = kind, "Connection event handler panicked");
            if let Some(connection) = self.connections.remove(&id) {
                self.release(connection);
            }
        }
    }

    fn handle_event(&mut self, id: ConnectionId, event: ConnectionEvent, now: Instant) {
        let Some(connection) = self.connections.get_mut(&id) else {
            tracing::trace!(connection_id = %id, event = event.name(), "Event for unknown connection");
            return;
        };

        let event = match connection.handler.as_mut() {
            Some(handler) => match handler.handle_event(event, &connection.outbound) {
                Handled::Pass(event) => event,
                Handled::Consumed => return,
                Handled::Detach => {
                    if let Some(done) = connection.handler.take() {
                        tracing::trace!(connection_id = %id, handler = done.kind(), "Handler detached");
                    }
                    return;
                }
            },
            None => event,
        };

        match event {
            ConnectionEvent::HttpRequest(request) => self.serve_http(id, request, now),
            ConnectionEvent::WebSocketHandshakeComplete => self.attach_websocket(id),
            ConnectionEvent::Close => self.close(id),
            ConnectionEvent::WebSocketFrame(_) | ConnectionEvent::SendReady | ConnectionEvent::Poll => {}
        }
    }

    fn poll(&mut self, token: HandlerToken, now: Instant) {
        match self.connections.get(&token.connection) {
            Some(connection) if connection.accepts(token) => {
                self.dispatch(token.connection, ConnectionEvent::Poll, now);
            }
            _ => {
                tracing::debug!(
                    connection_id = %token.connection,
                    generation = token.generation,
                    "Stale poll ignored"
                );
            }
        }
    }

    /// Run polls requested from inside the reactor during the last event.
    fn drain_local_polls(&mut self, now: Instant) {
        let polls = take_local_polls();
        if polls.is_empty() {
            return;
        }
        for token in polls {
            self.poll(token, now);
        }
        // Polls requested by the handlers just polled wait for the next turn.
        let again = take_local_polls();
        if !again.is_empty() {
            self.services.notifier.defer(again);
        }
    }

    fn attach_websocket(&mut self, id: ConnectionId) {
        let Some(connection) = self.connections.get_mut(&id) else {
            return;
        };
        let token = connection.next_token();
        let handler = self.services.websockets.open(token);
        connection.state = ConnectionState::Upgrading;
        connection.handler = Some(AttachedHandler::WebSocket(handler));

        let clients = self.services.clients.increment();
        metrics::set_websocket_clients(clients);
        tracing::debug!(connection_id = %id, clients, "WebSocket client attached");
    }

    fn close(&mut self, id: ConnectionId) {
        if let Some(connection) = self.connections.remove(&id) {
            self.release(connection);
        }
    }

    /// Destroy a removed connection's handler exactly once.
    fn release(&self, mut connection: Connection) {
        connection.state = ConnectionState::Closed;
        match connection.handler.take() {
            Some(AttachedHandler::WebSocket(handler)) => {
                self.services.websockets.release(handler);
                let clients = self.services.clients.decrement();
                metrics::set_websocket_clients(clients);
                tracing::debug!(connection_id = %connection.id, clients, "WebSocket client released");
            }
            Some(other) => drop(other),
            None => {}
        }
        tracing::trace!(connection_id = %connection.id, "Connection closed");
    }

    fn serve_http(&mut self, id: ConnectionId, request: HttpRequest, now: Instant) {
        let start = Instant::now();
        let method = request.method.clone();
        tracing::info!(connection_id = %id, "HTTP {} {}", request.method, request.uri);

        let Some(connection) = self.connections.get_mut(&id) else {
            return;
        };
        connection.state = ConnectionState::Serving;
        connection.keep_alive = request.keep_alive();
        let outbound = connection.outbound.clone();

        let route = if let Some(page) = self.registry.find(&request.uri) {
            self.serve_page(id, page, request, now)
        } else if self.runtime.file_serving {
            if self.runtime.is_protected(&request.uri) {
                tracing::debug!(connection_id = %id, uri = %request.uri, "Protected path");
                outbound.error(StatusCode::UNAUTHORIZED, HeaderMap::new(), "Unauthorized");
                "denied"
            } else {
                outbound.send(Frame::ServeStatic(Box::new(self.static_request(request))));
                "static"
            }
        } else {
            outbound.error(StatusCode::NOT_FOUND, HeaderMap::new(), "Not Found");
            "not_found"
        };

        metrics::record_request(method.as_str(), route, start);
    }

    fn serve_page(
        &mut self,
        id: ConnectionId,
        page: std::sync::Arc<PageDescriptor>,
        request: HttpRequest,
        now: Instant,
    ) -> &'static str {
        let config = self.services.config.load();
        let session = self.sessions.get_by_cookie(
            request.header(header::COOKIE.as_str()),
            &config.sessions.cookie_name,
            now,
        );

        let gate = AuthGate {
            password_set: config.password.is_set(),
            credential: self.credential.as_ref(),
            realm: &self.runtime.auth_domain,
        };
        let decision = gate.check(
            page.auth,
            session.as_ref(),
            request.method.as_str(),
            request.header(header::AUTHORIZATION.as_str()),
            unix_now(),
        );

        match decision {
            AuthDecision::Allow => {
                self.run_page(id, &page, request, session, now);
                "page"
            }
            AuthDecision::LoginRequired => {
                match self.registry.find(pages::LOGIN_URI) {
                    Some(login) => self.run_page(id, &login, request, session, now),
                    None => {
                        if let Some(connection) = self.connections.get(&id) {
                            connection.outbound.error(
                                StatusCode::FORBIDDEN,
                                HeaderMap::new(),
                                "Login required",
                            );
                        }
                    }
                }
                "login"
            }
            AuthDecision::DigestChallenge => {
                if let Some(connection) = self.connections.get(&id) {
                    let mut headers = HeaderMap::new();
                    let challenge = digest::challenge(&self.runtime.auth_domain, unix_now());
                    if let Ok(value) = HeaderValue::from_str(&challenge) {
                        headers.insert(header::WWW_AUTHENTICATE, value);
                    }
                    connection
                        .outbound
                        .error(StatusCode::UNAUTHORIZED, headers, "Unauthorized");
                }
                "denied"
            }
        }
    }

    /// Invoke a page handler and flush what it produced.
    fn run_page(
        &mut self,
        id: ConnectionId,
        page: &PageDescriptor,
        request: HttpRequest,
        session: Option<Session>,
        now: Instant,
    ) {
        let Self {
            registry,
            sessions,
            connections,
            services,
            ..
        } = self;
        let Some(connection) = connections.get_mut(&id) else {
            return;
        };

        let mut ctx = RequestContext::new(request, session, now, connection, sessions, registry, services);
        page.handler.serve(page, &mut ctx);
        if !ctx.finish() {
            tracing::error!(connection_id = %id, uri = %page.uri, "Page handler produced no response");
            connection.outbound.error(
                StatusCode::INTERNAL_SERVER_ERROR,
                HeaderMap::new(),
                "Internal Server Error",
            );
        }
    }

    fn static_request(&self, request: HttpRequest) -> StaticRequest {
        let runtime = &self.runtime;
        StaticRequest {
            document_root: runtime.document_root.clone(),
            method: request.method,
            uri: request.uri,
            query: request.query,
            headers: request.headers,
            directory_listing: runtime.directory_listing,
            auth_domain: runtime.auth_domain.clone(),
            auth_file: runtime.auth_file.clone(),
            global_auth_file: runtime.global_auth.then(|| runtime.global_auth_file.clone()),
        }
    }

    pub fn registry(&self) -> &PageRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn runtime(&self) -> &RuntimeConfig {
        &self.runtime
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn services(&self) -> &Services {
        &self.services
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::http::context::RequestContext;
    use crate::http::websocket::{TelemetryPool, WebSocketHandler, WebSocketPool};
    use crate::reactor::connection::ResponseHead;
    use crate::routing::{PageAuth, PageMenu};
    use crate::session::HostDeviceState;
    use axum::extract::ws::Message;
    use axum::http::Method;
    use bytes::Bytes;
    use std::path::PathBuf;
    use std::sync::Arc;

    const PASSWORD: &str = "secret12";

    fn config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.http_server.auth_global = false;
        config.http_server.enable_files = false;
        config
    }

    fn protected_config() -> ServerConfig {
        let mut config = config();
        config.password.module = PASSWORD.into();
        config.password.changed = true;
        config
    }

    fn reactor_with(config: ServerConfig, collaborators: Collaborators) -> Reactor {
        let (tx, _rx) = mpsc::unbounded_channel();
        let store = ConfigStore::new(config, None, EventBus::new());
        let mut reactor = Reactor::new(Services::new(store, collaborators, Notifier::new(tx)));
        reactor.on_config_changed(None);
        reactor
    }

    fn reactor(config: ServerConfig) -> Reactor {
        reactor_with(config, Collaborators::host("SN-TEST"))
    }

    fn open(reactor: &mut Reactor) -> (ConnectionId, mpsc::UnboundedReceiver<Frame>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        reactor.handle_message(
            ReactorMessage::Open {
                id,
                outbound: Outbound::new(id, tx),
            },
            Instant::now(),
        );
        (id, rx)
    }

    fn send(reactor: &mut Reactor, id: ConnectionId, event: ConnectionEvent) {
        reactor.handle_message(ReactorMessage::Event { id, event }, Instant::now());
    }

    fn get(uri: &str) -> HttpRequest {
        HttpRequest::new(Method::GET, uri)
    }

    fn post_form(uri: &str, body: &'static str) -> HttpRequest {
        let mut request = HttpRequest::new(Method::POST, uri);
        request.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        request.body = Bytes::from_static(body.as_bytes());
        request
    }

    /// Open a connection, send one request, collect the buffered response.
    fn exchange(reactor: &mut Reactor, request: HttpRequest) -> (ResponseHead, String) {
        let (id, mut frames) = open(reactor);
        send(reactor, id, ConnectionEvent::HttpRequest(request));
        let response = collect(&mut frames);
        send(reactor, id, ConnectionEvent::Close);
        response
    }

    fn collect(frames: &mut mpsc::UnboundedReceiver<Frame>) -> (ResponseHead, String) {
        let head = match frames.try_recv() {
            Ok(Frame::Head(head)) => head,
            other => panic!("expected head, got {other:?}"),
        };
        let mut body = String::new();
        loop {
            match frames.try_recv() {
                Ok(Frame::Chunk(bytes)) => body.push_str(&String::from_utf8_lossy(&bytes)),
                Ok(Frame::End { .. }) => break,
                other => panic!("unexpected frame {other:?}"),
            }
        }
        (head, body)
    }

    fn login(reactor: &mut Reactor) -> String {
        let (head, _) = exchange(
            reactor,
            post_form("/login", "username=admin&password=secret12"),
        );
        assert_eq!(head.status, StatusCode::OK);
        let set_cookie = head.headers[header::SET_COOKIE].to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    fn with_cookie(mut request: HttpRequest, cookie: &str) -> HttpRequest {
        request
            .headers
            .insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        request
    }

    #[test]
    fn open_system_serves_cookie_pages() {
        let mut reactor = reactor(config());
        let (head, body) = exchange(&mut reactor, get("/status"));
        assert_eq!(head.status, StatusCode::OK);
        assert!(body.contains("Server status"));
        assert_eq!(reactor.connection_count(), 0);
    }

    #[test]
    fn protected_page_without_session_shows_login() {
        let mut reactor = reactor(protected_config());
        let (head, body) = exchange(&mut reactor, get("/status"));
        assert_eq!(head.status, StatusCode::FORBIDDEN);
        assert!(body.contains("Login required"));
        assert!(body.contains("action=\"/status\""));
    }

    #[test]
    fn login_returns_to_requested_page() {
        let mut reactor = reactor(protected_config());

        let (head, body) = exchange(
            &mut reactor,
            post_form("/status", "username=admin&password=secret12"),
        );
        assert_eq!(head.status, StatusCode::OK);
        assert!(head.headers.contains_key(header::SET_COOKIE));
        assert!(body.contains("url=/status"));
        assert_eq!(reactor.sessions().len(), 1);

        let cookie = login(&mut reactor);
        let (head, _) = exchange(&mut reactor, with_cookie(get("/status"), &cookie));
        assert_eq!(head.status, StatusCode::OK);
    }

    #[test]
    fn first_login_goes_to_password_page() {
        let mut config = protected_config();
        config.password.changed = false;
        let mut reactor = reactor(config);

        let (_, body) = exchange(&mut reactor, post_form("/login", "username=admin&password=secret12"));
        assert!(body.contains("url=/cfg/password"));
    }

    #[test]
    fn bad_credentials_rerender_form() {
        let mut reactor = reactor(protected_config());
        let (head, body) = exchange(&mut reactor, post_form("/login", "username=admin&password=nope"));
        assert_eq!(head.status, StatusCode::FORBIDDEN);
        assert!(body.contains("errorlist"));
        assert!(body.contains("<form"));
        assert!(reactor.sessions().is_empty());
    }

    #[test]
    fn logout_destroys_session_and_clears_cookie() {
        let mut reactor = reactor(protected_config());
        let cookie = login(&mut reactor);

        let (head, body) = exchange(&mut reactor, with_cookie(get("/logout"), &cookie));
        assert!(body.contains("url=/home"));
        let cleared = head.headers[header::SET_COOKIE].to_str().unwrap();
        assert!(cleared.contains("Max-Age=0"));
        assert!(reactor.sessions().is_empty());

        let (head, _) = exchange(&mut reactor, with_cookie(get("/status"), &cookie));
        assert_eq!(head.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn unknown_uri_without_files_is_404() {
        let mut reactor = reactor(config());
        let (head, _) = exchange(&mut reactor, get("/nothing-here"));
        assert_eq!(head.status, StatusCode::NOT_FOUND);
        assert_eq!(head.headers[header::CONNECTION], "close");
    }

    #[test]
    fn file_fallback_and_protected_paths() {
        let mut config = config();
        config.http_server.enable_files = true;
        config.http_server.docroot = "/srv/www".into();
        let mut reactor = reactor(config);

        let (head, _) = exchange(&mut reactor, get("/store/config/secrets"));
        assert_eq!(head.status, StatusCode::UNAUTHORIZED);

        let (head, _) = exchange(&mut reactor, get("/logs/../store/config"));
        assert_eq!(head.status, StatusCode::UNAUTHORIZED);

        let (id, mut frames) = open(&mut reactor);
        send(&mut reactor, id, ConnectionEvent::HttpRequest(get("/logs/today.log?tail=1")));
        match frames.try_recv() {
            Ok(Frame::ServeStatic(request)) => {
                assert_eq!(request.document_root, PathBuf::from("/srv/www"));
                assert_eq!(request.uri, "/logs/today.log");
                assert_eq!(request.query.as_deref(), Some("tail=1"));
                assert!(request.global_auth_file.is_none());
            }
            other => panic!("expected static request, got {other:?}"),
        }
    }

    #[test]
    fn file_digest_page_challenges() {
        fn secret(_page: &PageDescriptor, ctx: &mut RequestContext<'_>) {
            ctx.print("secret");
        }

        let mut reactor = reactor(protected_config());
        reactor.handle_message(
            ReactorMessage::RegisterPage(PageDescriptor::new(
                "/secret",
                "Secret",
                secret,
                PageMenu::None,
                PageAuth::FileDigest,
            )),
            Instant::now(),
        );

        let (head, _) = exchange(&mut reactor, get("/secret"));
        assert_eq!(head.status, StatusCode::UNAUTHORIZED);
        let challenge = head.headers[header::WWW_AUTHENTICATE].to_str().unwrap();
        assert!(challenge.starts_with("Digest qop=\"auth\""));
    }

    #[test]
    fn chunked_asset_follows_send_ready() {
        let mut config = config();
        config.transfer.chunk_size = 64;
        let mut reactor = reactor(config);

        let (id, mut frames) = open(&mut reactor);
        send(&mut reactor, id, ConnectionEvent::HttpRequest(get("/assets/style.css")));
        match frames.try_recv() {
            Ok(Frame::Head(head)) => {
                assert_eq!(head.status, StatusCode::OK);
                assert_eq!(head.headers[header::CONTENT_TYPE], "text/css");
            }
            other => panic!("expected head, got {other:?}"),
        }
        assert!(frames.try_recv().is_err());

        let mut body = Vec::new();
        let mut chunks = 0;
        loop {
            send(&mut reactor, id, ConnectionEvent::SendReady);
            match frames.try_recv() {
                Ok(Frame::Chunk(bytes)) => {
                    assert!(bytes.len() <= 64);
                    chunks += 1;
                    body.extend_from_slice(&bytes);
                }
                Ok(Frame::End { close }) => {
                    assert!(!close);
                    break;
                }
                other => panic!("unexpected frame {other:?}"),
            }
        }
        assert_eq!(chunks, body.len().div_ceil(64));
        assert!(body.starts_with(b"body {"));

        // Detached after the terminal chunk: further SendReady does nothing.
        send(&mut reactor, id, ConnectionEvent::SendReady);
        assert!(frames.try_recv().is_err());
    }

    #[test]
    fn handler_without_response_gets_500() {
        fn silent(_page: &PageDescriptor, _ctx: &mut RequestContext<'_>) {}

        let mut reactor = reactor(config());
        let page = PageDescriptor::new("/silent", "Silent", silent, PageMenu::None, PageAuth::None);
        reactor.handle_message(ReactorMessage::RegisterPage(page), Instant::now());

        let (head, _) = exchange(&mut reactor, get("/silent"));
        assert_eq!(head.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn panicking_handler_only_drops_its_connection() {
        fn boom(_page: &PageDescriptor, _ctx: &mut RequestContext<'_>) {
            panic!("page failure");
        }

        let mut reactor = reactor(config());
        let page = PageDescriptor::new("/boom", "Boom", boom, PageMenu::None, PageAuth::None);
        reactor.handle_message(ReactorMessage::RegisterPage(page), Instant::now());

        let (_other, _other_frames) = open(&mut reactor);
        let (id, mut frames) = open(&mut reactor);
        send(&mut reactor, id, ConnectionEvent::HttpRequest(get("/boom")));

        assert!(matches!(
            frames.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert_eq!(reactor.connection_count(), 1);

        let (head, _) = exchange(&mut reactor, get("/home"));
        assert_eq!(head.status, StatusCode::OK);
    }

    #[test]
    fn full_table_answers_503() {
        let mut config = config();
        config.listener.max_connections = 1;
        let mut reactor = reactor(config);

        let _a = open(&mut reactor);
        let _b = open(&mut reactor);
        let (_, mut frames) = open(&mut reactor);
        let (head, _) = collect(&mut frames);
        assert_eq!(head.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(reactor.connection_count(), 2);
    }

    #[test]
    fn sweep_expires_idle_sessions() {
        let mut reactor = reactor(protected_config());
        login(&mut reactor);
        assert_eq!(reactor.sessions().len(), 1);

        reactor.on_timer(Instant::now() + Duration::from_secs(1800));
        assert_eq!(reactor.sessions().len(), 1);
        reactor.on_timer(Instant::now() + Duration::from_secs(3601));
        assert!(reactor.sessions().is_empty());
    }

    #[test]
    fn registered_pages_can_be_removed() {
        let mut reactor = reactor(config());
        reactor.handle_message(ReactorMessage::DeregisterPage("/home".into()), Instant::now());
        let (head, _) = exchange(&mut reactor, get("/home"));
        assert_eq!(head.status, StatusCode::NOT_FOUND);
    }

    /// Answers every poll with a text frame.
    struct PollEchoPool;

    struct PollEcho(HandlerToken);

    impl WebSocketHandler for PollEcho {
        fn token(&self) -> HandlerToken {
            self.0
        }

        fn handle_event(&mut self, event: ConnectionEvent, outbound: &Outbound) -> Option<ConnectionEvent> {
            match event {
                ConnectionEvent::Poll => {
                    outbound.message(Message::Text("poll".into()));
                    None
                }
                other => Some(other),
            }
        }
    }

    impl WebSocketPool for PollEchoPool {
        fn open(&self, token: HandlerToken) -> Box<dyn WebSocketHandler> {
            Box::new(PollEcho(token))
        }

        fn release(&self, _handler: Box<dyn WebSocketHandler>) {}
    }

    #[test]
    fn polls_reach_only_the_attached_generation() {
        let collaborators = Collaborators {
            device: Arc::new(HostDeviceState::new("SN-TEST")),
            websockets: Arc::new(PollEchoPool),
            commands: Arc::new(crate::reactor::NoCommands),
        };
        let mut reactor = reactor_with(config(), collaborators);

        let (id, mut frames) = open(&mut reactor);
        send(&mut reactor, id, ConnectionEvent::WebSocketHandshakeComplete);
        assert_eq!(reactor.services().clients.get(), 1);
        let token = HandlerToken {
            connection: id,
            generation: 1,
        };

        reactor.handle_message(ReactorMessage::Poll(token), Instant::now());
        assert!(matches!(frames.try_recv(), Ok(Frame::Message(_))));

        let stale = HandlerToken {
            connection: id,
            generation: 0,
        };
        reactor.handle_message(ReactorMessage::Poll(stale), Instant::now());
        assert!(frames.try_recv().is_err());

        send(&mut reactor, id, ConnectionEvent::Close);
        assert_eq!(reactor.services().clients.get(), 0);
        reactor.handle_message(ReactorMessage::Poll(token), Instant::now());
        assert_eq!(reactor.connection_count(), 0);
    }

    #[test]
    fn telemetry_handler_echoes_text() {
        let collaborators = Collaborators {
            device: Arc::new(HostDeviceState::new("SN-TEST")),
            websockets: Arc::new(TelemetryPool::new()),
            commands: Arc::new(crate::reactor::NoCommands),
        };
        let mut reactor = reactor_with(config(), collaborators);

        let (id, mut frames) = open(&mut reactor);
        send(&mut reactor, id, ConnectionEvent::WebSocketHandshakeComplete);
        send(
            &mut reactor,
            id,
            ConnectionEvent::WebSocketFrame(Message::Text("ping".into())),
        );
        match frames.try_recv() {
            Ok(Frame::Message(Message::Text(text))) => assert_eq!(text.as_str(), "ping"),
            other => panic!("expected echo, got {other:?}"),
        }
    }

    #[test]
    fn password_change_publishes_and_applies() {
        let mut reactor = reactor(config());
        let (head, body) = exchange(
            &mut reactor,
            post_form("/cfg/password", "newpass1=longsecret&newpass2=longsecret"),
        );
        assert_eq!(head.status, StatusCode::OK, "{body}");

        let config = reactor.services().config.load();
        assert_eq!(config.password.module, "longsecret");
        assert!(config.password.changed);

        reactor.on_config_changed(Some(ConfigParam::Password));
        let (head, _) = exchange(&mut reactor, get("/status"));
        assert_eq!(head.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn global_credentials_follow_the_last_password_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store/.htpasswd");
        let mut config = config();
        config.http_server.auth_global = true;
        config.http_server.global_auth_file = path.display().to_string();
        let mut reactor = reactor(config);

        for password in ["firstpass", "", "lastpass1"] {
            reactor
                .services()
                .config
                .update(ConfigParam::Password, |c| c.password.module = password.into())
                .unwrap();
            reactor.on_config_changed(Some(ConfigParam::Password));
        }

        let expected = format!("{}\n", Credential::new("admin", "webconsole", "lastpass1").line());
        for _ in 0..200 {
            if std::fs::read_to_string(&path).ok().as_deref() == Some(expected.as_str()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(std::fs::read_to_string(&path).unwrap(), expected);
    }
}
