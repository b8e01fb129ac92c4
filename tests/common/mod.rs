//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;

use webconsole::config::{ConfigStore, ServerConfig};
use webconsole::http::{HttpServer, TelemetryPool};
use webconsole::lifecycle::EventBus;
use webconsole::reactor::{Collaborators, CommandExecutor, NoCommands};
use webconsole::session::HostDeviceState;

/// A running console.
#[allow(dead_code)]
pub struct Console {
    pub addr: SocketAddr,
    pub bus: EventBus,
    pub store: ConfigStore,
}

#[allow(dead_code)]
impl Console {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Defaults for tests: loopback port, no files, no global credentials file.
pub fn test_config(port: u16) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = format!("127.0.0.1:{port}");
    config.http_server.enable_files = false;
    config.http_server.auth_global = false;
    config
}

#[allow(dead_code)]
pub async fn spawn_console(config: ServerConfig) -> Console {
    spawn_console_with(config, Arc::new(NoCommands)).await
}

/// A server that has not bound its listener yet.
pub fn build_server(config: ServerConfig, commands: Arc<dyn CommandExecutor>) -> (HttpServer, EventBus, ConfigStore) {
    let bus = EventBus::new();
    let store = ConfigStore::new(config, None, bus.clone());
    let collaborators = Collaborators {
        device: Arc::new(HostDeviceState::new("SN-TEST")),
        websockets: Arc::new(TelemetryPool::new()),
        commands,
    };

    let server = HttpServer::new(store.clone(), &bus, collaborators).unwrap();
    (server, bus, store)
}

pub async fn spawn_console_with(config: ServerConfig, commands: Arc<dyn CommandExecutor>) -> Console {
    let (mut server, bus, store) = build_server(config, commands);
    let addr = server.start().await.unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    Console { addr, bus, store }
}

/// Run the event loop without binding; the listener waits for `NetworkAvailable`.
#[allow(dead_code)]
pub async fn spawn_idle_console(config: ServerConfig) -> Console {
    let addr = config.listener.bind_address.parse().unwrap();
    let (server, bus, store) = build_server(config, Arc::new(NoCommands));
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    Console { addr, bus, store }
}

/// Client that never follows redirects or uses a proxy.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
