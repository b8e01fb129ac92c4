//! Web console server (v1)
//!
//! Administrative web interface for an embedded telematics device, built
//! with Tokio and Axum around a single-threaded connection reactor.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client ──▶ net::listener ──▶ http::server ──▶ reactor (own thread)
//!                                    ▲                 │ PageRegistry
//!                                    │                 │ SessionStore
//!                                    │                 │ AuthGate
//!   Client ◀── FrameStream / ws ◀────┴──── Frames ◀────┘ StreamingSender
//!
//!   lifecycle::EventBus: NetworkAvailable / NetworkStopped / ConfigChanged / Shutdown
//!   config::ConfigStore: TOML file, hot reload, console edits
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use webconsole::config::loader::load_config;
use webconsole::config::{ConfigStore, ConfigWatcher, ServerConfig};
use webconsole::http::{HttpServer, TelemetryFeed, TelemetryPool};
use webconsole::lifecycle::{signals, EventBus, SystemEvent};
use webconsole::observability::{logging, metrics};
use webconsole::reactor::{Collaborators, NoCommands};
use webconsole::session::HostDeviceState;

#[derive(Parser)]
#[command(name = "webconsole")]
#[command(about = "Embedded web administration console", long_about = None)]
struct Args {
    /// Configuration file (created with defaults on first change if missing).
    #[arg(short, long, default_value = "webconsole.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let (config, loaded) = match load_config(&args.config) {
        Ok(config) => (config, Ok(())),
        Err(e) => (ServerConfig::default(), Err(e)),
    };
    logging::init_logging(&config.observability);

    tracing::info!("webconsole v{} starting", env!("CARGO_PKG_VERSION"));
    if let Err(e) = loaded {
        tracing::warn!(
            path = %args.config.display(),
            error = %e,
            "Using default configuration"
        );
    }
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        session_slots = config.sessions.capacity,
        password_set = config.password.is_set(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let bus = EventBus::new();
    let store = ConfigStore::new(config.clone(), Some(args.config.clone()), bus.clone());

    let _watcher = if args.config.exists() {
        match ConfigWatcher::new(&args.config, store.clone()).run() {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!(error = %e, "Config hot reload disabled");
                None
            }
        }
    } else {
        None
    };

    let telemetry = Arc::new(TelemetryPool::new());
    let collaborators = Collaborators {
        device: Arc::new(HostDeviceState::new(&config.device.serial)),
        websockets: telemetry.clone(),
        commands: Arc::new(NoCommands),
    };

    let server = HttpServer::new(store, &bus, collaborators)?;
    let feed = TelemetryFeed::new(telemetry, server.handle().notifier());
    let clients = server.handle().clients().clone();
    tokio::spawn(async move {
        let started = std::time::Instant::now();
        let mut ticker = tokio::time::interval(Duration::from_secs(5));
        loop {
            ticker.tick().await;
            let snapshot = serde_json::json!({
                "uptime": started.elapsed().as_secs(),
                "clients": clients.get(),
            });
            feed.publish(snapshot.to_string());
        }
    });

    tokio::spawn(signals::shutdown_on_ctrl_c(bus.clone()));

    bus.publish(SystemEvent::ConfigMounted);
    bus.publish(SystemEvent::NetworkAvailable);
    server.run().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
