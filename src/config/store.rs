//! Persisted device configuration.
//!
//! # Responsibilities
//! - Hold the current `ServerConfig` for lock-free reads from any thread
//! - Apply validated updates and persist them back to the TOML file
//! - Announce changes on the event bus
//!
//! # Design Decisions
//! - Reads never block: `ArcSwap` snapshot per read
//! - Writes to disk run on the blocking pool when a runtime is present
//! - Unchanged updates are dropped without an event

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::loader::{render_config, ConfigError};
use crate::config::schema::ServerConfig;
use crate::config::validation::validate_config;
use crate::lifecycle::{EventBus, SystemEvent};

/// Configuration parameter groups that can change independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigParam {
    /// `[http_server]`
    HttpServer,
    /// `[password]`
    Password,
    /// `[listener]`
    Listener,
    /// `[sessions]`
    Sessions,
    /// `[observability]`
    Observability,
}

/// Shared handle to the device configuration.
#[derive(Clone)]
pub struct ConfigStore {
    current: Arc<ArcSwap<ServerConfig>>,
    path: Option<PathBuf>,
    bus: EventBus,
}

impl ConfigStore {
    /// Create a store. Without a path, updates live in memory only.
    pub fn new(config: ServerConfig, path: Option<PathBuf>, bus: EventBus) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(config)),
            path,
            bus,
        }
    }

    /// Current configuration snapshot.
    pub fn load(&self) -> Arc<ServerConfig> {
        self.current.load_full()
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Modify one parameter group.
    ///
    /// The result is validated before it is accepted. On success the new
    /// configuration is persisted and `ConfigChanged(Some(param))` published.
    pub fn update<F>(&self, param: ConfigParam, apply: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut ServerConfig),
    {
        let mut next = ServerConfig::clone(&self.current.load());
        apply(&mut next);
        validate_config(&next).map_err(ConfigError::Validation)?;

        if *self.current.load_full() == next {
            return Ok(());
        }

        let text = render_config(&next)?;
        self.current.store(Arc::new(next));
        self.persist(text);

        tracing::info!(param = ?param, "Configuration updated");
        self.bus.publish(SystemEvent::ConfigChanged(Some(param)));
        Ok(())
    }

    /// Replace the whole configuration (file reload).
    ///
    /// Returns `false` when the new configuration equals the current one.
    pub fn replace(&self, config: ServerConfig) -> bool {
        if *self.current.load_full() == config {
            return false;
        }
        self.current.store(Arc::new(config));
        self.bus.publish(SystemEvent::ConfigChanged(None));
        true
    }

    fn persist(&self, text: String) {
        let Some(path) = self.path.clone() else {
            return;
        };

        let write = move || {
            if let Err(e) = std::fs::write(&path, text) {
                tracing::error!(path = %path.display(), error = %e, "Failed to persist configuration");
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(write);
            }
            Err(_) => write(),
        }
    }
}
