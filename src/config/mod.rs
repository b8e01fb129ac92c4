//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! webconsole.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → store.rs (ArcSwap<ServerConfig>, shared by all threads)
//!
//! On change:
//!     console page → ConfigStore::update → persist → ConfigChanged(Some(param))
//!     watcher.rs detects file edit → ConfigStore::replace → ConfigChanged(None)
//!     reactor rebuilds runtime.rs (RuntimeConfig) from the new snapshot
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - The reactor keeps its own RuntimeConfig copy and never locks

pub mod loader;
pub mod runtime;
pub mod schema;
pub mod store;
pub mod validation;
pub mod watcher;

pub use loader::ConfigError;
pub use runtime::{decode_path, RuntimeConfig};
pub use schema::{ListenerConfig, ObservabilityConfig, ServerConfig};
pub use store::{ConfigParam, ConfigStore};
pub use watcher::ConfigWatcher;
