//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Device subsystems / signals.rs
//!     → EventBus::publish(SystemEvent)
//!     → HttpServer (NetworkAvailable / NetworkStopped / Shutdown)
//!     → Reactor   (ConfigChanged / ConfigMounted)
//! ```
//!
//! # Design Decisions
//! - One broadcast bus instead of per-subsystem callbacks
//! - Network events start and stop serving; they never kill established connections
//! - Ctrl-C is translated into `SystemEvent::Shutdown`

pub mod events;
pub mod signals;

pub use events::{EventBus, SystemEvent};
