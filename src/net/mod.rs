//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → axum / hyper (HTTP/1.1 parsing, upgrades)
//!     → connection.rs (identity and state of each reactor connection)
//!
//! Connection States:
//!     New → Serving | Upgrading → Closed
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Permit travels with the socket and is released when hyper drops it
//! - No TLS: the console is served on the local network only

pub mod connection;
pub mod listener;

pub use connection::{ConnectionId, ConnectionState};
pub use listener::{BoundedListener, ListenerError};
