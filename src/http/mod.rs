//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, exchange ↔ reactor connection)
//!     → reactor (pages, sessions, auth)
//!     → context.rs (page handler view of one request)
//!     → stream.rs (frames → response body) / websocket.rs (frames ↔ socket)
//!     → files.rs (static fallback)
//! ```

pub mod context;
pub mod files;
pub mod server;
pub mod stream;
pub mod websocket;

pub use context::RequestContext;
pub use server::{HttpServer, ServerError};
pub use websocket::{ClientCounter, TelemetryFeed, TelemetryPool, WebSocketHandler, WebSocketPool};
