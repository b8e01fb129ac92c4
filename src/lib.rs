//! Embedded web administration console.

pub mod auth;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod pages;
pub mod reactor;
pub mod routing;
pub mod session;

pub use config::{ConfigStore, ServerConfig};
pub use http::{HttpServer, ServerError};
pub use lifecycle::{EventBus, SystemEvent};
pub use reactor::{Collaborators, ReactorHandle};
