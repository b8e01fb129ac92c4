//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! HttpRequest (uri)
//!     → registry.rs (exact-path lookup)
//!     → Return: PageDescriptor or not found (static file fallback)
//!
//! Registration:
//!     standard pages at reactor start, in a fixed order
//!     other subsystems through ReactorHandle::register_page
//! ```
//!
//! # Design Decisions
//! - Exact string match only, no patterns, no trailing-slash normalization
//! - Duplicates are rejected, never overwritten (first registration wins)
//! - Owned by the reactor thread; no locking

pub mod registry;

pub use registry::{PageAuth, PageDescriptor, PageHandler, PageMenu, PageRegistry};
