//! Session subsystem.
//!
//! # Data Flow
//! ```text
//! POST /login (valid credentials)
//!     → entropy.rs (request bytes + table bytes + device state → SHA-1 → id)
//!     → store.rs (first empty slot, else evict least recently used)
//!     → cookie.rs (Set-Cookie: <name>=<hex id>; path=/)
//!
//! Every request:
//!     Cookie header → cookie.rs (parse hex id) → store.rs (lookup, refresh)
//!
//! Maintenance tick:
//!     store.rs sweep_idle (drop sessions idle longer than the TTL)
//! ```
//!
//! # Design Decisions
//! - Fixed number of slots, no growth
//! - Ids are a digest of available entropy, not a CSPRNG token
//! - Expiry granularity is one maintenance tick

pub mod cookie;
pub mod entropy;
pub mod store;

pub use entropy::{DeviceState, HostDeviceState};
pub use store::{Session, SessionId, SessionStore};
