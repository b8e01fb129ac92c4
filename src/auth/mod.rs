//! Authorization subsystem.
//!
//! # Data Flow
//! ```text
//! Registered page request
//!     → gate.rs (None / Cookie / FileDigest decision)
//!         Cookie:     password set? session resolved?
//!         FileDigest: digest.rs verify against the global credential
//!
//! Password change
//!     → digest.rs (regenerate or remove the global credentials file)
//! ```
//!
//! # Design Decisions
//! - Single administrative identity ("admin")
//! - No password means an open console (Cookie pages are public)
//! - Setting a password does not invalidate existing sessions

pub mod digest;
pub mod gate;

pub use digest::{Credential, ADMIN_USER};
pub use gate::{AuthDecision, AuthGate};
