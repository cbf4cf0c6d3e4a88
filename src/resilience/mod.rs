//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Connection to target:
//!     → timeouts.rs (bounded dial; failure ends the handler)
//! ```
//!
//! # Design Decisions
//! - Every outbound dial has a deadline
//! - No retries, backoff or circuit breaking: a proxied connection either
//!   reaches its target on the first attempt or is dropped

pub mod timeouts;

pub use timeouts::{dial, DialError};
