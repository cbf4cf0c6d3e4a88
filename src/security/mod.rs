//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Parsed request head (plain HTTP only):
//!     → headers.rs (replace/append client-identity headers)
//!     → Forwarded to target
//! ```
//!
//! CONNECT tunnels are never rewritten; their payload is opaque.

pub mod headers;

pub use headers::{RewriteRule, RewriteRules, SPOOFED_USER_AGENT};
