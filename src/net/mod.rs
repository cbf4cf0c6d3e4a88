//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (id, live-handler tracking, per-connection context)
//!     → Hand off to HTTP layer on its own task
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - The accept loop never reads from a client socket

pub mod connection;
pub mod listener;
