//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validate config → Bind listener → Spawn accept loop → Return handle
//!
//! Shutdown (shutdown.rs):
//!     stop() → Stop accepting → (drain) wait for handlers → force-close leftovers
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{start, start_proxy, ProxyHandle, StartError};
