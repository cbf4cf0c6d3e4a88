//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Every handler produces:
//!     → logging.rs (structured tracing events keyed by connection_id)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Prometheus scrape endpoint (optional)
//! ```

pub mod logging;
pub mod metrics;
