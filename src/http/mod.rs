//! HTTP/1.x proxy protocol handling.
//!
//! # Data Flow
//! ```text
//! Accepted client socket
//!     → request.rs (read + parse the request head)
//!     → router.rs (CONNECT or plain HTTP?)
//!         → tunnel.rs (200/500, then relay.rs byte pipe)
//!         → forward.rs (rewrite headers, send, copy response back)
//!           + body.rs (where a chunked request body ends)
//!     → both sockets dropped when the handler returns
//! ```

use std::time::Duration;

use crate::config::ProxyConfig;
use crate::resilience::DialError;
use crate::security::RewriteRules;

pub mod body;
pub mod forward;
pub mod relay;
pub mod request;
pub mod router;
pub mod target;
pub mod tunnel;

pub use request::{Header, ParseError, RequestHead};
pub use router::{route, serve_connection, Route};
pub use target::Target;

/// Read-only settings shared by every connection handler.
#[derive(Debug, Clone)]
pub struct ProxySettings {
    pub connect_timeout: Duration,
    pub head_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_head_bytes: usize,
    pub rules: RewriteRules,
}

impl ProxySettings {
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.timeouts.connect_secs),
            head_timeout: Duration::from_secs(config.timeouts.client_head_secs),
            idle_timeout: Duration::from_secs(config.timeouts.idle_secs),
            max_head_bytes: config.limits.max_head_bytes,
            rules: RewriteRules::from_config(&config.rewrite.rules),
        }
    }
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self::from_config(&ProxyConfig::default())
    }
}

/// Why a connection handler stopped early.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("bad request: {0}")]
    Parse(#[from] ParseError),
    #[error("cannot reach {target}: {source}")]
    Dial {
        target: Target,
        #[source]
        source: DialError,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
