//! Local forward proxy that makes outbound HTTP traffic look like it
//! originates from `localhost`.
//!
//! Plain HTTP requests get their client-identity headers rewritten before
//! being forwarded; `CONNECT` requests become opaque TLS tunnels.
//!
//! ```no_run
//! # async fn run() -> Result<(), localhost_proxy::StartError> {
//! let mut proxy = localhost_proxy::start_proxy("127.0.0.1", 8888).await?;
//! println!("use {} as your HTTP proxy", proxy.proxy_url());
//! proxy.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::schema::ProxyConfig;
pub use lifecycle::{start, start_proxy, ProxyHandle, StartError};
pub use security::{RewriteRules, SPOOFED_USER_AGENT};
