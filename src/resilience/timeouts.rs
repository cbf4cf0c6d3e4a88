//! Timeout enforcement for outbound connections.
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - A failed dial is never retried

use std::time::Duration;

use tokio::net::TcpStream;

use crate::http::target::Target;

/// Failure to open a connection to a target.
#[derive(Debug, thiserror::Error)]
pub enum DialError {
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
    #[error("connect failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Open a TCP connection to `target`, giving up after `limit`.
///
/// Name resolution counts against the same deadline.
pub async fn dial(target: &Target, limit: Duration) -> Result<TcpStream, DialError> {
    let stream = tokio::time::timeout(limit, TcpStream::connect((target.host.as_str(), target.port)))
        .await
        .map_err(|_| DialError::Timeout(limit))??;
    if let Err(err) = stream.set_nodelay(true) {
        tracing::debug!(upstream = %target, error = %err, "failed to set TCP_NODELAY on upstream stream");
    }
    Ok(stream)
}
