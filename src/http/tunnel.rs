//! CONNECT tunnel establishment.
//!
//! # State machine
//! ```text
//! AwaitingConnect → Connecting ─┬→ Established → Relaying → Closed
//!                               └→ Closed (after "500 Connection failed")
//! ```
//! Once established, nothing more is parsed: the client's TLS handshake
//! and everything after it pass through untouched.

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::http::relay::{self, RelayStats};
use crate::http::target::Target;
use crate::http::HandlerError;
use crate::net::connection::{ConnectionContext, ConnectionId};
use crate::observability::metrics::{self, RequestKind};
use crate::resilience::dial;

pub const CONNECT_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection established\r\n\r\n";
pub const CONNECT_FAILED: &[u8] = b"HTTP/1.1 500 Connection failed\r\n\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    AwaitingConnect,
    Connecting,
    Established,
    Relaying,
    Closed,
}

/// Tracks the tunnel's state; reaching `Closed` is guaranteed on drop.
#[derive(Debug)]
struct TunnelProgress {
    id: ConnectionId,
    state: TunnelState,
}

impl TunnelProgress {
    fn new(id: ConnectionId) -> Self {
        Self {
            id,
            state: TunnelState::AwaitingConnect,
        }
    }

    fn advance(&mut self, next: TunnelState) {
        trace!(connection_id = %self.id, from = ?self.state, to = ?next, "tunnel state");
        self.state = next;
    }
}

impl Drop for TunnelProgress {
    fn drop(&mut self) {
        if self.state != TunnelState::Closed {
            self.advance(TunnelState::Closed);
        }
    }
}

/// Open a tunnel to `target` and relay until either side is done.
///
/// `early_data` holds bytes the client sent right behind the CONNECT head;
/// they are delivered to the target before relaying starts.
pub async fn establish(
    ctx: &ConnectionContext,
    mut client: TcpStream,
    target: Target,
    early_data: Vec<u8>,
) -> Result<RelayStats, HandlerError> {
    let mut progress = TunnelProgress::new(ctx.id());

    progress.advance(TunnelState::Connecting);
    let mut upstream = match dial(&target, ctx.settings().connect_timeout).await {
        Ok(stream) => stream,
        Err(source) => {
            metrics::record_dial_failure(RequestKind::Connect);
            // Best effort; the client may already be gone.
            if client.write_all(CONNECT_FAILED).await.is_ok() {
                let _ = client.shutdown().await;
            }
            progress.advance(TunnelState::Closed);
            return Err(HandlerError::Dial { target, source });
        }
    };

    client.write_all(CONNECT_ESTABLISHED).await?;
    progress.advance(TunnelState::Established);
    debug!(connection_id = %ctx.id(), upstream = %target, "tunnel established");

    if !early_data.is_empty() {
        upstream.write_all(&early_data).await?;
    }

    progress.advance(TunnelState::Relaying);
    let mut stats = relay::relay(client, upstream, ctx).await;
    stats.client_to_target += early_data.len() as u64;
    progress.advance(TunnelState::Closed);

    metrics::record_bytes(stats.client_to_target, stats.target_to_client);
    Ok(stats)
}
