//! TCP listener and accept loop.
//!
//! # Responsibilities
//! - Resolve and bind the configured address with `SO_REUSEADDR`
//! - Accept incoming TCP connections
//! - Enforce max_connections limit via semaphore
//! - Spawn one task per connection; never touch request bytes here

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{broadcast, Semaphore};

use crate::config::ListenerConfig;
use crate::http::{serve_connection, ProxySettings};
use crate::net::connection::{ConnectionContext, ConnectionTracker};

const LISTEN_BACKLOG: u32 = 1024;
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// The bind host did not resolve.
    #[error("Failed to resolve {address}: {source}")]
    Resolve {
        address: String,
        #[source]
        source: std::io::Error,
    },
    /// Failed to bind to address.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// Failed to accept connection.
    #[error("Failed to accept: {0}")]
    Accept(std::io::Error),
    /// The connection limit semaphore was closed.
    #[error("Connection limit closed")]
    LimitClosed,
}

/// A bounded TCP listener that limits concurrent connections.
///
/// Uses a semaphore to enforce `max_connections`. When the limit is reached,
/// new connections will wait until a slot becomes available.
pub struct Listener {
    /// The underlying TCP listener.
    inner: TcpListener,
    /// Address actually bound (resolves port 0).
    local_addr: SocketAddr,
    /// Semaphore to limit concurrent connections.
    connection_limit: Arc<Semaphore>,
    /// Configured maximum connections.
    max_connections: usize,
}

impl Listener {
    /// Bind to the configured address with connection limits.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let address = config.bind_address();
        let addr = tokio::net::lookup_host(&address)
            .await
            .and_then(|mut addrs| {
                addrs.next().ok_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses found")
                })
            })
            .map_err(|source| ListenerError::Resolve {
                address: address.clone(),
                source,
            })?;

        let listener = bind_reusable(addr).map_err(|source| ListenerError::Bind {
            address: addr,
            source,
        })?;

        let local_addr = listener.local_addr().map_err(|source| ListenerError::Bind {
            address: addr,
            source,
        })?;

        tracing::info!(
            address = %local_addr,
            max_connections = config.max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            local_addr,
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
            max_connections: config.max_connections,
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// This will wait if the connection limit has been reached.
    /// Returns the stream and a permit that must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        // Acquire permit first (backpressure)
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::LimitClosed)?;

        // Then accept the connection
        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        if let Err(err) = stream.set_nodelay(true) {
            tracing::debug!(peer_addr = %addr, error = %err, "failed to set TCP_NODELAY on client stream");
        }

        tracing::debug!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get current available connection slots.
    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    /// Get configured maximum connections.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Accept until `shutdown` fires, then drop the listening socket.
    ///
    /// Connections already handed to a task keep running.
    pub async fn serve(
        self,
        settings: Arc<ProxySettings>,
        tracker: ConnectionTracker,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            let accepted = tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                res = self.accept() => res,
            };

            match accepted {
                Ok((stream, peer, permit)) => {
                    let ctx = ConnectionContext::new(peer, Arc::clone(&settings), &tracker);
                    tokio::spawn(async move {
                        let _permit = permit;
                        serve_connection(stream, ctx).await;
                    });
                }
                Err(err) => {
                    tracing::error!(error = %err, "Accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }

        tracing::info!(address = %self.local_addr, "Listener closed");
    }
}

fn bind_reusable(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

/// A permit representing a connection slot.
///
/// When dropped, the connection slot is released back to the pool.
/// This ensures backpressure is maintained even if the connection handler panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}
