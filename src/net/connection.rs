//! Per-connection identity, context and lifetime tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Count live handlers so shutdown can wait for them
//! - Carry the read-only settings and the terminate signal into each handler

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::http::ProxySettings;
use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

const IDLE_POLL: Duration = Duration::from_millis(25);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Tracks live connection handlers for shutdown.
///
/// The terminate channel flips to `true` once, when a drain deadline passes
/// and the remaining handlers must be cut off.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    /// Current count of live handlers.
    active_count: Arc<AtomicU64>,
    terminate_tx: Arc<watch::Sender<bool>>,
    terminate_rx: watch::Receiver<bool>,
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            active_count: Arc::new(AtomicU64::new(0)),
            terminate_tx: Arc::new(tx),
            terminate_rx: rx,
        }
    }

    /// Record a new live handler. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        metrics::connection_opened();
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
        }
    }

    /// Get current live handler count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until every handler has finished, up to `limit`.
    ///
    /// Returns `true` if the count reached zero in time.
    pub async fn wait_idle(&self, limit: Duration) -> bool {
        let wait = async {
            while self.active_count() > 0 {
                tokio::time::sleep(IDLE_POLL).await;
            }
        };
        tokio::time::timeout(limit, wait).await.is_ok()
    }

    /// Tell every live handler to close its sockets now.
    pub fn terminate_all(&self) {
        self.terminate_tx.send_replace(true);
    }

    /// Clone the terminate receiver for use in a handler.
    pub fn terminate_receiver(&self) -> watch::Receiver<bool> {
        self.terminate_rx.clone()
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that tracks a handler's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        metrics::connection_closed();
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

/// Everything a handler needs besides its socket.
#[derive(Debug)]
pub struct ConnectionContext {
    guard: ConnectionGuard,
    peer: SocketAddr,
    settings: Arc<ProxySettings>,
    terminate: watch::Receiver<bool>,
}

impl ConnectionContext {
    pub fn new(peer: SocketAddr, settings: Arc<ProxySettings>, tracker: &ConnectionTracker) -> Self {
        Self {
            guard: tracker.track(),
            peer,
            settings,
            terminate: tracker.terminate_receiver(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.guard.id()
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn settings(&self) -> &ProxySettings {
        &self.settings
    }

    /// Resolves once the handler has been told to terminate.
    ///
    /// Never resolves if the tracker went away without terminating.
    pub async fn terminated(&self) {
        let mut rx = self.terminate.clone();
        let sender_gone = rx.wait_for(|terminate| *terminate).await.is_err();
        if sender_gone {
            std::future::pending::<()>().await;
        }
    }
}
