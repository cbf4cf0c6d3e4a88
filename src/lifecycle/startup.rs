//! Startup orchestration and the running-proxy handle.
//!
//! # Design Decisions
//! - Fail fast: invalid config and bind errors come back from `start`
//! - `start` returns only once the socket is bound, so the proxy URL is
//!   usable immediately
//! - `stop` closes the listener; in-flight connections finish on their own

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::validation::{join_errors, validate_config, ValidationError};
use crate::config::ProxyConfig;
use crate::http::ProxySettings;
use crate::lifecycle::Shutdown;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{Listener, ListenerError};

/// Time allowed for terminated handlers to unwind after a drain deadline.
const TERMINATE_GRACE: Duration = Duration::from_millis(500);

/// Why the proxy could not start.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("invalid configuration: {}", join_errors(.0))]
    InvalidConfig(Vec<ValidationError>),
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// Handle to a running proxy.
///
/// Dropping the handle without calling [`ProxyHandle::stop`] still closes
/// the listener, just without waiting for it.
#[derive(Debug)]
pub struct ProxyHandle {
    local_addr: SocketAddr,
    shutdown: Shutdown,
    tracker: ConnectionTracker,
    accept_task: Option<JoinHandle<()>>,
}

impl ProxyHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// URL to configure as an HTTP(S) proxy in a client.
    pub fn proxy_url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// Number of connection handlers still running.
    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Whether the listener is still accepting.
    pub fn is_running(&self) -> bool {
        self.accept_task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop accepting connections.
    ///
    /// Returns once the listening socket is closed. Calling this again is a
    /// no-op.
    pub async fn stop(&mut self) {
        let Some(task) = self.accept_task.take() else {
            return;
        };
        self.shutdown.trigger();
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Accept loop ended abnormally");
        }
        tracing::info!(address = %self.local_addr, "Proxy stopped");
    }

    /// Stop accepting, then wait up to `grace` for live connections.
    ///
    /// Connections still open at the deadline are closed. Returns `true` if
    /// everything finished within `grace`.
    pub async fn drain(&mut self, grace: Duration) -> bool {
        self.stop().await;
        if self.tracker.wait_idle(grace).await {
            return true;
        }
        tracing::warn!(
            active_connections = self.tracker.active_count(),
            "Drain deadline passed, closing remaining connections"
        );
        self.tracker.terminate_all();
        self.tracker.wait_idle(TERMINATE_GRACE).await;
        false
    }
}

impl Drop for ProxyHandle {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Bind the listener and start accepting on a background task.
pub async fn start(config: ProxyConfig) -> Result<ProxyHandle, StartError> {
    validate_config(&config).map_err(StartError::InvalidConfig)?;

    let listener = Listener::bind(&config.listener).await?;
    let local_addr = listener.local_addr();

    let settings = Arc::new(ProxySettings::from_config(&config));
    let shutdown = Shutdown::new();
    let tracker = ConnectionTracker::new();
    let accept_task = tokio::spawn(listener.serve(settings, tracker.clone(), shutdown.subscribe()));

    tracing::info!(address = %local_addr, "Proxy started");

    Ok(ProxyHandle {
        local_addr,
        shutdown,
        tracker,
        accept_task: Some(accept_task),
    })
}

/// Start a proxy on `bind_host:bind_port` with default settings.
pub async fn start_proxy(bind_host: &str, bind_port: u16) -> Result<ProxyHandle, StartError> {
    let mut config = ProxyConfig::default();
    config.listener.bind_host = bind_host.to_string();
    config.listener.bind_port = bind_port;
    start(config).await
}
