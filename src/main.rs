//! localhost-proxy
//!
//! A forward proxy that rewrites client-identity headers on plain HTTP
//! requests and tunnels CONNECT traffic untouched.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ net::listener ──▶ http::router ─┬─▶ http::forward ──▶ Target (HTTP)
//!                 (accept loop)    (parse head)  │    + security::headers
//!                                                └─▶ http::tunnel  ──▶ Target (TLS)
//!                                                     + http::relay
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use localhost_proxy::config::loader::load_config;
use localhost_proxy::config::ProxyConfig;
use localhost_proxy::lifecycle::{self, signals};
use localhost_proxy::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "localhost-proxy", version)]
#[command(about = "Forward proxy that makes traffic appear to originate from localhost", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_host
    #[arg(long)]
    bind_host: Option<String>,

    /// Override listener.bind_port
    #[arg(long)]
    bind_port: Option<u16>,

    /// Override observability.log_level
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn into_config(self) -> Result<ProxyConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ProxyConfig::default(),
        };
        if let Some(host) = self.bind_host {
            config.listener.bind_host = host;
        }
        if let Some(port) = self.bind_port {
            config.listener.bind_port = port;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;

    logging::init_logging(&config.observability.log_level);

    tracing::info!(
        bind_host = %config.listener.bind_host,
        bind_port = config.listener.bind_port,
        max_connections = config.listener.max_connections,
        connect_timeout_secs = config.timeouts.connect_secs,
        rewrite_rules = config.rewrite.rules.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let grace = Duration::from_secs(config.timeouts.shutdown_grace_secs);
    let mut proxy = lifecycle::start(config).await?;
    tracing::info!(proxy_url = %proxy.proxy_url(), "Ready");

    signals::wait_for_signal().await;

    if !proxy.drain(grace).await {
        tracing::warn!("Some connections were closed before finishing");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
