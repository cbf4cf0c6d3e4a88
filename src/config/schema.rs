//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the forward proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind host/port, connection limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request parsing limits.
    pub limits: LimitsConfig,

    /// Header rewrite table applied to forwarded requests.
    pub rewrite: RewriteConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Host name or IP address to bind (e.g., "127.0.0.1").
    pub bind_host: String,

    /// Port to bind. `0` lets the OS pick a free port.
    pub bind_port: u16,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl ListenerConfig {
    /// `host:port` string suitable for address resolution.
    pub fn bind_address(&self) -> String {
        if self.bind_host.contains(':') && !self.bind_host.starts_with('[') {
            format!("[{}]:{}", self.bind_host, self.bind_port)
        } else {
            format!("{}:{}", self.bind_host, self.bind_port)
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            bind_port: 8888,
            max_connections: 1024,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Target connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed for a client to send a complete request head, in seconds.
    pub client_head_secs: u64,

    /// Idle timeout while copying a plain-HTTP response, in seconds.
    pub idle_secs: u64,

    /// Grace period for in-flight connections on shutdown, in seconds.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            client_head_secs: 30,
            idle_secs: 60,
            shutdown_grace_secs: 5,
        }
    }
}

/// Limits applied while reading a request head.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum size of request line plus header block, in bytes.
    pub max_head_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_head_bytes: 64 * 1024,
        }
    }
}

/// A single header rewrite rule.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RewriteRuleConfig {
    /// Header name in the casing that is emitted.
    pub name: String,

    /// Replacement value.
    pub value: String,

    /// Append the header when the request does not carry it.
    #[serde(default = "default_append")]
    pub append_if_missing: bool,
}

fn default_append() -> bool {
    true
}

/// Header rewrite table.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Rules in the order missing headers are appended.
    pub rules: Vec<RewriteRuleConfig>,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            rules: crate::security::headers::default_rule_configs(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
