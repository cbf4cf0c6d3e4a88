//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and the rewrite
//! table. All errors are collected rather than stopping at the first.

use crate::config::schema::ProxyConfig;
use crate::http::request::is_token;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.bind_host must not be empty")]
    EmptyBindHost,
    #[error("listener.max_connections must be greater than zero")]
    ZeroMaxConnections,
    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("limits.max_head_bytes must be at least {min} (got {actual})")]
    HeadLimitTooSmall { min: usize, actual: usize },
    #[error("rewrite rule name {0:?} is not a valid header name")]
    InvalidRuleName(String),
    #[error("rewrite rule {0:?} has a value containing CR or LF")]
    InvalidRuleValue(String),
    #[error("rewrite rule {0:?} is defined more than once")]
    DuplicateRule(String),
}

/// Smallest head limit that still fits a realistic request line.
pub const MIN_HEAD_BYTES: usize = 1024;

/// Render a list of validation errors on one line.
pub fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_host.trim().is_empty() {
        errors.push(ValidationError::EmptyBindHost);
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }

    let timeouts = &config.timeouts;
    for (name, value) in [
        ("connect_secs", timeouts.connect_secs),
        ("client_head_secs", timeouts.client_head_secs),
        ("idle_secs", timeouts.idle_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout(name));
        }
    }

    if config.limits.max_head_bytes < MIN_HEAD_BYTES {
        errors.push(ValidationError::HeadLimitTooSmall {
            min: MIN_HEAD_BYTES,
            actual: config.limits.max_head_bytes,
        });
    }

    let mut seen: Vec<String> = Vec::new();
    for rule in &config.rewrite.rules {
        if !is_token(&rule.name) {
            errors.push(ValidationError::InvalidRuleName(rule.name.clone()));
        }
        if rule.value.contains(['\r', '\n']) {
            errors.push(ValidationError::InvalidRuleValue(rule.name.clone()));
        }
        let lower = rule.name.to_ascii_lowercase();
        if seen.contains(&lower) {
            errors.push(ValidationError::DuplicateRule(rule.name.clone()));
        } else {
            seen.push(lower);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
