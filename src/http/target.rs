//! Destination host/port extraction from request targets.

use std::fmt;

use url::{Host, Url};

use crate::http::request::ParseError;

pub const DEFAULT_HTTP_PORT: u16 = 80;
pub const DEFAULT_CONNECT_PORT: u16 = 443;

/// A dialable destination. IPv6 hosts are stored without brackets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Parse the `host[:port]` argument of a CONNECT request.
pub fn parse_connect_target(target: &str) -> Result<Target, ParseError> {
    parse_authority(target, DEFAULT_CONNECT_PORT)
}

/// Resolve where a plain-HTTP request should be sent.
///
/// Accepts absolute URIs, `host[:port]/path`, and origin-form targets that
/// rely on the `Host` header.
pub fn parse_forward_target(target: &str, host_header: Option<&str>) -> Result<Target, ParseError> {
    if target.contains("://") {
        return parse_absolute(target);
    }

    let authority = target.split(['/', '?']).next().unwrap_or_default();
    if !authority.is_empty() {
        return parse_authority(authority, DEFAULT_HTTP_PORT);
    }

    match host_header {
        Some(host) if !host.trim().is_empty() => parse_authority(host.trim(), DEFAULT_HTTP_PORT),
        _ => Err(ParseError::MissingHost),
    }
}

fn parse_absolute(target: &str) -> Result<Target, ParseError> {
    let url = Url::parse(target).map_err(|_| ParseError::InvalidTarget(target.to_string()))?;
    let host = match url.host() {
        Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => addr.to_string(),
        _ => return Err(ParseError::MissingHost),
    };
    // The scheme never picks the port; only an explicit one overrides 80.
    // `url` hides an explicit port equal to the scheme default, so fall back
    // to the raw authority text.
    let port = match url.port() {
        Some(port) => port,
        None => parse_authority(raw_authority(target), DEFAULT_HTTP_PORT)?.port,
    };
    Ok(Target::new(host, port))
}

fn raw_authority(target: &str) -> &str {
    let rest = target.split_once("://").map_or(target, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    authority.rsplit_once('@').map_or(authority, |(_, host)| host)
}

fn parse_authority(authority: &str, default_port: u16) -> Result<Target, ParseError> {
    if authority.is_empty() {
        return Err(ParseError::MissingHost);
    }
    if authority.contains('@') || authority.chars().any(char::is_whitespace) {
        return Err(ParseError::InvalidTarget(authority.to_string()));
    }

    let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| ParseError::InvalidTarget(authority.to_string()))?;
        let port = match after {
            "" => None,
            _ => Some(
                after
                    .strip_prefix(':')
                    .ok_or_else(|| ParseError::InvalidTarget(authority.to_string()))?,
            ),
        };
        (host, port)
    } else {
        match authority.split_once(':') {
            Some((_, port)) if port.contains(':') => {
                return Err(ParseError::InvalidTarget(authority.to_string()));
            }
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };

    if host.is_empty() {
        return Err(ParseError::MissingHost);
    }

    let port = match port {
        None => default_port,
        Some(raw) => match raw.parse::<u16>() {
            Ok(port) if port != 0 => port,
            _ => return Err(ParseError::InvalidPort(raw.to_string())),
        },
    };

    Ok(Target::new(host.to_ascii_lowercase(), port))
}
