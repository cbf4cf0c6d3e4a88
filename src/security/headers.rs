//! Client-identity header rewriting.
//!
//! # Responsibilities
//! - Overwrite X-Forwarded-*, X-Real-IP and friends with loopback values
//! - Replace the User-Agent with a fixed browser string
//! - Append identity headers the client did not send
//!
//! # Design Decisions
//! - Pure transform over a parsed header list; no I/O
//! - Names match case-insensitively, output uses the rule's casing
//! - Unrelated headers keep their position; nothing is dropped
//! - Applying the rewrite twice yields the same headers as applying it once

use crate::config::RewriteRuleConfig;
use crate::http::request::Header;

/// User-Agent sent on every forwarded request that carries one.
pub const SPOOFED_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const LOOPBACK_HEADERS: [(&str, &str); 8] = [
    ("X-Forwarded-For", "127.0.0.1"),
    ("X-Real-IP", "127.0.0.1"),
    ("X-Forwarded-Host", "localhost"),
    ("X-Forwarded-Proto", "http"),
    ("X-Forwarded-Port", "80"),
    ("X-Original-Host", "localhost"),
    ("Remote-Addr", "127.0.0.1"),
    ("Client-IP", "127.0.0.1"),
];

/// The built-in rewrite table as config entries.
pub fn default_rule_configs() -> Vec<RewriteRuleConfig> {
    let mut rules: Vec<RewriteRuleConfig> = LOOPBACK_HEADERS
        .iter()
        .map(|(name, value)| RewriteRuleConfig {
            name: (*name).to_string(),
            value: (*value).to_string(),
            append_if_missing: true,
        })
        .collect();
    // Only replaced when present, never added.
    rules.push(RewriteRuleConfig {
        name: "User-Agent".to_string(),
        value: SPOOFED_USER_AGENT.to_string(),
        append_if_missing: false,
    });
    rules
}

/// One header override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRule {
    name: String,
    value: String,
    append_if_missing: bool,
}

impl RewriteRule {
    pub fn new(name: impl Into<String>, value: impl Into<String>, append_if_missing: bool) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            append_if_missing,
        }
    }

    fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    fn to_header(&self) -> Header {
        Header::new(self.name.clone(), self.value.clone())
    }
}

/// Read-only header rewrite table shared by all handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRules {
    rules: Vec<RewriteRule>,
}

impl RewriteRules {
    pub fn new(rules: Vec<RewriteRule>) -> Self {
        Self { rules }
    }

    /// Build the table from validated config entries.
    pub fn from_config(rules: &[RewriteRuleConfig]) -> Self {
        Self::new(
            rules
                .iter()
                .map(|r| RewriteRule::new(r.name.clone(), r.value.clone(), r.append_if_missing))
                .collect(),
        )
    }

    fn find(&self, name: &str) -> Option<(usize, &RewriteRule)> {
        self.rules.iter().enumerate().find(|(_, rule)| rule.matches(name))
    }

    /// Rewrite a header list.
    ///
    /// Matching headers are replaced in place. Rules flagged
    /// `append_if_missing` that matched nothing are appended at the end, in
    /// rule order.
    pub fn rewrite(&self, headers: &[Header]) -> Vec<Header> {
        let mut seen = vec![false; self.rules.len()];
        let mut out = Vec::with_capacity(headers.len() + self.rules.len());

        for header in headers {
            match self.find(&header.name) {
                Some((idx, rule)) => {
                    seen[idx] = true;
                    out.push(rule.to_header());
                }
                None => out.push(header.clone()),
            }
        }

        for (rule, seen) in self.rules.iter().zip(seen) {
            if !seen && rule.append_if_missing {
                out.push(rule.to_header());
            }
        }

        out
    }
}

impl Default for RewriteRules {
    fn default() -> Self {
        Self::from_config(&default_rule_configs())
    }
}
