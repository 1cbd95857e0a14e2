//! Strategy selection
//!
//! Requests are classified by an explicit table of route patterns. A request
//! matching any network-first rule is network-first, regardless of where the
//! rule sits in the table; everything else (including explicit cache-first
//! rules and unmatched requests) is cache-first.

use serde::{Deserialize, Serialize};

use crate::types::RequestIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    NetworkFirst,
    CacheFirst,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutePattern {
    /// Any path segment equals this value (`api` matches `/v1/api/rates`)
    PathSegment(String),
    /// Path starts with this prefix
    PathPrefix(String),
    /// Request targets this host (a remote data backend)
    Host(String),
}

impl RoutePattern {
    pub fn matches(&self, request: &RequestIdentity) -> bool {
        match self {
            RoutePattern::PathSegment(segment) => request
                .url
                .path_segments()
                .map(|mut segments| segments.any(|s| s == segment))
                .unwrap_or(false),
            RoutePattern::PathPrefix(prefix) => request.url.path().starts_with(prefix.as_str()),
            RoutePattern::Host(host) => request
                .url
                .host_str()
                .map(|h| h.eq_ignore_ascii_case(host))
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    pub pattern: RoutePattern,
    pub strategy: Strategy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with network-first rules for the given API path segments and
    /// backend hosts
    pub fn for_api<S: AsRef<str>>(segments: &[S], hosts: &[S]) -> Self {
        let table = segments.iter().fold(Self::new(), |table, segment| {
            table.network_first(RoutePattern::PathSegment(segment.as_ref().to_string()))
        });
        hosts.iter().fold(table, |table, host| {
            table.network_first(RoutePattern::Host(host.as_ref().to_string()))
        })
    }

    pub fn network_first(self, pattern: RoutePattern) -> Self {
        self.rule(pattern, Strategy::NetworkFirst)
    }

    pub fn cache_first(self, pattern: RoutePattern) -> Self {
        self.rule(pattern, Strategy::CacheFirst)
    }

    fn rule(mut self, pattern: RoutePattern, strategy: Strategy) -> Self {
        self.rules.push(RouteRule { pattern, strategy });
        self
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// Pure classification; never fails
    pub fn classify(&self, request: &RequestIdentity) -> Strategy {
        let network_first = self
            .rules
            .iter()
            .filter(|rule| rule.strategy == Strategy::NetworkFirst)
            .any(|rule| rule.pattern.matches(request));

        if network_first {
            Strategy::NetworkFirst
        } else {
            Strategy::CacheFirst
        }
    }
}
