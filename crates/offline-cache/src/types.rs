//! Core types for the offline cache

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ErrorKind;

/// Header attached to synthetic "nothing available offline" responses
pub const UNAVAILABLE_HEADER: &str = "x-offline-cache";

/// Canonical identity of an outbound request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestIdentity {
    pub method: String,
    pub url: Url,
    /// Document-shaped request (page navigation); eligible for the root
    /// document fallback
    #[serde(default)]
    pub navigation: bool,
}

impl RequestIdentity {
    pub fn new(method: &str, mut url: Url) -> Self {
        url.set_fragment(None);
        Self {
            method: method.to_ascii_uppercase(),
            url,
            navigation: false,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new("GET", url)
    }

    /// A GET for a page navigation
    pub fn navigate(url: Url) -> Self {
        Self {
            navigation: true,
            ..Self::get(url)
        }
    }

    pub fn parse(method: &str, url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(method, Url::parse(url)?))
    }

    /// Store key: method plus full URL. The navigation flag is not part of
    /// the identity.
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.method, self.url)
    }

    pub fn is_read_only(&self) -> bool {
        self.method == "GET"
    }

    /// Same origin, different path (query dropped)
    pub fn with_path(&self, path: &str) -> Self {
        let mut url = self.url.clone();
        url.set_path(path);
        url.set_query(None);
        Self {
            method: "GET".to_string(),
            url,
            navigation: false,
        }
    }
}

/// A complete response payload as captured from the origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    #[serde(with = "body_base64")]
    pub body: Vec<u8>,
}

impl CachedResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    /// Only 2xx responses are written to the store
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

mod body_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// One stored record: payload and its timestamp always move together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub response: CachedResponse,
    /// `None` for install-time seeded entries, which are exempt from TTL
    pub stored_at: Option<DateTime<Utc>>,
}

impl StoredEntry {
    pub fn timestamped(response: CachedResponse, stored_at: DateTime<Utc>) -> Self {
        Self {
            response,
            stored_at: Some(stored_at),
        }
    }

    pub fn exempt(response: CachedResponse) -> Self {
        Self {
            response,
            stored_at: None,
        }
    }
}

/// Where a served response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResponseSource {
    /// Live response from the origin
    Network,
    /// Fresh (or TTL-exempt) cached entry
    Cache,
    /// Expired entry served because the refresh failed
    StaleCache,
    /// Root document served in place of an unavailable navigation
    RootFallback,
    /// Nothing usable offline
    Unavailable,
    /// Not eligible for caching; forwarded untouched
    Passthrough,
}

impl ResponseSource {
    /// Value for the `X-Cache` response header
    pub fn cache_status(&self) -> &'static str {
        match self {
            ResponseSource::Network => "MISS",
            ResponseSource::Cache => "HIT",
            ResponseSource::StaleCache => "STALE",
            ResponseSource::RootFallback => "FALLBACK",
            ResponseSource::Unavailable => "OFFLINE",
            ResponseSource::Passthrough => "BYPASS",
        }
    }
}

/// Result of the interception hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub response: CachedResponse,
    pub source: ResponseSource,
}

impl Served {
    pub fn new(response: CachedResponse, source: ResponseSource) -> Self {
        Self { response, source }
    }

    /// Synthetic 503 with a fixed machine-readable body
    pub fn unavailable(request: &RequestIdentity) -> Self {
        let body = serde_json::json!({
            "error": "offline",
            "kind": ErrorKind::NoCachedData,
            "url": request.url.as_str(),
        });
        let response = CachedResponse::new(503, body.to_string())
            .with_header("content-type", "application/json")
            .with_header(UNAVAILABLE_HEADER, "unavailable");
        Self::new(response, ResponseSource::Unavailable)
    }

    pub fn is_unavailable(&self) -> bool {
        self.source == ResponseSource::Unavailable
    }
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stale_served: u64,
    pub network: u64,
    pub unavailable: u64,
    pub store_write_failures: u64,
}

/// Lock-free counters behind [`CacheStats`]
#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    stale_served: AtomicU64,
    network: AtomicU64,
    unavailable: AtomicU64,
    store_write_failures: AtomicU64,
}

impl CacheCounters {
    pub(crate) fn record(&self, source: ResponseSource) {
        let counter = match source {
            ResponseSource::Network => &self.network,
            ResponseSource::Cache => &self.hits,
            ResponseSource::StaleCache | ResponseSource::RootFallback => &self.stale_served,
            ResponseSource::Unavailable => &self.unavailable,
            ResponseSource::Passthrough => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_failure(&self) {
        self.store_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale_served: self.stale_served.load(Ordering::Relaxed),
            network: self.network.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
            store_write_failures: self.store_write_failures.load(Ordering::Relaxed),
        }
    }
}
