use std::env;
use std::path::PathBuf;

use chrono::Duration;
use offline_cache::{CacheConfig, RequestIdentity, RouteTable, DEFAULT_TTL_SECS};
use url::Url;

use crate::error::{ProxyError, Result};

/// Proxy configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    pub origin_url: Url,
    pub cache_dir: PathBuf,
    pub version: String,
    pub ttl_secs: i64,
    pub root_document: String,
    pub api_path_segments: Vec<String>,
    /// Network-first hosts. Every proxied request is addressed to
    /// `origin_url`, so only the origin's own host can match here; listing it
    /// makes the whole origin network-first.
    pub api_hosts: Vec<String>,
    pub bootstrap_paths: Vec<String>,
    pub activation_grace_secs: u64,
}

impl ProxyConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Parse configuration from any key lookup. Unparseable numbers fall back
    /// to their defaults; an unparseable origin URL is an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = lookup("PORT")
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(3005);

        let origin = lookup("ORIGIN_URL").unwrap_or_else(|| "http://localhost:3000".to_string());
        let origin_url = Url::parse(&origin)
            .map_err(|e| ProxyError::Config(format!("invalid ORIGIN_URL {:?}: {}", origin, e)))?;

        let cache_dir = lookup("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./cache/offline"));

        let version = lookup("CACHE_VERSION")
            .unwrap_or_else(|| concat!("offline-cache-", env!("CARGO_PKG_VERSION")).to_string());

        let ttl_secs = lookup("CACHE_TTL_SECS")
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_TTL_SECS);

        let root_document = lookup("ROOT_DOCUMENT").unwrap_or_else(|| "/".to_string());

        let api_path_segments = lookup("API_PATH_SEGMENTS")
            .map(|s| split_list(&s))
            .unwrap_or_else(|| vec!["api".to_string()]);

        let api_hosts = lookup("API_HOSTS")
            .map(|s| split_list(&s))
            .unwrap_or_default();

        let bootstrap_paths = lookup("BOOTSTRAP_PATHS")
            .map(|s| split_list(&s))
            .unwrap_or_else(|| {
                vec![
                    "/".to_string(),
                    "/manifest.json".to_string(),
                    "/favicon.ico".to_string(),
                ]
            });

        let activation_grace_secs = lookup("ACTIVATION_GRACE_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(30);

        Ok(Self {
            port,
            origin_url,
            cache_dir,
            version,
            ttl_secs,
            root_document,
            api_path_segments,
            api_hosts,
            bootstrap_paths,
            activation_grace_secs,
        })
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            version: self.version.clone(),
            ttl: Duration::seconds(self.ttl_secs),
            root_document: self.root_document.clone(),
            routes: RouteTable::for_api(&self.api_path_segments, &self.api_hosts),
        }
    }

    /// Bootstrap resources on the origin; unparseable paths are skipped
    pub fn bootstrap_requests(&self) -> Vec<RequestIdentity> {
        let base = self.origin_url.as_str().trim_end_matches('/');
        self.bootstrap_paths
            .iter()
            .filter_map(|path| {
                Url::parse(&format!("{}/{}", base, path.trim_start_matches('/'))).ok()
            })
            .map(RequestIdentity::get)
            .collect()
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}
