//! Network-first and cache-first request strategies
//!
//! Both strategies make at most one live attempt per request, write only 2xx
//! responses, and treat store failures as non-fatal: a failed read is a miss
//! and a failed write is logged and counted, never surfaced to the caller.

use chrono::Duration;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::fetch::Fetcher;
use crate::freshness::Freshness;
use crate::store::EntryStore;
use crate::types::{
    CacheCounters, CachedResponse, RequestIdentity, ResponseSource, Served, StoredEntry,
};

/// Everything a strategy needs for one request
pub(crate) struct StrategyContext<'a> {
    pub store: &'a dyn EntryStore,
    pub clock: &'a dyn Clock,
    pub counters: &'a CacheCounters,
    pub namespace: &'a str,
    pub ttl: Duration,
    pub root_document: &'a str,
}

impl StrategyContext<'_> {
    async fn lookup(&self, request: &RequestIdentity) -> Option<StoredEntry> {
        let key = request.cache_key();
        match self.store.get(self.namespace, &key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(namespace = self.namespace, key = %key, error = %e, "Store read failed, treating as miss");
                None
            }
        }
    }

    /// Write a live response with the current instant. Best effort.
    async fn remember(&self, request: &RequestIdentity, response: &CachedResponse) {
        let key = request.cache_key();
        let entry = StoredEntry::timestamped(response.clone(), self.clock.now());
        if let Err(e) = self.store.put(self.namespace, &key, &entry).await {
            self.counters.record_write_failure();
            warn!(namespace = self.namespace, key = %key, error = %e, "Failed to cache response");
        }
    }

    fn freshness(&self, entry: &StoredEntry) -> Freshness {
        Freshness::of(entry, self.clock.now(), self.ttl)
    }

    fn served(&self, response: CachedResponse, source: ResponseSource) -> Served {
        self.counters.record(source);
        Served::new(response, source)
    }

    fn unavailable(&self, request: &RequestIdentity) -> Served {
        let served = Served::unavailable(request);
        self.counters.record(served.source);
        served
    }
}

/// Prefer the origin; fall back to a cached entry only if it carries a
/// timestamp that is still within the TTL.
pub(crate) async fn network_first(
    ctx: &StrategyContext<'_>,
    request: &RequestIdentity,
    fetcher: &dyn Fetcher,
) -> Served {
    let failed_live = match fetcher.fetch(request).await {
        Ok(response) if response.is_success() => {
            ctx.remember(request, &response).await;
            return ctx.served(response, ResponseSource::Network);
        }
        Ok(response) => {
            debug!(url = %request.url, status = response.status, "Origin returned non-success, trying cache");
            Some(response)
        }
        Err(e) => {
            debug!(url = %request.url, error = %e, "Live fetch failed, trying cache");
            None
        }
    };

    if let Some(entry) = ctx.lookup(request).await {
        if ctx.freshness(&entry) == Freshness::Fresh {
            return ctx.served(entry.response, ResponseSource::Cache);
        }
    }

    match failed_live {
        Some(response) => ctx.served(response, ResponseSource::Network),
        None => ctx.unavailable(request),
    }
}

/// Serve fresh or exempt entries without touching the network; otherwise
/// refresh, falling back to the stale entry, then the root document for
/// navigations.
pub(crate) async fn cache_first(
    ctx: &StrategyContext<'_>,
    request: &RequestIdentity,
    fetcher: &dyn Fetcher,
) -> Served {
    let cached = ctx.lookup(request).await;

    if let Some(entry) = &cached {
        if ctx.freshness(entry).is_servable() {
            return ctx.served(entry.response.clone(), ResponseSource::Cache);
        }
    }
    ctx.counters.record_miss();

    let failed_live = match fetcher.fetch(request).await {
        Ok(response) if response.is_success() => {
            ctx.remember(request, &response).await;
            return ctx.served(response, ResponseSource::Network);
        }
        Ok(response) => {
            debug!(url = %request.url, status = response.status, "Refresh returned non-success");
            Some(response)
        }
        Err(e) => {
            debug!(url = %request.url, error = %e, "Refresh failed");
            None
        }
    };

    if let Some(entry) = cached {
        return ctx.served(entry.response, ResponseSource::StaleCache);
    }

    if request.navigation {
        let root = request.with_path(ctx.root_document);
        if let Some(entry) = ctx.lookup(&root).await {
            return ctx.served(entry.response, ResponseSource::RootFallback);
        }
    }

    match failed_live {
        Some(response) => ctx.served(response, ResponseSource::Network),
        None => ctx.unavailable(request),
    }
}
