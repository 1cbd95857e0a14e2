//! Interception hook tying routes, strategies and generations together

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Duration;
use futures::FutureExt;
use tracing::{debug, error};

use crate::clock::{Clock, SystemClock};
use crate::control::ControlMessage;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::freshness::default_ttl;
use crate::generation::{ActivationReport, GenerationManager, InstallReport, Phase};
use crate::routes::{RouteTable, Strategy};
use crate::store::EntryStore;
use crate::strategy::{self, StrategyContext};
use crate::types::{CacheCounters, CacheStats, RequestIdentity, ResponseSource, Served};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Build version; names the current store namespace
    pub version: String,
    /// Shared by every timestamped entry
    pub ttl: Duration,
    /// Path of the document served to navigations that cannot be answered
    pub root_document: String,
    pub routes: RouteTable,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version: concat!("offline-cache-", env!("CARGO_PKG_VERSION")).to_string(),
            ttl: default_ttl(),
            root_document: "/".to_string(),
            routes: RouteTable::for_api(&["api"], &[]),
        }
    }
}

pub struct OfflineCache {
    store: Arc<dyn EntryStore>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    generations: GenerationManager,
    counters: CacheCounters,
}

impl OfflineCache {
    pub fn new(store: Arc<dyn EntryStore>, config: CacheConfig) -> Result<Self> {
        Self::with_clock(store, Arc::new(SystemClock), config)
    }

    pub fn with_clock(
        store: Arc<dyn EntryStore>,
        clock: Arc<dyn Clock>,
        config: CacheConfig,
    ) -> Result<Self> {
        let generations = GenerationManager::new(store.clone(), &config.version)?;
        Ok(Self {
            store,
            clock,
            config,
            generations,
            counters: CacheCounters::default(),
        })
    }

    pub fn version(&self) -> &str {
        self.generations.current()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.generations.phase()
    }

    pub fn generations(&self) -> &GenerationManager {
        &self.generations
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    pub fn classify(&self, request: &RequestIdentity) -> Strategy {
        self.config.routes.classify(request)
    }

    fn context(&self) -> StrategyContext<'_> {
        StrategyContext {
            store: self.store.as_ref(),
            clock: self.clock.as_ref(),
            counters: &self.counters,
            namespace: self.generations.current(),
            ttl: self.config.ttl,
            root_document: &self.config.root_document,
        }
    }

    /// Interception hook. Always produces a response: live, cached, or the
    /// synthetic unavailable result. Non-GET requests bypass the cache. If
    /// strategy code panics, the request falls through to `fetcher`.
    pub async fn handle(&self, request: &RequestIdentity, fetcher: &dyn Fetcher) -> Served {
        if !request.is_read_only() {
            return self.forward(request, fetcher).await;
        }

        let outcome = AssertUnwindSafe(self.dispatch(request, fetcher))
            .catch_unwind()
            .await;

        match outcome {
            Ok(served) => served,
            Err(_) => {
                error!(url = %request.url, "Cache strategy panicked, forwarding request");
                self.forward(request, fetcher).await
            }
        }
    }

    async fn dispatch(&self, request: &RequestIdentity, fetcher: &dyn Fetcher) -> Served {
        let strategy = self.classify(request);
        debug!(url = %request.url, ?strategy, "Intercepted request");
        match strategy {
            Strategy::NetworkFirst => self.network_first(request, fetcher).await,
            Strategy::CacheFirst => self.cache_first(request, fetcher).await,
        }
    }

    async fn forward(&self, request: &RequestIdentity, fetcher: &dyn Fetcher) -> Served {
        match fetcher.fetch(request).await {
            Ok(response) => Served::new(response, ResponseSource::Passthrough),
            Err(e) => {
                debug!(url = %request.url, error = %e, "Forwarded request failed");
                let served = Served::unavailable(request);
                self.counters.record(served.source);
                served
            }
        }
    }

    pub async fn network_first(&self, request: &RequestIdentity, fetcher: &dyn Fetcher) -> Served {
        strategy::network_first(&self.context(), request, fetcher).await
    }

    pub async fn cache_first(&self, request: &RequestIdentity, fetcher: &dyn Fetcher) -> Served {
        strategy::cache_first(&self.context(), request, fetcher).await
    }

    /// Install hook
    pub async fn install(
        &self,
        bootstrap: &[RequestIdentity],
        fetcher: &dyn Fetcher,
    ) -> Result<InstallReport> {
        self.generations.install(bootstrap, fetcher).await
    }

    /// Activate hook
    pub async fn activate(&self) -> Result<ActivationReport> {
        self.generations.activate().await
    }

    /// Apply one control command
    pub async fn apply(&self, message: ControlMessage) -> Result<()> {
        match message {
            ControlMessage::ForceActivate => {
                self.generations.force_activate().await?;
            }
            ControlMessage::ClearCache => {
                self.generations.clear().await?;
            }
        }
        Ok(())
    }
}
