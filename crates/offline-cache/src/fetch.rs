//! Forward function: the live fetch to the origin

use std::future::Future;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CachedResponse, RequestIdentity};

/// Performs one live fetch. A transport failure is `Err`; any HTTP status,
/// including 5xx, is `Ok`. Implementations must return either the complete
/// body or an error, never a truncated payload.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &RequestIdentity) -> Result<CachedResponse>;
}

/// Adapts an async closure into a [`Fetcher`]
pub struct FnFetcher<F>(F);

pub fn from_fn<F, Fut>(f: F) -> FnFetcher<F>
where
    F: Fn(RequestIdentity) -> Fut + Send + Sync,
    Fut: Future<Output = Result<CachedResponse>> + Send,
{
    FnFetcher(f)
}

#[async_trait]
impl<F, Fut> Fetcher for FnFetcher<F>
where
    F: Fn(RequestIdentity) -> Fut + Send + Sync,
    Fut: Future<Output = Result<CachedResponse>> + Send,
{
    async fn fetch(&self, request: &RequestIdentity) -> Result<CachedResponse> {
        (self.0)(request.clone()).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::error::CacheError;

    /// Scripted origin that counts calls. Unscripted URLs fail with a
    /// transport error.
    #[derive(Default)]
    pub struct ScriptedFetcher {
        responses: Mutex<HashMap<String, CachedResponse>>,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(&self, url: &str, response: CachedResponse) {
            self.responses
                .lock()
                .unwrap()
                .insert(url.to_string(), response);
        }

        pub fn go_offline(&self) {
            self.responses.lock().unwrap().clear();
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, request: &RequestIdentity) -> Result<CachedResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .get(request.url.as_str())
                .cloned()
                .ok_or_else(|| CacheError::Transport("connection refused".to_string()))
        }
    }
}
