//! Out-of-band control channel
//!
//! The host sends fire-and-forget commands; a background loop applies them to
//! the cache. Both commands are idempotent.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::OfflineCache;

const CONTROL_CHANNEL_CAPACITY: usize = 16;

/// `{"type":"ForceActivate"}` or `{"type":"ClearCache"}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    ForceActivate,
    ClearCache,
}

/// Sending side, cheap to clone
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<ControlMessage>,
}

impl ControlHandle {
    pub fn channel() -> (Self, mpsc::Receiver<ControlMessage>) {
        let (tx, rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        (Self { tx }, rx)
    }

    /// Queue a command without waiting. Returns `false` if it was dropped
    /// because the queue is full or the loop has stopped.
    pub fn send(&self, message: ControlMessage) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(e) => {
                warn!(?message, error = %e, "Control message dropped");
                false
            }
        }
    }
}

/// Apply control messages until every [`ControlHandle`] is dropped
pub async fn run_control_loop(cache: Arc<OfflineCache>, mut rx: mpsc::Receiver<ControlMessage>) {
    info!("Control loop started");
    while let Some(message) = rx.recv().await {
        debug!(?message, "Control message received");
        if let Err(e) = cache.apply(message).await {
            warn!(?message, error = %e, "Control message failed");
        }
    }
    info!("Control loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CacheConfig;
    use crate::generation::Phase;
    use crate::store::{EntryStore, MemoryStore};
    use crate::types::{CachedResponse, StoredEntry};

    #[test]
    fn test_message_json_shape() {
        let json = serde_json::to_string(&ControlMessage::ForceActivate).unwrap();
        assert_eq!(json, r#"{"type":"ForceActivate"}"#);

        let parsed: ControlMessage = serde_json::from_str(r#"{"type":"ClearCache"}"#).unwrap();
        assert_eq!(parsed, ControlMessage::ClearCache);

        assert!(serde_json::from_str::<ControlMessage>(r#"{"type":"Reboot"}"#).is_err());
    }

    #[tokio::test]
    async fn test_send_after_loop_stopped_is_dropped() {
        let (handle, rx) = ControlHandle::channel();
        drop(rx);
        assert!(!handle.send(ControlMessage::ClearCache));
    }

    #[tokio::test]
    async fn test_loop_applies_messages() {
        let store = Arc::new(MemoryStore::new());
        store.open_namespace("v1").await.unwrap();
        let entry = StoredEntry::exempt(CachedResponse::new(200, "x"));
        store.put("v2", "GET /", &entry).await.unwrap();

        let config = CacheConfig {
            version: "v2".to_string(),
            ..CacheConfig::default()
        };
        let cache = Arc::new(OfflineCache::new(store.clone(), config).unwrap());

        let (handle, rx) = ControlHandle::channel();
        let worker = tokio::spawn(run_control_loop(cache.clone(), rx));

        assert!(handle.send(ControlMessage::ForceActivate));
        assert!(handle.send(ControlMessage::ClearCache));
        assert!(handle.send(ControlMessage::ForceActivate));
        drop(handle);
        worker.await.unwrap();

        assert_eq!(cache.phase(), Phase::Active);
        let names = store.list_namespaces().await.unwrap();
        assert!(!names.contains("v1"));
        assert!(names.contains("v2"));
        assert_eq!(store.entry_count("v2").await, 0);
    }
}
