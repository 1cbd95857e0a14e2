//! In-memory entry store

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{validate_namespace, EntryStore};
use crate::error::Result;
use crate::types::StoredEntry;

type Namespace = HashMap<String, StoredEntry>;

/// Process-local store; contents are lost on shutdown
#[derive(Debug, Default)]
pub struct MemoryStore {
    namespaces: RwLock<HashMap<String, Namespace>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a namespace (0 if it does not exist)
    pub async fn entry_count(&self, namespace: &str) -> usize {
        let namespaces = self.namespaces.read().await;
        namespaces.get(namespace).map(HashMap::len).unwrap_or(0)
    }
}

#[async_trait]
impl EntryStore for MemoryStore {
    async fn put(&self, namespace: &str, key: &str, entry: &StoredEntry) -> Result<()> {
        validate_namespace(namespace)?;
        let mut namespaces = self.namespaces.write().await;
        namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), entry.clone());
        Ok(())
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<StoredEntry>> {
        let namespaces = self.namespaces.read().await;
        Ok(namespaces
            .get(namespace)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn open_namespace(&self, namespace: &str) -> Result<()> {
        validate_namespace(namespace)?;
        let mut namespaces = self.namespaces.write().await;
        namespaces.entry(namespace.to_string()).or_default();
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<bool> {
        let mut namespaces = self.namespaces.write().await;
        Ok(namespaces.remove(namespace).is_some())
    }

    async fn list_namespaces(&self) -> Result<BTreeSet<String>> {
        let namespaces = self.namespaces.read().await;
        Ok(namespaces.keys().cloned().collect())
    }
}
