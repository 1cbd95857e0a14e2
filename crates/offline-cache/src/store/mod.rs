//! Entry store: persistent, namespaced key-value storage
//!
//! Each namespace is one cache generation. An entry is written as a single
//! [`StoredEntry`] record so that a payload and its timestamp can never be
//! paired across two writers. Writes are last-write-wins per key.

mod file;
mod memory;

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::{CacheError, Result};
use crate::types::StoredEntry;

pub use file::FileStore;
pub use memory::MemoryStore;

#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Insert or replace an entry, creating the namespace if needed
    async fn put(&self, namespace: &str, key: &str, entry: &StoredEntry) -> Result<()>;

    /// Missing namespaces and missing keys are both `Ok(None)`
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<StoredEntry>>;

    /// Create an empty namespace if it does not exist yet
    async fn open_namespace(&self, namespace: &str) -> Result<()>;

    /// Returns whether the namespace existed
    async fn delete_namespace(&self, namespace: &str) -> Result<bool>;

    async fn list_namespaces(&self) -> Result<BTreeSet<String>>;
}

/// Namespace names double as directory names: ASCII alphanumerics plus
/// `.`, `_` and `-`, and not `.`/`..`
pub fn validate_namespace(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidNamespace(name.to_string()))
    }
}
