//! File-backed entry store
//!
//! Layout: `<root>/<namespace>/<sha256(key)>.json`. Each file holds the key
//! and its [`StoredEntry`]. Writes land in a uniquely named temp file first
//! and are renamed into place, so a write that is cancelled or fails midway
//! never replaces the previous record with a partial one.

use std::collections::BTreeSet;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info, warn};

use super::{validate_namespace, EntryStore};
use crate::error::{CacheError, Result};
use crate::types::StoredEntry;

const ENTRY_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

#[derive(Serialize)]
struct RecordRef<'a> {
    key: &'a str,
    entry: &'a StoredEntry,
}

#[derive(Deserialize)]
struct Record {
    key: String,
    entry: StoredEntry,
}

pub struct FileStore {
    root: PathBuf,
    temp_counter: AtomicU64,
}

impl FileStore {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            temp_counter: AtomicU64::new(0),
        }
    }

    /// Ensure the root directory exists and sweep temp files left behind by
    /// writes that never completed
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;

        let mut removed = 0usize;
        for namespace in self.list_namespaces().await? {
            let mut dir = fs::read_dir(self.root.join(&namespace)).await?;
            while let Some(file) = dir.next_entry().await? {
                let path = file.path();
                if path.extension().and_then(|e| e.to_str()) == Some(TEMP_EXTENSION) {
                    if let Err(e) = fs::remove_file(&path).await {
                        warn!(path = ?path, error = %e, "Failed to remove stray temp file");
                    } else {
                        removed += 1;
                    }
                }
            }
        }

        info!(root = ?self.root, removed_temp_files = removed, "Entry store initialized");
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File name for an entry key
    pub fn entry_file_name(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        format!("{}.{}", hex::encode(hasher.finalize()), ENTRY_EXTENSION)
    }

    fn namespace_dir(&self, namespace: &str) -> Result<PathBuf> {
        validate_namespace(namespace)?;
        Ok(self.root.join(namespace))
    }

    fn temp_path(&self, target: &Path) -> PathBuf {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        target.with_extension(format!("{}-{}.{}", std::process::id(), n, TEMP_EXTENSION))
    }
}

#[async_trait]
impl EntryStore for FileStore {
    async fn put(&self, namespace: &str, key: &str, entry: &StoredEntry) -> Result<()> {
        let dir = self.namespace_dir(namespace)?;
        let path = dir.join(Self::entry_file_name(key));
        let contents = serde_json::to_vec(&RecordRef { key, entry })?;

        fs::create_dir_all(&dir)
            .await
            .map_err(|e| CacheError::StoreWrite(format!("{}: {}", dir.display(), e)))?;

        let temp_path = self.temp_path(&path);
        if let Err(e) = fs::write(&temp_path, &contents).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(CacheError::StoreWrite(format!("{}: {}", temp_path.display(), e)));
        }
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(CacheError::StoreWrite(format!("{}: {}", path.display(), e)));
        }

        debug!(namespace, key, size = contents.len(), "Stored entry");
        Ok(())
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<StoredEntry>> {
        let path = self.namespace_dir(namespace)?.join(Self::entry_file_name(key));

        let contents = match fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::StoreRead(format!("{}: {}", path.display(), e))),
        };

        let record: Record = serde_json::from_slice(&contents)?;
        if record.key != key {
            warn!(namespace, key, stored_key = %record.key, "Entry file name collision");
            return Ok(None);
        }
        Ok(Some(record.entry))
    }

    async fn open_namespace(&self, namespace: &str) -> Result<()> {
        let dir = self.namespace_dir(namespace)?;
        fs::create_dir_all(&dir).await?;
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<bool> {
        let dir = self.namespace_dir(namespace)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_namespaces(&self) -> Result<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };

        while let Some(item) = dir.next_entry().await? {
            if !item.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = item.file_name().to_str() {
                if validate_namespace(name).is_ok() {
                    names.insert(name.to_string());
                }
            }
        }
        Ok(names)
    }
}
