//! Cache generations
//!
//! Every store namespace is named after the build version that created it.
//! Installing seeds the current namespace with a bootstrap set; activating
//! deletes every namespace that belongs to another version. Requests keep
//! being served from the current namespace in every phase.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::error::Result;
use crate::fetch::Fetcher;
use crate::store::{validate_namespace, EntryStore};
use crate::types::{RequestIdentity, StoredEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    /// Not yet installed, or bootstrap seeding in progress
    Installing,
    /// Installed; older generations still present
    Waiting,
    /// Older generations purged
    Active,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub seeded: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub purged: Vec<String>,
}

pub struct GenerationManager {
    store: Arc<dyn EntryStore>,
    version: String,
    phase: Mutex<Phase>,
    activation: tokio::sync::Mutex<()>,
    force: Notify,
}

impl GenerationManager {
    pub fn new(store: Arc<dyn EntryStore>, version: &str) -> Result<Self> {
        validate_namespace(version)?;
        Ok(Self {
            store,
            version: version.to_string(),
            phase: Mutex::new(Phase::Installing),
            activation: tokio::sync::Mutex::new(()),
            force: Notify::new(),
        })
    }

    /// Namespace owned by this build
    pub fn current(&self) -> &str {
        &self.version
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
    }

    /// Seed the current namespace with bootstrap resources. Entries carry no
    /// timestamp and are therefore exempt from TTL. A resource that cannot be
    /// fetched is logged and skipped; it will be captured on first request.
    pub async fn install(
        &self,
        bootstrap: &[RequestIdentity],
        fetcher: &dyn Fetcher,
    ) -> Result<InstallReport> {
        self.store.open_namespace(&self.version).await?;

        let results = join_all(bootstrap.iter().map(|request| self.seed(request, fetcher))).await;

        let mut report = InstallReport::default();
        for (request, ok) in bootstrap.iter().zip(results) {
            if ok {
                report.seeded.push(request.url.to_string());
            } else {
                report.failed.push(request.url.to_string());
            }
        }

        {
            let mut phase = self.phase.lock().unwrap_or_else(|e| e.into_inner());
            if *phase == Phase::Installing {
                *phase = Phase::Waiting;
            }
        }

        info!(
            version = %self.version,
            seeded = report.seeded.len(),
            failed = report.failed.len(),
            "Generation installed"
        );
        Ok(report)
    }

    async fn seed(&self, request: &RequestIdentity, fetcher: &dyn Fetcher) -> bool {
        let response = match fetcher.fetch(request).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                warn!(url = %request.url, status = response.status, "Bootstrap resource not seeded");
                return false;
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Bootstrap resource not seeded");
                return false;
            }
        };

        let entry = StoredEntry::exempt(response);
        match self
            .store
            .put(&self.version, &request.cache_key(), &entry)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(url = %request.url, error = %e, "Failed to store bootstrap resource");
                false
            }
        }
    }

    /// Delete every namespace other than the current one. Safe to repeat.
    pub async fn activate(&self) -> Result<ActivationReport> {
        let _guard = self.activation.lock().await;

        self.store.open_namespace(&self.version).await?;

        let mut report = ActivationReport::default();
        for namespace in self.store.list_namespaces().await? {
            if namespace == self.version {
                continue;
            }
            match self.store.delete_namespace(&namespace).await {
                Ok(_) => {
                    info!(namespace = %namespace, "Purged stale cache generation");
                    report.purged.push(namespace);
                }
                Err(e) => warn!(namespace = %namespace, error = %e, "Failed to purge cache generation"),
            }
        }

        self.set_phase(Phase::Active);
        info!(version = %self.version, purged = report.purged.len(), "Generation activated");
        Ok(report)
    }

    /// Activate once `grace` has elapsed, or as soon as
    /// [`force_activate`](Self::force_activate) is called. Returns `None` if
    /// another path activated first.
    pub async fn activate_after(&self, grace: Duration) -> Result<Option<ActivationReport>> {
        tokio::select! {
            _ = tokio::time::sleep(grace) => {}
            _ = self.force.notified() => {}
        }

        if self.phase() == Phase::Active {
            return Ok(None);
        }
        self.activate().await.map(Some)
    }

    /// Activate now instead of waiting out the grace period. No-op when
    /// already active.
    pub async fn force_activate(&self) -> Result<Option<ActivationReport>> {
        if self.phase() == Phase::Active {
            return Ok(None);
        }
        let report = self.activate().await?;
        self.force.notify_waiters();
        Ok(Some(report))
    }

    /// Drop every entry in the current namespace and recreate it empty.
    /// Returns whether the namespace existed.
    pub async fn clear(&self) -> Result<bool> {
        let existed = self.store.delete_namespace(&self.version).await?;
        self.store.open_namespace(&self.version).await?;
        info!(version = %self.version, existed, "Cache cleared");
        Ok(existed)
    }
}
