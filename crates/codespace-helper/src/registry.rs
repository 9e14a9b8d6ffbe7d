//! Process-wide tenant registry.
//!
//! One entry per tenant, created lazily and never evicted, so repeated
//! operations on the same tenant reuse a single entry and a single operation
//! lock. The registry map has its own coarse lock held only across
//! insert/lookup; per-tenant serialization lives on the entries themselves.

use crate::error::{Error, Result};
use crate::gateway::ClusterGateway;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, warn};

/// Lifecycle states of a tenant's codespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantStatus {
    None,
    Creating,
    Created,
    Deleting,
    Deleted,
    Errored,
}

/// A tenant's lifecycle entry.
///
/// `status` is only ever mutated while the entry's operation lock is held.
pub struct TenantEntry {
    name: String,
    status: RwLock<TenantStatus>,
    op: Mutex<()>,
}

impl TenantEntry {
    fn new(name: &str, status: TenantStatus) -> Self {
        Self {
            name: name.to_string(),
            status: RwLock::new(status),
            op: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn status(&self) -> TenantStatus {
        *self.status.read().await
    }

    pub(crate) async fn set_status(&self, status: TenantStatus) {
        debug!("tenant {}: status -> {status:?}", self.name);
        *self.status.write().await = status;
    }

    /// Claim the entry for an exclusive create/delete operation.
    ///
    /// Never blocks: a second request while an operation is in flight observes
    /// [`Error::AlreadyInProgress`] instead of queueing behind it.
    pub(crate) fn try_begin(&self) -> Result<MutexGuard<'_, ()>> {
        self.op
            .try_lock()
            .map_err(|_| Error::AlreadyInProgress(self.name.clone()))
    }
}

/// Map of tenant name to lifecycle entry.
#[derive(Default)]
pub struct TenantRegistry {
    entries: RwLock<HashMap<String, Arc<TenantEntry>>>,
}

impl TenantRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the tenant's entry, creating and seeding it on first reference.
    ///
    /// Seeding performs one remote phase check: an active namespace seeds
    /// `Created`, anything else seeds `None`. A lookup failure also seeds
    /// `None` — absence of prior state is always a safe default. The remote
    /// call happens outside the map lock so first-requests for different
    /// tenants never serialize on each other.
    pub async fn get_or_create(
        &self,
        gateway: &dyn ClusterGateway,
        name: &str,
    ) -> Arc<TenantEntry> {
        if let Some(entry) = self.entries.read().await.get(name) {
            return entry.clone();
        }

        let seeded = match gateway.get_namespace(name).await {
            Ok(Some(ns)) => {
                let active = ns.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Active");
                if active {
                    TenantStatus::Created
                } else {
                    TenantStatus::None
                }
            }
            Ok(None) => TenantStatus::None,
            Err(e) => {
                warn!("tenant {name}: seeding lookup failed, assuming no prior state: {e}");
                TenantStatus::None
            }
        };

        let mut entries = self.entries.write().await;
        entries
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!("tenant {name}: registered with status {seeded:?}");
                Arc::new(TenantEntry::new(name, seeded))
            })
            .clone()
    }

    /// Entry lookup without creation, for status probes.
    pub async fn get(&self, name: &str) -> Option<Arc<TenantEntry>> {
        self.entries.read().await.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockClusterGateway;
    use k8s_openapi::api::core::v1::{Namespace, NamespaceStatus};

    fn active_namespace() -> Namespace {
        Namespace {
            status: Some(NamespaceStatus {
                phase: Some("Active".to_string()),
                ..NamespaceStatus::default()
            }),
            ..Namespace::default()
        }
    }

    #[tokio::test]
    async fn test_seeds_created_from_an_active_remote_namespace() {
        let mut gateway = MockClusterGateway::new();
        gateway
            .expect_get_namespace()
            .times(1)
            .returning(|_| Ok(Some(active_namespace())));

        let registry = TenantRegistry::new();
        let entry = registry.get_or_create(&gateway, "alice").await;
        assert_eq!(entry.status().await, TenantStatus::Created);
    }

    #[tokio::test]
    async fn test_seeds_none_when_namespace_is_absent() {
        let mut gateway = MockClusterGateway::new();
        gateway.expect_get_namespace().returning(|_| Ok(None));

        let registry = TenantRegistry::new();
        let entry = registry.get_or_create(&gateway, "alice").await;
        assert_eq!(entry.status().await, TenantStatus::None);
    }

    #[tokio::test]
    async fn test_seeding_lookup_failure_defaults_to_none() {
        let mut gateway = MockClusterGateway::new();
        gateway
            .expect_get_namespace()
            .returning(|_| Err(Error::RemoteFailure("api unavailable".into())));

        let registry = TenantRegistry::new();
        let entry = registry.get_or_create(&gateway, "alice").await;
        assert_eq!(entry.status().await, TenantStatus::None);
    }

    #[tokio::test]
    async fn test_one_entry_per_tenant_for_the_process_lifetime() {
        let mut gateway = MockClusterGateway::new();
        gateway
            .expect_get_namespace()
            .times(1)
            .returning(|_| Ok(None));

        let registry = TenantRegistry::new();
        let first = registry.get_or_create(&gateway, "alice").await;
        first.set_status(TenantStatus::Deleted).await;

        // The second reference reuses the entry; no new remote lookup.
        let second = registry.get_or_create(&gateway, "alice").await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.status().await, TenantStatus::Deleted);
    }

    #[tokio::test]
    async fn test_second_claim_observes_in_progress() {
        let entry = TenantEntry::new("alice", TenantStatus::None);
        let guard = entry.try_begin().expect("first claim succeeds");
        assert!(matches!(
            entry.try_begin(),
            Err(Error::AlreadyInProgress(_))
        ));
        drop(guard);
        assert!(entry.try_begin().is_ok());
    }
}
