//! Tenant lifecycle orchestration.
//!
//! Drives the status machine `None → Creating → Created → Deleting → Deleted`
//! (with `Errored` terminal) against the cluster gateway: render, apply, wait
//! for readiness, and roll back on failure. All state transitions happen
//! under the tenant's operation lock.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::gateway::ClusterGateway;
use crate::registry::{TenantEntry, TenantRegistry, TenantStatus};
use crate::{template, wait};
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct Lifecycle {
    config: Arc<Config>,
    gateway: Arc<dyn ClusterGateway>,
    registry: Arc<TenantRegistry>,
}

impl Lifecycle {
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        gateway: Arc<dyn ClusterGateway>,
        registry: Arc<TenantRegistry>,
    ) -> Self {
        Self {
            config,
            gateway,
            registry,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn gateway(&self) -> &dyn ClusterGateway {
        self.gateway.as_ref()
    }

    /// Current lifecycle status, if the tenant has been referenced before.
    pub async fn status(&self, tenant: &str) -> Option<TenantStatus> {
        match self.registry.get(tenant).await {
            Some(entry) => Some(entry.status().await),
            None => None,
        }
    }

    /// Whether the tenant has a backing namespace, checked remotely.
    pub async fn exists(&self, tenant: &str) -> Result<bool> {
        Ok(self.gateway.get_namespace(tenant).await?.is_some())
    }

    /// One-shot readiness probe of the tenant's workload.
    pub async fn ready(&self, tenant: &str) -> Result<bool> {
        if !self.exists(tenant).await? {
            return Err(Error::NotFound(tenant.to_string()));
        }
        wait::workload_ready(self.gateway.as_ref(), &self.config, tenant).await
    }

    /// Provision the tenant's codespace.
    ///
    /// Idempotent for `Created`; a tenant whose codespace was deleted is
    /// transparently re-provisioned.
    pub async fn create(&self, tenant: &str) -> Result<()> {
        let entry = self.registry.get_or_create(self.gateway.as_ref(), tenant).await;
        let _guard = entry.try_begin()?;

        match entry.status().await {
            TenantStatus::Created => Ok(()),
            TenantStatus::Creating | TenantStatus::Deleting => {
                Err(Error::AlreadyInProgress(tenant.to_string()))
            }
            TenantStatus::Errored => Err(Error::TerminalState(tenant.to_string())),
            TenantStatus::None | TenantStatus::Deleted => self.provision(&entry).await,
        }
    }

    /// Tear the tenant's codespace down.
    pub async fn delete(&self, tenant: &str) -> Result<()> {
        let entry = self.registry.get_or_create(self.gateway.as_ref(), tenant).await;
        let _guard = entry.try_begin()?;

        match entry.status().await {
            TenantStatus::Deleted => Ok(()),
            TenantStatus::Deleting | TenantStatus::Creating => {
                Err(Error::AlreadyInProgress(tenant.to_string()))
            }
            TenantStatus::Errored => Err(Error::TerminalState(tenant.to_string())),
            TenantStatus::None => Err(Error::NotFound(tenant.to_string())),
            TenantStatus::Created => self.teardown(&entry).await,
        }
    }

    async fn provision(&self, entry: &TenantEntry) -> Result<()> {
        let tenant = entry.name();

        if self.gateway.get_namespace(tenant).await?.is_some() {
            info!("tenant {tenant}: namespace already present, adopting");
            entry.set_status(TenantStatus::Created).await;
            return Ok(());
        }

        entry.set_status(TenantStatus::Creating).await;
        info!("tenant {tenant}: provisioning codespace");

        match self.apply_and_wait(tenant).await {
            Ok(()) => {
                entry.set_status(TenantStatus::Created).await;
                info!("tenant {tenant}: codespace ready");
                Ok(())
            }
            Err(err) => {
                warn!("tenant {tenant}: provisioning failed, rolling back: {err}");
                if let Err(rollback) = self.gateway.delete_namespace(tenant).await {
                    error!("tenant {tenant}: rollback delete failed: {rollback}");
                }
                entry.set_status(TenantStatus::Errored).await;
                Err(err)
            }
        }
    }

    async fn apply_and_wait(&self, tenant: &str) -> Result<()> {
        let blobs =
            template::fetch_tenant_blobs(self.gateway.as_ref(), &self.config, tenant).await?;
        let text = template::load_template(&self.config.template_path).await?;
        let manifest = template::render(&text, tenant, &self.config, &blobs);

        self.gateway.apply_manifest(&manifest).await?;
        wait::wait_codespace_ready(self.gateway.as_ref(), &self.config, tenant).await
    }

    async fn teardown(&self, entry: &TenantEntry) -> Result<()> {
        let tenant = entry.name();

        let namespace = match self.gateway.get_namespace(tenant).await {
            Ok(ns) => ns,
            Err(err) => {
                // Remote state is unknown; fall back to the safe default.
                warn!("tenant {tenant}: existence check failed during delete: {err}");
                entry.set_status(TenantStatus::None).await;
                return Err(err);
            }
        };

        if namespace.is_none() {
            info!("tenant {tenant}: namespace already gone, adopting deletion");
            entry.set_status(TenantStatus::Deleted).await;
            return Ok(());
        }

        entry.set_status(TenantStatus::Deleting).await;
        info!("tenant {tenant}: deleting codespace");

        match self.gateway.delete_namespace(tenant).await {
            Ok(()) => {
                entry.set_status(TenantStatus::Deleted).await;
                Ok(())
            }
            Err(err) => {
                entry.set_status(TenantStatus::Errored).await;
                Err(err)
            }
        }
    }
}
