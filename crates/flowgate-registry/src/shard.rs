//! Shard registry — tenant→shard assignment with least-load selection.
//!
//! All writes go through the store's single write transaction;
//! the caches here only accelerate the read-mostly lookup paths
//! (per-tenant shard resolution on every deployment operation, the
//! shard list on every sweep). Cache entries are invalidated
//! synchronously on every write and are never the sole source of
//! truth.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use flowgate_core::{ShardUrl, TenantId};
use flowgate_state::{RegistryStore, ShardRecord};

use crate::error::{RegistryError, RegistryResult};

/// Cached view over the shard tables of the registry store.
#[derive(Clone)]
pub struct ShardRegistry {
    store: RegistryStore,
    /// tenant → shard URL, filled on lookup, dropped on write.
    tenant_cache: Arc<RwLock<HashMap<TenantId, ShardUrl>>>,
    /// Full shard list, dropped on shard registration/removal.
    shard_cache: Arc<RwLock<Option<Vec<ShardUrl>>>>,
    /// Tenant counts per shard, dropped on any assignment write.
    counts_cache: Arc<RwLock<Option<BTreeMap<ShardUrl, u64>>>>,
}

impl ShardRegistry {
    pub fn new(store: RegistryStore) -> Self {
        Self {
            store,
            tenant_cache: Arc::new(RwLock::new(HashMap::new())),
            shard_cache: Arc::new(RwLock::new(None)),
            counts_cache: Arc::new(RwLock::new(None)),
        }
    }

    // ── Shard set ──────────────────────────────────────────────────

    /// Register a shard. Idempotent.
    pub async fn ensure_shard(&self, url: &str) -> RegistryResult<()> {
        if self.store.ensure_shard(url)? {
            *self.shard_cache.write().await = None;
            *self.counts_cache.write().await = None;
            info!(shard = %url, "shard registered");
        }
        Ok(())
    }

    /// De-register a shard, clearing its tenant assignments first.
    /// Returns the number of assignments cleared.
    pub async fn remove_shard(&self, url: &str) -> RegistryResult<u64> {
        let (existed, cleared) = self.store.remove_shard(url)?;
        // Any cached tenant may have pointed at the removed shard.
        self.tenant_cache.write().await.clear();
        *self.shard_cache.write().await = None;
        *self.counts_cache.write().await = None;
        if existed {
            info!(shard = %url, tenants_cleared = cleared, "shard de-registered");
        }
        Ok(cleared)
    }

    /// All registered shard URLs (cached).
    pub async fn shards(&self) -> RegistryResult<Vec<ShardUrl>> {
        if let Some(cached) = self.shard_cache.read().await.as_ref() {
            return Ok(cached.clone());
        }
        let urls: Vec<ShardUrl> = self
            .store
            .list_shards()?
            .into_iter()
            .map(|record: ShardRecord| record.url)
            .collect();
        *self.shard_cache.write().await = Some(urls.clone());
        Ok(urls)
    }

    /// Tenant count per shard, for tooling and the sweeper (cached).
    pub async fn shard_tenant_counts(&self) -> RegistryResult<BTreeMap<ShardUrl, u64>> {
        if let Some(cached) = self.counts_cache.read().await.as_ref() {
            return Ok(cached.clone());
        }
        let counts = self.store.tenant_counts()?;
        *self.counts_cache.write().await = Some(counts.clone());
        Ok(counts)
    }

    /// The shard a new tenant would land on: minimum tenant count,
    /// ties broken by lexicographically smallest URL. Always computed
    /// from the store; selection never trusts the caches.
    pub async fn select_shard(&self) -> RegistryResult<ShardUrl> {
        Ok(self.store.least_loaded_shard()?)
    }

    // ── Tenant assignment ──────────────────────────────────────────

    /// Cached lookup of a tenant's shard. Never creates an assignment.
    pub async fn shard_for_tenant(&self, tenant: &str) -> RegistryResult<ShardUrl> {
        if let Some(url) = self.tenant_cache.read().await.get(tenant) {
            return Ok(url.clone());
        }
        match self.store.assignment(tenant)? {
            Some(assignment) => {
                self.tenant_cache
                    .write()
                    .await
                    .insert(tenant.to_string(), assignment.shard_url.clone());
                Ok(assignment.shard_url)
            }
            None => Err(RegistryError::TenantNotAssigned(tenant.to_string())),
        }
    }

    /// Pin a tenant to a shard (migration path). Invalidates the
    /// cache entry before returning.
    pub async fn set_shard_for_tenant(&self, tenant: &str, url: &str) -> RegistryResult<()> {
        self.store.set_assignment(tenant, url)?;
        self.tenant_cache.write().await.remove(tenant);
        *self.counts_cache.write().await = None;
        info!(%tenant, shard = %url, "tenant pinned to shard");
        Ok(())
    }

    /// Resolve the tenant's shard, assigning the least-loaded shard
    /// inside a single store transaction if the tenant is new.
    pub async fn ensure_shard_for_tenant(&self, tenant: &str) -> RegistryResult<ShardUrl> {
        let (url, created) = self.store.ensure_assignment(tenant)?;
        self.tenant_cache
            .write()
            .await
            .insert(tenant.to_string(), url.clone());
        if created {
            *self.counts_cache.write().await = None;
            info!(%tenant, shard = %url, "tenant assigned to least-loaded shard");
        } else {
            debug!(%tenant, shard = %url, "tenant already assigned");
        }
        Ok(url)
    }
}
