//! RegistryStore — redb-backed persistence for the Flowgate registries.
//!
//! Provides typed operations over shards, tenant assignments, and vid
//! relations. All values are JSON-serialized into redb's `&[u8]`
//! value columns. The store supports both on-disk and in-memory
//! backends (the latter for testing).
//!
//! redb write transactions are single-writer; every read-check-write
//! sequence below (`ensure_assignment`, `set_assignment`,
//! `begin_vid_removal`) runs inside one write transaction, which is
//! the serialization primitive the tenant-assignment invariant relies
//! on.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use flowgate_core::{epoch_secs, ShardUrl, Vid};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe registry store backed by redb.
#[derive(Clone)]
pub struct RegistryStore {
    db: Arc<Database>,
}

impl RegistryStore {
    /// Open (or create) a persistent registry store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "registry store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory registry store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory registry store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(SHARDS).map_err(map_err!(Table))?;
        txn.open_table(TENANT_SHARDS).map_err(map_err!(Table))?;
        txn.open_table(VID_RELATIONS).map_err(map_err!(Table))?;
        txn.open_table(VIDS_BY_DID).map_err(map_err!(Table))?;
        txn.open_table(PENDING_REMOVALS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Shards ─────────────────────────────────────────────────────

    /// Register a shard. Idempotent; returns true if newly inserted.
    pub fn ensure_shard(&self, url: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let inserted;
        {
            let mut table = txn.open_table(SHARDS).map_err(map_err!(Table))?;
            let exists = table.get(url).map_err(map_err!(Read))?.is_some();
            if exists {
                inserted = false;
            } else {
                let record = ShardRecord {
                    url: url.to_string(),
                    registered_at: epoch_secs(),
                };
                let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
                table
                    .insert(url, value.as_slice())
                    .map_err(map_err!(Write))?;
                inserted = true;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        if inserted {
            debug!(shard = %url, "shard registered");
        }
        Ok(inserted)
    }

    /// List all registered shards.
    pub fn list_shards(&self) -> StateResult<Vec<ShardRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SHARDS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: ShardRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }

    /// De-register a shard. Deletes all tenant assignments referencing
    /// it first, then the shard row, inside one write transaction.
    /// Returns whether the shard existed and how many assignments were
    /// cleared.
    pub fn remove_shard(&self, url: &str) -> StateResult<(bool, u64)> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        let mut cleared = 0u64;
        {
            let mut tenants = txn.open_table(TENANT_SHARDS).map_err(map_err!(Table))?;
            let doomed: Vec<String> = {
                let mut keys = Vec::new();
                for entry in tenants.iter().map_err(map_err!(Read))? {
                    let (key, value) = entry.map_err(map_err!(Read))?;
                    let assignment: TenantAssignment =
                        serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                    if assignment.shard_url == url {
                        keys.push(key.value().to_string());
                    }
                }
                keys
            };
            for key in &doomed {
                tenants.remove(key.as_str()).map_err(map_err!(Write))?;
                cleared += 1;
            }
            let mut shards = txn.open_table(SHARDS).map_err(map_err!(Table))?;
            existed = shards.remove(url).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(shard = %url, existed, cleared, "shard removed");
        Ok((existed, cleared))
    }

    // ── Tenant assignments ─────────────────────────────────────────

    /// Get the assignment for a tenant, if any.
    pub fn assignment(&self, tenant: &str) -> StateResult<Option<TenantAssignment>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TENANT_SHARDS).map_err(map_err!(Table))?;
        match table.get(tenant).map_err(map_err!(Read))? {
            Some(guard) => {
                let assignment: TenantAssignment =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(assignment))
            }
            None => Ok(None),
        }
    }

    /// Pin a tenant to a shard (forced migration path).
    ///
    /// Delete-then-insert inside one write transaction keeps the
    /// at-most-one-row-per-tenant invariant. Fails if the target shard
    /// is not registered.
    pub fn set_assignment(&self, tenant: &str, url: &str) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let shards = txn.open_table(SHARDS).map_err(map_err!(Table))?;
            if shards.get(url).map_err(map_err!(Read))?.is_none() {
                return Err(StateError::ShardNotFound(url.to_string()));
            }
            let mut tenants = txn.open_table(TENANT_SHARDS).map_err(map_err!(Table))?;
            tenants.remove(tenant).map_err(map_err!(Write))?;
            let assignment = TenantAssignment {
                tenant: tenant.to_string(),
                shard_url: url.to_string(),
                assigned_at: epoch_secs(),
            };
            let value = serde_json::to_vec(&assignment).map_err(map_err!(Serialize))?;
            tenants
                .insert(tenant, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%tenant, shard = %url, "tenant assignment set");
        Ok(())
    }

    /// Return the tenant's shard, assigning the least-loaded shard
    /// first if the tenant is new. The whole read-check-insert runs in
    /// one write transaction, so two concurrent first-time callers for
    /// the same tenant cannot pick different shards.
    ///
    /// Returns the shard URL and whether a new assignment was created.
    pub fn ensure_assignment(&self, tenant: &str) -> StateResult<(ShardUrl, bool)> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let url;
        let created;
        {
            let shards = txn.open_table(SHARDS).map_err(map_err!(Table))?;
            let mut tenants = txn.open_table(TENANT_SHARDS).map_err(map_err!(Table))?;

            let existing = match tenants.get(tenant).map_err(map_err!(Read))? {
                Some(guard) => {
                    let assignment: TenantAssignment =
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                    Some(assignment.shard_url)
                }
                None => None,
            };

            match existing {
                Some(existing_url) => {
                    url = existing_url;
                    created = false;
                }
                None => {
                    let counts = tenant_counts_inner(&shards, &tenants)?;
                    url = pick_least_loaded(&counts).ok_or(StateError::NoShards)?;
                    let assignment = TenantAssignment {
                        tenant: tenant.to_string(),
                        shard_url: url.clone(),
                        assigned_at: epoch_secs(),
                    };
                    let value = serde_json::to_vec(&assignment).map_err(map_err!(Serialize))?;
                    tenants
                        .insert(tenant, value.as_slice())
                        .map_err(map_err!(Write))?;
                    created = true;
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        if created {
            debug!(%tenant, shard = %url, "tenant assigned to shard");
        }
        Ok((url, created))
    }

    /// List all tenant assignments.
    pub fn list_assignments(&self) -> StateResult<Vec<TenantAssignment>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TENANT_SHARDS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let assignment: TenantAssignment =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(assignment);
        }
        Ok(results)
    }

    /// Tenant count per registered shard, zero-filled for empty shards.
    pub fn tenant_counts(&self) -> StateResult<BTreeMap<ShardUrl, u64>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let shards = txn.open_table(SHARDS).map_err(map_err!(Table))?;
        let tenants = txn.open_table(TENANT_SHARDS).map_err(map_err!(Table))?;
        tenant_counts_inner(&shards, &tenants)
    }

    /// The shard the next new tenant would be assigned to.
    pub fn least_loaded_shard(&self) -> StateResult<ShardUrl> {
        let counts = self.tenant_counts()?;
        pick_least_loaded(&counts).ok_or(StateError::NoShards)
    }

    // ── Vid relations ──────────────────────────────────────────────

    /// Get the relation for a vid, if any.
    pub fn vid_relation(&self, vid: &str) -> StateResult<Option<VidRelation>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(VID_RELATIONS).map_err(map_err!(Table))?;
        match table.get(vid).map_err(map_err!(Read))? {
            Some(guard) => {
                let relation: VidRelation =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(relation))
            }
            None => Ok(None),
        }
    }

    /// Reverse lookup: the vid backing an engine deployment id.
    pub fn vid_for_did(&self, did: &str) -> StateResult<Option<Vid>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(VIDS_BY_DID).map_err(map_err!(Table))?;
        match table.get(did).map_err(map_err!(Read))? {
            Some(guard) => {
                let vid: Vid =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(vid))
            }
            None => Ok(None),
        }
    }

    /// Upsert the relation for a vid, rewiring the reverse index in
    /// the same transaction. A re-save under the same vid (redeploy)
    /// drops the old did's reverse entry. Mapping a did that is
    /// already owned by a different vid is an invariant violation and
    /// fails.
    pub fn save_vid_relation(&self, vid: &str, did: &str) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut relations = txn.open_table(VID_RELATIONS).map_err(map_err!(Table))?;
            let mut by_did = txn.open_table(VIDS_BY_DID).map_err(map_err!(Table))?;

            let owner = match by_did.get(did).map_err(map_err!(Read))? {
                Some(guard) => Some(
                    serde_json::from_slice::<Vid>(guard.value()).map_err(map_err!(Deserialize))?,
                ),
                None => None,
            };
            if let Some(owner) = owner {
                if owner != vid {
                    return Err(StateError::DidAlreadyMapped {
                        did: did.to_string(),
                        vid: owner,
                    });
                }
            }

            let old_did = match relations.get(vid).map_err(map_err!(Read))? {
                Some(guard) => {
                    let relation: VidRelation =
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                    Some(relation.did)
                }
                None => None,
            };
            if let Some(old_did) = old_did {
                if old_did != did {
                    by_did.remove(old_did.as_str()).map_err(map_err!(Write))?;
                }
            }

            let relation = VidRelation {
                vid: vid.to_string(),
                did: did.to_string(),
            };
            let value = serde_json::to_vec(&relation).map_err(map_err!(Serialize))?;
            relations
                .insert(vid, value.as_slice())
                .map_err(map_err!(Write))?;
            let vid_value = serde_json::to_vec(&vid).map_err(map_err!(Serialize))?;
            by_did
                .insert(did, vid_value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%vid, %did, "vid relation saved");
        Ok(())
    }

    /// List all vid relations.
    pub fn list_vid_relations(&self) -> StateResult<Vec<VidRelation>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(VID_RELATIONS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let relation: VidRelation =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(relation);
        }
        Ok(results)
    }

    // ── Two-phase vid removal ──────────────────────────────────────

    /// Phase one of a vid removal: move the relation into the
    /// pending-removals table. The relation disappears from reads;
    /// `commit_vid_removal` finalizes, `rollback_vid_removal`
    /// restores. Fails if the vid is unknown, maps to a different
    /// did, or already has a removal in flight.
    pub fn begin_vid_removal(&self, vid: &str, did: &str) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut pending = txn.open_table(PENDING_REMOVALS).map_err(map_err!(Table))?;
            if pending.get(vid).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::RemovalPending(vid.to_string()));
            }

            let mut relations = txn.open_table(VID_RELATIONS).map_err(map_err!(Table))?;
            let relation = match relations.remove(vid).map_err(map_err!(Write))? {
                Some(guard) => serde_json::from_slice::<VidRelation>(guard.value())
                    .map_err(map_err!(Deserialize))?,
                None => return Err(StateError::VidNotFound(vid.to_string())),
            };
            if relation.did != did {
                return Err(StateError::DidMismatch {
                    vid: vid.to_string(),
                    expected: did.to_string(),
                    actual: relation.did,
                });
            }

            let mut by_did = txn.open_table(VIDS_BY_DID).map_err(map_err!(Table))?;
            by_did.remove(did).map_err(map_err!(Write))?;

            let marker = PendingRemoval {
                vid: vid.to_string(),
                did: did.to_string(),
                started_at: epoch_secs(),
            };
            let value = serde_json::to_vec(&marker).map_err(map_err!(Serialize))?;
            pending
                .insert(vid, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%vid, %did, "vid removal started");
        Ok(())
    }

    /// Phase two, success path: drop the pending marker for good.
    pub fn commit_vid_removal(&self, vid: &str) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut pending = txn.open_table(PENDING_REMOVALS).map_err(map_err!(Table))?;
            if pending.remove(vid).map_err(map_err!(Write))?.is_none() {
                return Err(StateError::PendingNotFound(vid.to_string()));
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%vid, "vid removal committed");
        Ok(())
    }

    /// Phase two, failure path: restore the relation untouched.
    pub fn rollback_vid_removal(&self, vid: &str) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut pending = txn.open_table(PENDING_REMOVALS).map_err(map_err!(Table))?;
            let marker = match pending.remove(vid).map_err(map_err!(Write))? {
                Some(guard) => serde_json::from_slice::<PendingRemoval>(guard.value())
                    .map_err(map_err!(Deserialize))?,
                None => return Err(StateError::PendingNotFound(vid.to_string())),
            };

            let relation = VidRelation {
                vid: marker.vid.clone(),
                did: marker.did.clone(),
            };
            let mut relations = txn.open_table(VID_RELATIONS).map_err(map_err!(Table))?;
            let value = serde_json::to_vec(&relation).map_err(map_err!(Serialize))?;
            relations
                .insert(vid, value.as_slice())
                .map_err(map_err!(Write))?;
            let mut by_did = txn.open_table(VIDS_BY_DID).map_err(map_err!(Table))?;
            let vid_value = serde_json::to_vec(&marker.vid).map_err(map_err!(Serialize))?;
            by_did
                .insert(marker.did.as_str(), vid_value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%vid, "vid removal rolled back");
        Ok(())
    }

    /// List removals that were started but never settled.
    pub fn list_pending_removals(&self) -> StateResult<Vec<PendingRemoval>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PENDING_REMOVALS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let marker: PendingRemoval =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(marker);
        }
        Ok(results)
    }
}

/// Aggregate tenant counts per registered shard. Works on the tables
/// of either a read or a write transaction so `ensure_assignment` can
/// reuse it without leaving its transaction.
fn tenant_counts_inner(
    shards: &impl ReadableTable<&'static str, &'static [u8]>,
    tenants: &impl ReadableTable<&'static str, &'static [u8]>,
) -> StateResult<BTreeMap<ShardUrl, u64>> {
    let mut counts: BTreeMap<ShardUrl, u64> = BTreeMap::new();
    for entry in shards.iter().map_err(map_err!(Read))? {
        let (key, _) = entry.map_err(map_err!(Read))?;
        counts.insert(key.value().to_string(), 0);
    }
    for entry in tenants.iter().map_err(map_err!(Read))? {
        let (_, value) = entry.map_err(map_err!(Read))?;
        let assignment: TenantAssignment =
            serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
        if let Some(count) = counts.get_mut(&assignment.shard_url) {
            *count += 1;
        }
    }
    Ok(counts)
}

/// Minimum-count shard; ties break to the lexicographically smallest
/// URL (BTreeMap iteration order makes the first minimum exactly that).
fn pick_least_loaded(counts: &BTreeMap<ShardUrl, u64>) -> Option<ShardUrl> {
    let mut best: Option<(&ShardUrl, u64)> = None;
    for (url, &count) in counts {
        match best {
            Some((_, best_count)) if count >= best_count => {}
            _ => best = Some((url, count)),
        }
    }
    best.map(|(url, _)| url.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "http://engine-a:8080";
    const B: &str = "http://engine-b:8080";
    const C: &str = "http://engine-c:8080";

    fn store_with_shards(urls: &[&str]) -> RegistryStore {
        let store = RegistryStore::open_in_memory().unwrap();
        for url in urls {
            store.ensure_shard(url).unwrap();
        }
        store
    }

    // ── Shards ─────────────────────────────────────────────────────

    #[test]
    fn ensure_shard_is_idempotent() {
        let store = RegistryStore::open_in_memory().unwrap();
        assert!(store.ensure_shard(A).unwrap());
        assert!(!store.ensure_shard(A).unwrap());
        assert_eq!(store.list_shards().unwrap().len(), 1);
    }

    #[test]
    fn remove_shard_clears_its_assignments_first() {
        let store = store_with_shards(&[A, B]);
        store.set_assignment("t1", A).unwrap();
        store.set_assignment("t2", A).unwrap();
        store.set_assignment("t3", B).unwrap();

        let (existed, cleared) = store.remove_shard(A).unwrap();
        assert!(existed);
        assert_eq!(cleared, 2);
        assert!(store.assignment("t1").unwrap().is_none());
        assert!(store.assignment("t2").unwrap().is_none());
        // The other shard's tenant survives.
        assert_eq!(store.assignment("t3").unwrap().unwrap().shard_url, B);
    }

    #[test]
    fn remove_unknown_shard_reports_absent() {
        let store = RegistryStore::open_in_memory().unwrap();
        let (existed, cleared) = store.remove_shard(A).unwrap();
        assert!(!existed);
        assert_eq!(cleared, 0);
    }

    // ── Assignments ────────────────────────────────────────────────

    #[test]
    fn set_assignment_replaces_previous_row() {
        let store = store_with_shards(&[A, B]);
        store.set_assignment("t1", A).unwrap();
        store.set_assignment("t1", B).unwrap();

        assert_eq!(store.assignment("t1").unwrap().unwrap().shard_url, B);
        assert_eq!(store.list_assignments().unwrap().len(), 1);
    }

    #[test]
    fn set_assignment_rejects_unregistered_shard() {
        let store = store_with_shards(&[A]);
        let err = store.set_assignment("t1", B).unwrap_err();
        assert!(matches!(err, StateError::ShardNotFound(url) if url == B));
    }

    #[test]
    fn ensure_assignment_returns_existing_without_reassigning() {
        let store = store_with_shards(&[A, B]);
        store.set_assignment("t1", B).unwrap();

        let (url, created) = store.ensure_assignment("t1").unwrap();
        assert_eq!(url, B);
        assert!(!created);
    }

    #[test]
    fn ensure_assignment_picks_least_loaded_shard() {
        let store = store_with_shards(&[A, B, C]);
        // a:2, b:0, c:5 in miniature: a:2, c:1, b:0.
        store.set_assignment("t1", A).unwrap();
        store.set_assignment("t2", A).unwrap();
        store.set_assignment("t3", C).unwrap();

        let (url, created) = store.ensure_assignment("fresh").unwrap();
        assert_eq!(url, B);
        assert!(created);
    }

    #[test]
    fn ensure_assignment_breaks_ties_lexicographically() {
        let store = store_with_shards(&[B, A, C]);
        let (url, _) = store.ensure_assignment("t1").unwrap();
        assert_eq!(url, A);
    }

    #[test]
    fn ensure_assignment_fails_without_shards() {
        let store = RegistryStore::open_in_memory().unwrap();
        let err = store.ensure_assignment("t1").unwrap_err();
        assert!(matches!(err, StateError::NoShards));
    }

    #[test]
    fn tenant_counts_zero_fill_empty_shards() {
        let store = store_with_shards(&[A, B]);
        store.set_assignment("t1", A).unwrap();

        let counts = store.tenant_counts().unwrap();
        assert_eq!(counts.get(A), Some(&1));
        assert_eq!(counts.get(B), Some(&0));
    }

    #[test]
    fn concurrent_first_assignments_agree_on_one_shard() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(store_with_shards(&[A, B, C]));
        let mut handles = vec![];
        for _ in 0..8 {
            let store = store.clone();
            handles.push(thread::spawn(move || {
                store.ensure_assignment("brand-new").unwrap().0
            }));
        }

        let urls: Vec<ShardUrl> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(urls.windows(2).all(|w| w[0] == w[1]));
        // Exactly one row exists afterwards.
        assert_eq!(store.list_assignments().unwrap().len(), 1);
    }

    // ── Vid relations ──────────────────────────────────────────────

    #[test]
    fn save_and_lookup_both_directions() {
        let store = RegistryStore::open_in_memory().unwrap();
        store.save_vid_relation("v1", "d1").unwrap();

        assert_eq!(store.vid_relation("v1").unwrap().unwrap().did, "d1");
        assert_eq!(store.vid_for_did("d1").unwrap().as_deref(), Some("v1"));
        assert!(store.vid_relation("v2").unwrap().is_none());
        assert!(store.vid_for_did("d2").unwrap().is_none());
    }

    #[test]
    fn resave_rewires_reverse_index() {
        let store = RegistryStore::open_in_memory().unwrap();
        store.save_vid_relation("v1", "d1").unwrap();
        store.save_vid_relation("v1", "d2").unwrap();

        assert_eq!(store.vid_relation("v1").unwrap().unwrap().did, "d2");
        assert!(store.vid_for_did("d1").unwrap().is_none());
        assert_eq!(store.vid_for_did("d2").unwrap().as_deref(), Some("v1"));
    }

    #[test]
    fn did_cannot_serve_two_vids() {
        let store = RegistryStore::open_in_memory().unwrap();
        store.save_vid_relation("v1", "d1").unwrap();

        let err = store.save_vid_relation("v2", "d1").unwrap_err();
        assert!(matches!(err, StateError::DidAlreadyMapped { .. }));
    }

    // ── Two-phase removal ──────────────────────────────────────────

    #[test]
    fn removal_commit_drops_the_relation() {
        let store = RegistryStore::open_in_memory().unwrap();
        store.save_vid_relation("v1", "d1").unwrap();

        store.begin_vid_removal("v1", "d1").unwrap();
        // Relation invisible while pending.
        assert!(store.vid_relation("v1").unwrap().is_none());
        assert!(store.vid_for_did("d1").unwrap().is_none());
        assert_eq!(store.list_pending_removals().unwrap().len(), 1);

        store.commit_vid_removal("v1").unwrap();
        assert!(store.vid_relation("v1").unwrap().is_none());
        assert!(store.list_pending_removals().unwrap().is_empty());
    }

    #[test]
    fn removal_rollback_restores_the_relation() {
        let store = RegistryStore::open_in_memory().unwrap();
        store.save_vid_relation("v1", "d1").unwrap();

        store.begin_vid_removal("v1", "d1").unwrap();
        store.rollback_vid_removal("v1").unwrap();

        assert_eq!(store.vid_relation("v1").unwrap().unwrap().did, "d1");
        assert_eq!(store.vid_for_did("d1").unwrap().as_deref(), Some("v1"));
        assert!(store.list_pending_removals().unwrap().is_empty());
    }

    #[test]
    fn removal_requires_matching_did() {
        let store = RegistryStore::open_in_memory().unwrap();
        store.save_vid_relation("v1", "d1").unwrap();

        let err = store.begin_vid_removal("v1", "other").unwrap_err();
        assert!(matches!(err, StateError::DidMismatch { .. }));
        // Aborted transaction left the relation in place.
        assert_eq!(store.vid_relation("v1").unwrap().unwrap().did, "d1");
    }

    #[test]
    fn removal_of_unknown_vid_fails() {
        let store = RegistryStore::open_in_memory().unwrap();
        let err = store.begin_vid_removal("ghost", "d1").unwrap_err();
        assert!(matches!(err, StateError::VidNotFound(_)));
    }

    #[test]
    fn second_removal_for_same_vid_is_rejected() {
        let store = RegistryStore::open_in_memory().unwrap();
        store.save_vid_relation("v1", "d1").unwrap();
        store.begin_vid_removal("v1", "d1").unwrap();

        let err = store.begin_vid_removal("v1", "d1").unwrap_err();
        assert!(matches!(err, StateError::RemovalPending(_)));
    }

    #[test]
    fn settle_without_pending_marker_fails() {
        let store = RegistryStore::open_in_memory().unwrap();
        assert!(matches!(
            store.commit_vid_removal("v1").unwrap_err(),
            StateError::PendingNotFound(_)
        ));
        assert!(matches!(
            store.rollback_vid_removal("v1").unwrap_err(),
            StateError::PendingNotFound(_)
        ));
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("registry.redb");

        {
            let store = RegistryStore::open(&db_path).unwrap();
            store.ensure_shard(A).unwrap();
            store.set_assignment("t1", A).unwrap();
            store.save_vid_relation("v1", "d1").unwrap();
            store.save_vid_relation("v2", "d2").unwrap();
            store.begin_vid_removal("v2", "d2").unwrap();
        }

        // Reopen the same database file: relations, assignments, and
        // the crash-interrupted pending marker are all still there.
        let store = RegistryStore::open(&db_path).unwrap();
        assert_eq!(store.assignment("t1").unwrap().unwrap().shard_url, A);
        assert_eq!(store.vid_relation("v1").unwrap().unwrap().did, "d1");
        let pending = store.list_pending_removals().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].vid, "v2");
    }
}
