//! Virtual-identifier registry.
//!
//! Sole translator between externally-stable vids and shard-local
//! engine deployment ids. The removal primitive returns a
//! [`VidRemoval`] guard: the relation is parked in the store's
//! pending-removals table while the caller performs the paired engine
//! removal, then `commit` or `rollback` settles it in a second short
//! transaction. No store transaction is ever held across network I/O.

use tracing::debug;

use flowgate_core::{Did, Vid, VidAddressed};
use flowgate_state::{PendingRemoval, RegistryStore, VidRelation};

use crate::error::RegistryResult;

/// Read/write access to the vid relation.
#[derive(Clone)]
pub struct VidRegistry {
    store: RegistryStore,
}

impl VidRegistry {
    pub fn new(store: RegistryStore) -> Self {
        Self { store }
    }

    /// Whether the vid currently maps to an engine deployment.
    pub fn vid_exists(&self, vid: &str) -> RegistryResult<bool> {
        Ok(self.store.vid_relation(vid)?.is_some())
    }

    /// The engine deployment id backing a vid, if mapped.
    pub fn deployment_id(&self, vid: &str) -> RegistryResult<Option<Did>> {
        Ok(self.store.vid_relation(vid)?.map(|relation| relation.did))
    }

    /// Reverse lookup: the vid owning an engine deployment id.
    pub fn vid_for_deployment(&self, did: &str) -> RegistryResult<Option<Vid>> {
        Ok(self.store.vid_for_did(did)?)
    }

    /// Map a vid to the engine deployment backing it. Upsert: a
    /// redeploy under the same vid replaces the old did. The caller
    /// must already have compensated the old engine deployment.
    pub fn save_relation(&self, vid: &str, did: &str) -> RegistryResult<()> {
        self.store.save_vid_relation(vid, did)?;
        Ok(())
    }

    /// Begin removing the relation for (vid, did).
    ///
    /// On return the mapping is invisible to readers but not yet
    /// gone: the caller removes the deployment from the engine, then
    /// calls [`VidRemoval::commit`] if that succeeded or
    /// [`VidRemoval::rollback`] to restore the mapping if it failed.
    pub fn remove_relation(&self, vid: &str, did: &str) -> RegistryResult<VidRemoval> {
        self.store.begin_vid_removal(vid, did)?;
        Ok(VidRemoval {
            store: self.store.clone(),
            vid: vid.to_string(),
            did: did.to_string(),
        })
    }

    /// Rewrite an engine-facing object's identifier to its vid.
    /// Returns false (object untouched) when the did has no vid,
    /// which callers treat as drift to be skipped.
    pub fn apply_vid(&self, item: &mut dyn VidAddressed) -> RegistryResult<bool> {
        match self.store.vid_for_did(item.deployment_id())? {
            Some(vid) => {
                item.set_public_id(vid);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// All current relations (sweeper input).
    pub fn list_relations(&self) -> RegistryResult<Vec<VidRelation>> {
        Ok(self.store.list_vid_relations()?)
    }

    /// Removals that were begun but never settled (crash recovery
    /// input for the sweeper).
    pub fn list_pending_removals(&self) -> RegistryResult<Vec<PendingRemoval>> {
        Ok(self.store.list_pending_removals()?)
    }

    /// Finalize a pending removal by vid. For the sweeper, which
    /// recovers markers whose [`VidRemoval`] guard died with the
    /// process that created it.
    pub fn commit_pending(&self, vid: &str) -> RegistryResult<()> {
        self.store.commit_vid_removal(vid)?;
        Ok(())
    }

    /// Restore a pending removal by vid (see [`Self::commit_pending`]).
    pub fn rollback_pending(&self, vid: &str) -> RegistryResult<()> {
        self.store.rollback_vid_removal(vid)?;
        Ok(())
    }
}

/// An in-flight vid removal. Consume with `commit` or `rollback`.
///
/// Dropping the guard without settling leaves the pending marker in
/// the store, which is exactly the crash behavior: the reconciliation
/// sweeper finds and repairs stale markers.
#[must_use = "settle the removal with commit() or rollback()"]
pub struct VidRemoval {
    store: RegistryStore,
    vid: Vid,
    did: Did,
}

impl VidRemoval {
    /// The vid being removed.
    pub fn vid(&self) -> &str {
        &self.vid
    }

    /// The engine deployment id the vid mapped to.
    pub fn did(&self) -> &str {
        &self.did
    }

    /// The engine removal succeeded: make the deletion final.
    pub fn commit(self) -> RegistryResult<()> {
        self.store.commit_vid_removal(&self.vid)?;
        debug!(vid = %self.vid, "vid removal committed");
        Ok(())
    }

    /// The engine removal failed: restore the mapping untouched.
    pub fn rollback(self) -> RegistryResult<()> {
        self.store.rollback_vid_removal(&self.vid)?;
        debug!(vid = %self.vid, "vid removal rolled back");
        Ok(())
    }
}
