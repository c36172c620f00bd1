//! The reconciliation sweeper.
//!
//! Two independent read-heavy scans, each O(total deployments + vid
//! rows), holding no long-lived locks:
//!
//! - unlinked deployments: engine deployments with no vid, older than
//!   the age buffer. Repaired directly (operator mode) or by
//!   publishing a synthetic DELETE through the normal command path
//!   (daemon mode), so all removal logic stays funneled through the
//!   delete saga.
//! - unlinked vids: registry rows whose did exists on no shard.
//!   Removed via the usual two-phase primitive with an immediate
//!   commit, since there is no engine deployment left to pair with.
//!
//! A third scan settles vid removals a crash left mid-window.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use flowgate_core::{epoch_secs, CommandEnvelope, Did, DriftRecord};
use flowgate_engine::EngineClientPool;
use flowgate_registry::{ShardRegistry, VidRegistry};
use flowgate_saga::CommandQueue;

use crate::error::SweepResult;

pub struct Sweeper {
    shards: ShardRegistry,
    vids: VidRegistry,
    engines: EngineClientPool,
    age_buffer: Duration,
}

impl Sweeper {
    pub fn new(
        shards: ShardRegistry,
        vids: VidRegistry,
        engines: EngineClientPool,
        age_buffer: Duration,
    ) -> Self {
        Self {
            shards,
            vids,
            engines,
            age_buffer,
        }
    }

    // ── Unlinked deployments ───────────────────────────────────────

    /// Engine deployments with no vid, at least as old as the buffer.
    /// Anything younger may be an in-flight create and is skipped. A
    /// shard that fails to list is skipped with a warning: missing a
    /// shard only defers findings to the next sweep.
    pub async fn scan_unlinked_deployments(&self) -> SweepResult<Vec<DriftRecord>> {
        let now = epoch_secs();
        let buffer = self.age_buffer.as_secs();
        let mut drift = Vec::new();
        for shard in self.shards.shards().await? {
            let engine = self.engines.client(&shard);
            let deployments = match engine.list_deployments(None).await {
                Ok(deployments) => deployments,
                Err(err) => {
                    warn!(%shard, error = %err, "shard unreachable, skipped in this sweep");
                    continue;
                }
            };
            for deployment in deployments {
                if self.vids.vid_for_deployment(&deployment.id)?.is_some() {
                    continue;
                }
                let age = now.saturating_sub(deployment.deployment_time);
                if age < buffer {
                    debug!(%shard, did = %deployment.id, age, "young orphan, skipped");
                    continue;
                }
                drift.push(DriftRecord::UnlinkedDeployment {
                    shard: shard.clone(),
                    did: deployment.id,
                    age_secs: age,
                });
            }
        }
        Ok(drift)
    }

    /// Operator mode: delete unlinked deployments directly on their
    /// shards. One failing deletion does not abort the rest.
    pub async fn delete_unlinked_deployments(&self) -> SweepResult<u64> {
        let mut removed = 0;
        for record in self.scan_unlinked_deployments().await? {
            let DriftRecord::UnlinkedDeployment { shard, did, .. } = record else {
                continue;
            };
            match self.engines.client(&shard).delete_deployment(&did).await {
                Ok(()) => {
                    info!(%shard, %did, "unlinked deployment removed");
                    removed += 1;
                }
                Err(err) => error!(%shard, %did, error = %err, "failed to remove unlinked deployment"),
            }
        }
        Ok(removed)
    }

    /// Daemon mode: emit a synthetic DELETE per unlinked deployment
    /// so removal (including auxiliary cleanup) runs through the
    /// delete saga instead of duplicating it here.
    pub async fn publish_unlinked_deployments(
        &self,
        queue: &dyn CommandQueue,
    ) -> SweepResult<u64> {
        let mut published = 0;
        for record in self.scan_unlinked_deployments().await? {
            let DriftRecord::UnlinkedDeployment { shard, did, .. } = record else {
                continue;
            };
            info!(%shard, %did, "publishing synthetic delete for unlinked deployment");
            queue.publish(CommandEnvelope::synthetic_delete(did)).await;
            published += 1;
        }
        Ok(published)
    }

    // ── Unlinked vids ──────────────────────────────────────────────

    /// Vids whose did exists on no shard. Unlike the deployment scan,
    /// an unreachable shard aborts this scan: declaring a vid
    /// unlinked from a partial view would delete live mappings.
    pub async fn scan_unlinked_vids(&self) -> SweepResult<Vec<DriftRecord>> {
        let live = self.live_dids().await?;
        let mut drift = Vec::new();
        for relation in self.vids.list_relations()? {
            if !live.contains(&relation.did) {
                drift.push(DriftRecord::UnlinkedVid {
                    vid: relation.vid,
                    did: relation.did,
                });
            }
        }
        Ok(drift)
    }

    /// Remove unlinked vids from the registry. The paired engine
    /// removal has already happened (that is what makes them
    /// unlinked), so each removal commits immediately.
    pub async fn remove_unlinked_vids(&self) -> SweepResult<u64> {
        let mut removed = 0;
        for record in self.scan_unlinked_vids().await? {
            let DriftRecord::UnlinkedVid { vid, did } = record else {
                continue;
            };
            let result = self
                .vids
                .remove_relation(&vid, &did)
                .and_then(|removal| removal.commit());
            match result {
                Ok(()) => {
                    info!(%vid, %did, "unlinked vid removed");
                    removed += 1;
                }
                Err(err) => error!(%vid, %did, error = %err, "failed to remove unlinked vid"),
            }
        }
        Ok(removed)
    }

    // ── Stale pending removals ─────────────────────────────────────

    /// Vid removals a crash left neither committed nor rolled back,
    /// at least as old as the buffer.
    pub async fn scan_stale_pending_removals(&self) -> SweepResult<Vec<DriftRecord>> {
        let now = epoch_secs();
        let buffer = self.age_buffer.as_secs();
        let mut drift = Vec::new();
        for marker in self.vids.list_pending_removals()? {
            let age = now.saturating_sub(marker.started_at);
            if age < buffer {
                continue;
            }
            drift.push(DriftRecord::StalePendingRemoval {
                vid: marker.vid,
                did: marker.did,
                age_secs: age,
            });
        }
        Ok(drift)
    }

    /// Settle stale pending removals from engine reality: the did is
    /// gone from every shard means the interrupted delete got through
    /// (finalize), still present means it did not (restore the
    /// mapping).
    pub async fn repair_stale_pending_removals(&self) -> SweepResult<u64> {
        let stale = self.scan_stale_pending_removals().await?;
        if stale.is_empty() {
            return Ok(0);
        }
        let live = self.live_dids().await?;
        let mut settled = 0;
        for record in stale {
            let DriftRecord::StalePendingRemoval { vid, did, .. } = record else {
                continue;
            };
            let result = if live.contains(&did) {
                info!(%vid, %did, "deployment still exists, restoring interrupted removal");
                self.vids.rollback_pending(&vid)
            } else {
                info!(%vid, %did, "deployment gone, finalizing interrupted removal");
                self.vids.commit_pending(&vid)
            };
            match result {
                Ok(()) => settled += 1,
                Err(err) => error!(%vid, error = %err, "failed to settle pending removal"),
            }
        }
        Ok(settled)
    }

    /// The set of dids actually present across all shards. Fails if
    /// any shard cannot be listed.
    async fn live_dids(&self) -> SweepResult<HashSet<Did>> {
        let mut live = HashSet::new();
        for shard in self.shards.shards().await? {
            let engine = self.engines.client(&shard);
            for deployment in engine.list_deployments(None).await? {
                live.insert(deployment.id);
            }
        }
        Ok(live)
    }

    // ── Daemon loop ────────────────────────────────────────────────

    /// Periodic sweep loop for the daemon. A failing pass is logged
    /// and retried on the next tick.
    pub async fn run(
        &self,
        interval: Duration,
        queue: std::sync::Arc<dyn CommandQueue>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.publish_unlinked_deployments(queue.as_ref()).await {
                        Ok(published) if published > 0 => {
                            info!(published, "sweep queued unlinked deployments for deletion");
                        }
                        Ok(_) => {}
                        Err(err) => error!(error = %err, "unlinked-deployment sweep failed"),
                    }
                    match self.remove_unlinked_vids().await {
                        Ok(removed) if removed > 0 => info!(removed, "sweep removed unlinked vids"),
                        Ok(_) => {}
                        Err(err) => error!(error = %err, "unlinked-vid sweep failed"),
                    }
                    match self.repair_stale_pending_removals().await {
                        Ok(settled) if settled > 0 => info!(settled, "sweep settled pending removals"),
                        Ok(_) => {}
                        Err(err) => error!(error = %err, "pending-removal sweep failed"),
                    }
                }
            }
        }
        info!("sweeper stopped");
    }
}
