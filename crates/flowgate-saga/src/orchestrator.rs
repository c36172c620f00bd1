//! Create and delete sagas.
//!
//! No distributed transaction spans the registry store, the engine,
//! and the auxiliary services, so every multi-step operation here is
//! a saga: steps run in an order that keeps identifiers resolvable
//! for later steps, and the steps most likely to partially fail are
//! paired with explicit compensation.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use flowgate_core::{
    diagram, CommandEnvelope, DeploymentCommand, DeploymentPayload, Did, IncidentPolicy, ShardUrl,
    TenantId, Vid,
};
use flowgate_engine::{
    CreateDeployment, DeploymentInfo, EngineClient, EngineClientPool, IncidentClient,
    ProcessDefinition, VariablesClient,
};
use flowgate_registry::{RegistryError, ShardRegistry, VidRegistry};

use crate::error::SagaResult;

/// Drives deployment sagas against the registries and the remote
/// collaborators. All handles are injected once at construction.
pub struct Orchestrator {
    shards: ShardRegistry,
    vids: VidRegistry,
    engines: EngineClientPool,
    incidents: IncidentClient,
    variables: VariablesClient,
}

impl Orchestrator {
    pub fn new(
        shards: ShardRegistry,
        vids: VidRegistry,
        engines: EngineClientPool,
        incidents: IncidentClient,
        variables: VariablesClient,
    ) -> Arc<Self> {
        Arc::new(Self {
            shards,
            vids,
            engines,
            incidents,
            variables,
        })
    }

    /// Parse and run one command envelope.
    pub async fn handle_envelope(&self, envelope: CommandEnvelope) -> SagaResult<()> {
        match envelope.into_command()? {
            DeploymentCommand::Create {
                vid,
                tenant,
                payload,
                source,
            } => self.create(&vid, &tenant, payload, source.as_deref()).await.map(|_| ()),
            DeploymentCommand::Delete { vid, tenant } => {
                self.delete(&vid, tenant.as_deref()).await
            }
            DeploymentCommand::Ignored { command, vid } => {
                warn!(%command, %vid, "ignoring unknown command");
                Ok(())
            }
        }
    }

    // ── Create saga ────────────────────────────────────────────────

    /// Deploy `payload` under `vid` for `tenant`. An existing mapping
    /// for the vid is torn down first, so re-applying a PUT replaces
    /// rather than duplicates. Returns the new engine deployment id.
    pub async fn create(
        &self,
        vid: &Vid,
        tenant: &TenantId,
        payload: DeploymentPayload,
        source: Option<&str>,
    ) -> SagaResult<Did> {
        if self.vids.vid_exists(vid)? {
            info!(%vid, "vid already mapped, replacing existing deployment");
            self.delete(vid, Some(tenant.as_str())).await?;
        }

        let (xml, svg, substituted) =
            if diagram::is_deployable(&payload.diagram.xml_deployed) {
                (
                    payload.diagram.xml_deployed.clone(),
                    payload.diagram.svg.clone(),
                    false,
                )
            } else {
                warn!(%vid, %tenant, "document is empty or malformed, deploying placeholder");
                let placeholder = diagram::placeholder_diagram(vid);
                (placeholder.xml_deployed, placeholder.svg, true)
            };

        let shard = self.shards.ensure_shard_for_tenant(tenant).await?;
        let engine = self.engines.client(&shard);

        let request = CreateDeployment {
            name: &payload.name,
            source,
            tenant,
            xml: &xml,
            svg: &svg,
        };
        let info = match engine.create_deployment(request).await {
            Ok(info) => info,
            Err(err) if err.is_rejection() && !substituted => {
                // The engine refused the document itself; one retry
                // with the placeholder keeps the vid deployable.
                warn!(%vid, error = %err, "engine rejected document, retrying with placeholder");
                let placeholder = diagram::placeholder_diagram(vid);
                engine
                    .create_deployment(CreateDeployment {
                        xml: &placeholder.xml_deployed,
                        svg: &placeholder.svg,
                        ..request
                    })
                    .await?
            }
            Err(err) => return Err(err.into()),
        };
        let did = info.id.clone();

        if let Some(policy) = &payload.incident_handling {
            if let Err(err) = self.register_incident_policies(&engine, &did, policy).await {
                self.compensate_create(&engine, vid, &did).await;
                return Err(err);
            }
        }

        if let Err(err) = self.vids.save_relation(vid, &did) {
            self.compensate_create(&engine, vid, &did).await;
            return Err(err.into());
        }

        info!(%vid, %did, shard = %shard, name = %payload.name, "deployment created");
        Ok(did)
    }

    async fn register_incident_policies(
        &self,
        engine: &EngineClient,
        did: &str,
        policy: &IncidentPolicy,
    ) -> SagaResult<()> {
        let definitions = engine.process_definitions(did).await?;
        for definition in &definitions {
            self.incidents.set_policy(&definition.id, policy).await?;
        }
        debug!(%did, definitions = definitions.len(), "incident policies registered");
        Ok(())
    }

    /// Undo a create whose later steps failed. A failure here is
    /// logged and left for the sweeper: the deployment has no vid, so
    /// the unlinked-deployment scan will find it.
    async fn compensate_create(&self, engine: &EngineClient, vid: &str, did: &str) {
        if let Err(err) = engine.delete_deployment(did).await {
            error!(%vid, %did, error = %err, "compensation failed, deployment left for sweeper");
        } else {
            info!(%vid, %did, "create saga compensated, deployment removed");
        }
    }

    // ── Delete saga ────────────────────────────────────────────────

    /// Remove the deployment behind `vid`. Without a tenant the
    /// search covers every shard (administrative delete). Unknown
    /// vids with no matching engine deployment succeed as no-ops.
    pub async fn delete(&self, vid: &Vid, tenant: Option<&str>) -> SagaResult<()> {
        let shard_urls = self.target_shards(tenant).await?;

        let Some(did) = self.vids.deployment_id(vid)? else {
            // Not in the registry. The id may still name an engine
            // deployment directly: the sweeper's synthetic DELETE for
            // an unlinked deployment takes this path.
            return self.delete_unregistered(vid, &shard_urls).await;
        };

        // Auxiliary records are keyed by definition ids that stop
        // being resolvable once the mapping and the deployment are
        // gone, so they are cleaned up first.
        let definitions = self.collect_definitions(&shard_urls, &did).await?;
        for definition in &definitions {
            self.incidents.remove_for_definition(&definition.id).await?;
        }
        for definition in &definitions {
            self.variables.remove_for_definition(&definition.id).await?;
        }

        let removal = self.vids.remove_relation(vid, &did)?;
        match self.remove_from_shards(&shard_urls, &did).await {
            Ok(()) => {
                removal.commit()?;
                info!(%vid, %did, "deployment deleted");
                Ok(())
            }
            Err(err) => {
                // The vid mapping survives; the command is retried.
                removal.rollback()?;
                Err(err)
            }
        }
    }

    async fn target_shards(&self, tenant: Option<&str>) -> SagaResult<Vec<ShardUrl>> {
        match tenant {
            Some(tenant) => match self.shards.shard_for_tenant(tenant).await {
                Ok(url) => Ok(vec![url]),
                // Ownership is ambiguous; search everywhere.
                Err(RegistryError::TenantNotAssigned(_)) => Ok(self.shards.shards().await?),
                Err(err) => Err(err.into()),
            },
            None => Ok(self.shards.shards().await?),
        }
    }

    async fn collect_definitions(
        &self,
        shard_urls: &[ShardUrl],
        did: &str,
    ) -> SagaResult<Vec<ProcessDefinition>> {
        let mut definitions = Vec::new();
        for shard in shard_urls {
            let engine = self.engines.client(shard);
            if engine.count_deployments(Some(did)).await? == 0 {
                continue;
            }
            definitions.extend(engine.process_definitions(did).await?);
        }
        Ok(definitions)
    }

    async fn remove_from_shards(&self, shard_urls: &[ShardUrl], did: &str) -> SagaResult<()> {
        for shard in shard_urls {
            let engine = self.engines.client(shard);
            // A shard with zero matching deployments is already done;
            // skipping keeps the removal side-effect-free there.
            if engine.count_deployments(Some(did)).await? == 0 {
                debug!(%shard, %did, "no matching deployment on shard");
                continue;
            }
            engine.delete_deployment(did).await?;
        }
        Ok(())
    }

    /// Delete path for ids the registry does not know: clean up and
    /// remove any engine deployment carrying the id directly, or
    /// succeed as a no-op when none exists.
    async fn delete_unregistered(&self, id: &str, shard_urls: &[ShardUrl]) -> SagaResult<()> {
        let mut found = false;
        for shard in shard_urls {
            let engine = self.engines.client(shard);
            if engine.count_deployments(Some(id)).await? == 0 {
                continue;
            }
            found = true;
            let definitions = engine.process_definitions(id).await?;
            for definition in &definitions {
                self.incidents.remove_for_definition(&definition.id).await?;
            }
            for definition in &definitions {
                self.variables.remove_for_definition(&definition.id).await?;
            }
            engine.delete_deployment(id).await?;
            info!(%shard, did = %id, "unregistered deployment deleted");
        }
        if !found {
            debug!(vid = %id, "delete for unknown vid is a no-op");
        }
        Ok(())
    }

    // ── Tenant-facing reads ────────────────────────────────────────

    /// Deployments visible to a tenant, with engine ids rewritten to
    /// vids. Engine entries with no vid are drift and are skipped.
    pub async fn list_for_tenant(&self, tenant: &str) -> SagaResult<Vec<DeploymentInfo>> {
        let shard = match self.shards.shard_for_tenant(tenant).await {
            Ok(url) => url,
            Err(RegistryError::TenantNotAssigned(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let deployments = self
            .engines
            .client(&shard)
            .list_deployments(Some(tenant))
            .await?;
        let mut visible = Vec::new();
        for mut deployment in deployments {
            if self.vids.apply_vid(&mut deployment)? {
                visible.push(deployment);
            }
        }
        Ok(visible)
    }

    /// The vid registry handle (sweeper and API wiring).
    pub fn vids(&self) -> &VidRegistry {
        &self.vids
    }

    /// The shard registry handle (sweeper and API wiring).
    pub fn shards(&self) -> &ShardRegistry {
        &self.shards
    }
}
