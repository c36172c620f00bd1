//! Tenant migration tooling.
//!
//! When shards are added or the assignment table is lost, existing
//! engine deployments are the ground truth for who lives where. This
//! module walks every shard's deployment list in pages, collects the
//! tenant ids it finds, and writes the assignments back into the
//! shard registry.

use tracing::{debug, info, warn};

use flowgate_engine::EngineClientPool;
use flowgate_registry::{RegistryError, ShardRegistry};

use crate::error::SweepResult;

/// Outcome of one discovery run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Deployments with a tenant id seen across all shards.
    pub scanned: u64,
    /// Assignments written.
    pub assigned: u64,
    /// Tenants left alone because they were already assigned.
    pub skipped: u64,
}

/// Discover tenant assignments from engine deployments.
///
/// Pages through each shard's deployments (`batch_size` per page) and
/// assigns every discovered tenant to the shard its deployments live
/// on. Already-assigned tenants are skipped unless `force` is set,
/// which re-pins them (retiring-shard migration).
pub async fn discover_assignments(
    shards: &ShardRegistry,
    engines: &EngineClientPool,
    batch_size: usize,
    force: bool,
) -> SweepResult<MigrationReport> {
    let mut report = MigrationReport::default();
    for shard in shards.shards().await? {
        let engine = engines.client(&shard);
        let mut first_result = 0;
        loop {
            let page = engine
                .list_deployments_paged(first_result, batch_size)
                .await?;
            let page_len = page.len();
            for deployment in page {
                let Some(tenant) = deployment.tenant_id else {
                    debug!(%shard, did = %deployment.id, "deployment without tenant, skipped");
                    continue;
                };
                report.scanned += 1;
                if !force {
                    match shards.shard_for_tenant(&tenant).await {
                        Ok(current) => {
                            if current != shard {
                                warn!(
                                    %tenant,
                                    assigned = %current,
                                    found_on = %shard,
                                    "tenant has deployments outside its assigned shard"
                                );
                            }
                            report.skipped += 1;
                            continue;
                        }
                        Err(RegistryError::TenantNotAssigned(_)) => {}
                        Err(err) => return Err(err.into()),
                    }
                }
                shards.set_shard_for_tenant(&tenant, &shard).await?;
                report.assigned += 1;
            }
            if page_len < batch_size {
                break;
            }
            first_result += batch_size;
        }
    }
    info!(
        scanned = report.scanned,
        assigned = report.assigned,
        skipped = report.skipped,
        "tenant discovery finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgate_state::RegistryStore;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entry(id: &str, tenant: Option<&str>) -> serde_json::Value {
        match tenant {
            Some(tenant) => {
                serde_json::json!({"id": id, "name": id, "tenant_id": tenant, "deployment_time": 1})
            }
            None => serde_json::json!({"id": id, "name": id, "deployment_time": 1}),
        }
    }

    async fn mock_page(server: &MockServer, first: usize, max: usize, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/deployment"))
            .and(query_param("firstResult", first.to_string()))
            .and(query_param("maxResults", max.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn discovers_tenants_across_pages() {
        let store = RegistryStore::open_in_memory().unwrap();
        let shards = ShardRegistry::new(store);
        let engine = MockServer::start().await;
        shards.ensure_shard(&engine.uri()).await.unwrap();

        // Two full pages and a short tail page.
        mock_page(
            &engine,
            0,
            2,
            serde_json::json!([entry("d1", Some("t1")), entry("d2", Some("t2"))]),
        )
        .await;
        mock_page(
            &engine,
            2,
            2,
            serde_json::json!([entry("d3", None), entry("d4", Some("t1"))]),
        )
        .await;
        mock_page(&engine, 4, 2, serde_json::json!([])).await;

        let engines = EngineClientPool::new(Duration::from_secs(5)).unwrap();
        let report = discover_assignments(&shards, &engines, 2, false)
            .await
            .unwrap();

        // t1 counted once as assigned, once as skipped (second
        // deployment); d3 has no tenant.
        assert_eq!(
            report,
            MigrationReport {
                scanned: 3,
                assigned: 2,
                skipped: 1,
            }
        );
        assert_eq!(shards.shard_for_tenant("t1").await.unwrap(), engine.uri());
        assert_eq!(shards.shard_for_tenant("t2").await.unwrap(), engine.uri());
    }

    #[tokio::test]
    async fn existing_assignments_survive_without_force() {
        let store = RegistryStore::open_in_memory().unwrap();
        let shards = ShardRegistry::new(store);
        let engine = MockServer::start().await;
        let other = "http://engine-elsewhere:8080";
        shards.ensure_shard(&engine.uri()).await.unwrap();
        shards.ensure_shard(other).await.unwrap();
        shards.set_shard_for_tenant("t1", other).await.unwrap();

        mock_page(&engine, 0, 50, serde_json::json!([entry("d1", Some("t1"))])).await;

        let engines = EngineClientPool::new(Duration::from_secs(5)).unwrap();
        let report = discover_assignments(&shards, &engines, 50, false)
            .await
            .unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.assigned, 0);
        assert_eq!(shards.shard_for_tenant("t1").await.unwrap(), other);
    }

    #[tokio::test]
    async fn force_repins_to_the_shard_holding_the_deployments() {
        let store = RegistryStore::open_in_memory().unwrap();
        let shards = ShardRegistry::new(store);
        let engine = MockServer::start().await;
        let retiring = MockServer::start().await;
        shards.ensure_shard(&engine.uri()).await.unwrap();
        shards.ensure_shard(&retiring.uri()).await.unwrap();
        shards.set_shard_for_tenant("t1", &retiring.uri()).await.unwrap();

        mock_page(&engine, 0, 50, serde_json::json!([entry("d1", Some("t1"))])).await;
        mock_page(&retiring, 0, 50, serde_json::json!([])).await;

        let engines = EngineClientPool::new(Duration::from_secs(5)).unwrap();
        let report = discover_assignments(&shards, &engines, 50, true)
            .await
            .unwrap();

        assert_eq!(report.assigned, 1);
        assert_eq!(shards.shard_for_tenant("t1").await.unwrap(), engine.uri());
    }
}
