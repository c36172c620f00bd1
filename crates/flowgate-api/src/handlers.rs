//! REST API handlers.
//!
//! Validation failures map to 4xx, remote-engine failures to 502,
//! storage failures to 500. Command-bus semantics (redelivery on
//! failure) apply only to the `/commands` ingest route; the
//! deployment routes run their saga synchronously and report its
//! outcome.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use tracing::debug;

use flowgate_core::{CommandEnvelope, DeploymentPayload};
use flowgate_saga::SagaError;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn saga_error_response(err: SagaError) -> axum::response::Response {
    let status = match &err {
        SagaError::Command(_) => StatusCode::BAD_REQUEST,
        SagaError::Engine(_) => StatusCode::BAD_GATEWAY,
        SagaError::Registry(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(&err.to_string(), status).into_response()
}

// ── Deployments ────────────────────────────────────────────────

/// Body of a PUT deployment request.
#[derive(serde::Deserialize)]
pub struct PutDeploymentRequest {
    pub owner: String,
    pub deployment: DeploymentPayload,
    #[serde(default)]
    pub source: Option<String>,
}

/// PUT /api/v1/deployments/{vid}
pub async fn put_deployment(
    State(state): State<ApiState>,
    Path(vid): Path<String>,
    Json(req): Json<PutDeploymentRequest>,
) -> impl IntoResponse {
    let envelope = CommandEnvelope {
        command: "PUT".to_string(),
        id: vid.clone(),
        owner: req.owner,
        deployment: Some(req.deployment),
        source: req.source,
        version: None,
    };
    match state.orchestrator.handle_envelope(envelope).await {
        Ok(()) => {
            debug!(%vid, "deployment put accepted");
            (StatusCode::CREATED, ApiResponse::ok(vid)).into_response()
        }
        Err(err) => saga_error_response(err),
    }
}

/// DELETE /api/v1/deployments/{vid}?tenant=
pub async fn delete_deployment(
    State(state): State<ApiState>,
    Path(vid): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let tenant = params.get("tenant").map(String::as_str);
    match state.orchestrator.delete(&vid, tenant).await {
        Ok(()) => ApiResponse::ok(vid).into_response(),
        Err(err) => saga_error_response(err),
    }
}

/// GET /api/v1/deployments?tenant=
pub async fn list_deployments(
    State(state): State<ApiState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(tenant) = params.get("tenant") else {
        return error_response("missing tenant parameter", StatusCode::BAD_REQUEST)
            .into_response();
    };
    match state.orchestrator.list_for_tenant(tenant).await {
        Ok(deployments) => ApiResponse::ok(deployments).into_response(),
        Err(err) => saga_error_response(err),
    }
}

// ── Command ingest ─────────────────────────────────────────────

/// POST /api/v1/commands
///
/// Enqueues the raw envelope for the consumer loop; delivery
/// semantics match the external bus (ack on success, redelivery on
/// failure).
pub async fn ingest_command(
    State(state): State<ApiState>,
    Json(envelope): Json<CommandEnvelope>,
) -> impl IntoResponse {
    if envelope.id.is_empty() {
        return error_response("command is missing the vid", StatusCode::BAD_REQUEST)
            .into_response();
    }
    let id = envelope.id.clone();
    state.queue.publish(envelope).await;
    (StatusCode::ACCEPTED, ApiResponse::ok(id)).into_response()
}

// ── Registry reads ─────────────────────────────────────────────

/// GET /api/v1/shards
pub async fn list_shards(State(state): State<ApiState>) -> impl IntoResponse {
    match state.shards.shard_tenant_counts().await {
        Ok(counts) => ApiResponse::ok(counts).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Liveness ───────────────────────────────────────────────────

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    ApiResponse::ok("ok")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_router;
    use axum::body::Body;
    use axum::http::Request;
    use flowgate_engine::{EngineClientPool, IncidentClient, VariablesClient};
    use flowgate_registry::{ShardRegistry, VidRegistry};
    use flowgate_saga::{InMemoryQueue, Orchestrator};
    use flowgate_state::RegistryStore;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_XML: &str = r#"<definitions xmlns="http://www.omg.org/spec/BPMN/20100524/MODEL"><process id="p1" isExecutable="true"><startEvent id="s"/></process></definitions>"#;

    struct Harness {
        router: axum::Router,
        queue: Arc<InMemoryQueue>,
        engine: MockServer,
        aux: MockServer,
    }

    async fn harness() -> Harness {
        let store = RegistryStore::open_in_memory().unwrap();
        let shards = ShardRegistry::new(store.clone());
        let vids = VidRegistry::new(store);
        let engine = MockServer::start().await;
        let aux = MockServer::start().await;
        shards.ensure_shard(&engine.uri()).await.unwrap();

        let pool = EngineClientPool::new(Duration::from_secs(5)).unwrap();
        let incidents = IncidentClient::new(pool.http(), &aux.uri());
        let variables = VariablesClient::new(pool.http(), &aux.uri());
        let orchestrator =
            Orchestrator::new(shards.clone(), vids, pool, incidents, variables);

        let queue = InMemoryQueue::new();
        let router = build_router(ApiState {
            orchestrator,
            queue: queue.clone(),
            shards,
        });
        Harness {
            router,
            queue,
            engine,
            aux,
        }
    }

    async fn send(router: &axum::Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn put_body(owner: &str, name: &str) -> Body {
        Body::from(
            serde_json::json!({
                "owner": owner,
                "deployment": {
                    "id": "up-1",
                    "name": name,
                    "diagram": { "xml_deployed": VALID_XML, "svg": "<svg/>" },
                },
            })
            .to_string(),
        )
    }

    fn json_request(method: &str, uri: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap()
    }

    async fn mock_create(server: &MockServer, did: &str) {
        Mock::given(method("POST"))
            .and(path("/deployment/create"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": did, "name": "n"})),
            )
            .mount(server)
            .await;
    }

    async fn mock_tenant_listing(server: &MockServer, tenant: &str, entries: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/deployment"))
            .and(query_param("tenantIdIn", tenant))
            .respond_with(ResponseTemplate::new(200).set_body_json(entries))
            .mount(server)
            .await;
    }

    async fn mock_delete_saga(engine: &MockServer, aux: &MockServer, did: &str) {
        Mock::given(method("GET"))
            .and(path("/deployment/count"))
            .and(query_param("id", did))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"count": 1})))
            .mount(engine)
            .await;
        Mock::given(method("GET"))
            .and(path("/process-definition"))
            .and(query_param("deploymentId", did))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!([{"id": format!("def-{did}"), "key": "k", "deployment_id": did}]),
            ))
            .mount(engine)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .mount(aux)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("/deployment/{did}")))
            .respond_with(ResponseTemplate::new(204))
            .mount(engine)
            .await;
    }

    #[tokio::test]
    async fn healthz_responds() {
        let h = harness().await;
        let (status, body) = send(
            &h.router,
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], "ok");
    }

    #[tokio::test]
    async fn list_requires_tenant_parameter() {
        let h = harness().await;
        let (status, body) = send(
            &h.router,
            Request::builder()
                .uri("/api/v1/deployments")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn deploy_list_redeploy_delete_round_trip() {
        let h = harness().await;

        // Phase 1: deploy vid "1" for tenant "n11".
        mock_create(&h.engine, "d-1").await;
        mock_tenant_listing(
            &h.engine,
            "n11",
            serde_json::json!([
                {"id": "d-1", "name": "first", "tenant_id": "n11", "deployment_time": 100}
            ]),
        )
        .await;

        let (status, _) = send(
            &h.router,
            json_request("PUT", "/api/v1/deployments/1", put_body("n11", "first")),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(
            &h.router,
            Request::builder()
                .uri("/api/v1/deployments?tenant=n11")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["id"], "1");
        assert_eq!(body["data"][0]["name"], "first");

        // Phase 2: redeploy the same vid under a new name. The old
        // deployment is torn down first, so the list still has
        // exactly one entry.
        h.engine.reset().await;
        h.aux.reset().await;
        mock_delete_saga(&h.engine, &h.aux, "d-1").await;
        mock_create(&h.engine, "d-2").await;
        mock_tenant_listing(
            &h.engine,
            "n11",
            serde_json::json!([
                {"id": "d-2", "name": "second", "tenant_id": "n11", "deployment_time": 200}
            ]),
        )
        .await;

        let (status, _) = send(
            &h.router,
            json_request("PUT", "/api/v1/deployments/1", put_body("n11", "second")),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, body) = send(
            &h.router,
            Request::builder()
                .uri("/api/v1/deployments?tenant=n11")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["name"], "second");

        // Phase 3: delete the vid; the list drops to zero.
        h.engine.reset().await;
        h.aux.reset().await;
        mock_delete_saga(&h.engine, &h.aux, "d-2").await;
        mock_tenant_listing(&h.engine, "n11", serde_json::json!([])).await;

        let (status, _) = send(
            &h.router,
            Request::builder()
                .method("DELETE")
                .uri("/api/v1/deployments/1?tenant=n11")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(
            &h.router,
            Request::builder()
                .uri("/api/v1/deployments?tenant=n11")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(body["data"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn delete_of_unknown_vid_succeeds() {
        let h = harness().await;
        Mock::given(method("GET"))
            .and(path("/deployment/count"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"count": 0})))
            .mount(&h.engine)
            .await;

        let (status, _) = send(
            &h.router,
            Request::builder()
                .method("DELETE")
                .uri("/api/v1/deployments/ghost")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn engine_failure_maps_to_bad_gateway() {
        let h = harness().await;
        Mock::given(method("POST"))
            .and(path("/deployment/create"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&h.engine)
            .await;

        let (status, body) = send(
            &h.router,
            json_request("PUT", "/api/v1/deployments/1", put_body("n11", "x")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn command_ingest_enqueues_for_the_consumer() {
        let h = harness().await;
        let envelope = serde_json::json!({
            "command": "DELETE",
            "id": "vid-9",
            "owner": "n11",
        });

        let (status, _) = send(
            &h.router,
            json_request("POST", "/api/v1/commands", Body::from(envelope.to_string())),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(h.queue.ready_len().await, 1);
    }

    #[tokio::test]
    async fn shards_report_tenant_counts() {
        let h = harness().await;
        let (status, body) = send(
            &h.router,
            Request::builder()
                .uri("/api/v1/shards")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][h.engine.uri().as_str()], 0);
    }
}
