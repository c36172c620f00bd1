//! flowgate-api — REST API for the Flowgate control plane.
//!
//! Thin route layer: request parsing and response encoding only, all
//! coordination logic lives in the saga orchestrator.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | PUT | `/api/v1/deployments/{vid}` | Create or replace a deployment |
//! | DELETE | `/api/v1/deployments/{vid}` | Delete a deployment |
//! | GET | `/api/v1/deployments?tenant=` | List a tenant's deployments |
//! | POST | `/api/v1/commands` | Enqueue a raw command envelope |
//! | GET | `/api/v1/shards` | Shard list with tenant counts |
//! | GET | `/healthz` | Liveness |

pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;

use flowgate_registry::ShardRegistry;
use flowgate_saga::{CommandQueue, Orchestrator};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub queue: Arc<dyn CommandQueue>,
    pub shards: ShardRegistry,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route(
            "/deployments",
            get(handlers::list_deployments),
        )
        .route(
            "/deployments/{vid}",
            put(handlers::put_deployment).delete(handlers::delete_deployment),
        )
        .route("/commands", post(handlers::ingest_command))
        .route("/shards", get(handlers::list_shards))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
}
