//! Node Routes
//!
//! Read-only view of the registry.
//!
//! - GET /api/v1/nodes - Full snapshot
//! - GET /api/v1/nodes/:id - One node
//! - GET /api/v1/liveness - Active/stale partition

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::telemetry::{now_millis, Classification, NodeSnapshot, Snapshot, Timestamp};

/// Liveness partition at a point in time
#[derive(Debug, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub at: Timestamp,
    #[serde(flatten)]
    pub classification: Classification,
}

/// GET /api/v1/nodes
pub async fn list_nodes(State(state): State<Arc<AppState>>) -> Json<Snapshot> {
    Json(state.registry.snapshot())
}

/// GET /api/v1/nodes/:id
pub async fn get_node(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<NodeSnapshot>> {
    state
        .registry
        .node(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("node '{}'", id)))
}

/// GET /api/v1/liveness
pub async fn liveness(State(state): State<Arc<AppState>>) -> Json<LivenessResponse> {
    let at = now_millis();
    Json(LivenessResponse {
        at,
        classification: state.registry.classify(at),
    })
}
