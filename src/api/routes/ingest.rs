//! Ingest Route
//!
//! - POST /senml - SenML pack from a node

use axum::{body::Bytes, extract::State, http::StatusCode};
use std::sync::Arc;

use crate::api::dto::decode_senml;
use crate::api::error::DeviceResult;
use crate::api::extract::PeerAddr;
use crate::api::state::AppState;

/// POST /senml
///
/// Decode the pack and hand it to the registry. Answers 204 with an empty
/// body on success and a bare 406 when the pack is rejected.
pub async fn ingest_senml(
    State(state): State<Arc<AppState>>,
    peer: PeerAddr,
    body: Bytes,
) -> DeviceResult<StatusCode> {
    let batch = decode_senml(&body, peer.as_str())?;
    state.registry.ingest(batch)?;
    Ok(StatusCode::NO_CONTENT)
}
