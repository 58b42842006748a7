//! Registration Route
//!
//! - POST /reg - Node announces its id and capabilities

use axum::{body::Bytes, extract::State, http::StatusCode};
use std::sync::Arc;

use crate::api::dto::decode_registration;
use crate::api::error::DeviceResult;
use crate::api::extract::PeerAddr;
use crate::api::state::AppState;

/// POST /reg
///
/// Records the node and starts observing its sense resource unless it is
/// already observed. The observation runs in the background and never
/// delays the answer.
pub async fn register_node(
    State(state): State<Arc<AppState>>,
    peer: PeerAddr,
    body: Bytes,
) -> DeviceResult<StatusCode> {
    let registration = decode_registration(&body, peer.as_str())?;
    let node_id = registration.node_id.clone();
    state.registry.register(registration)?;
    state.relay.observe(&state.registry, &node_id, peer.as_str());
    Ok(StatusCode::NO_CONTENT)
}
