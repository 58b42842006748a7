//! Command Route
//!
//! - POST /api/v1/commands - Relay a command to a node

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::{CommandRequest, CommandResponse};
use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::relay::{Command, RelayError};

/// POST /api/v1/commands
///
/// Accepts `addr` (send to that address) or `node` (send to the node's
/// last known address). Answers 202 once the command is queued; delivery
/// is not awaited.
pub async fn send_command(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CommandRequest>,
) -> ApiResult<(StatusCode, Json<CommandResponse>)> {
    let command = match (req.addr, req.node) {
        (Some(addr), _) => {
            let command = Command::from_json(addr, req.ep, &req.val)?;
            state.relay.send(command.clone());
            command
        }
        (None, Some(node)) => state
            .relay
            .send_to_node(&state.registry, &node, &req.ep, &req.val)?,
        (None, None) => {
            return Err(RelayError::InvalidCommand("need 'addr' or 'node'".to_string()).into())
        }
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(CommandResponse {
            status: "queued".to_string(),
            addr: command.addr,
            ep: command.ep,
        }),
    ))
}
