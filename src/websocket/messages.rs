//! WebSocket Message Types
//!
//! Defines all message types exchanged between viewers (dashboards) and the
//! sensorhub server, plus the internal fan-out event.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::telemetry::{Classification, NodeId, NodeSnapshot, Snapshot, Timestamp};

/// Messages sent from viewer to server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Forward a raw command to a node
    CoapSend {
        /// Target node address
        addr: String,
        /// Endpoint on the node (e.g. `a:rgb`)
        ep: String,
        /// Payload; strings are sent verbatim, anything else as JSON text
        val: serde_json::Value,
    },
    /// Ping for keepalive
    Ping,
}

/// Messages sent from server to viewer
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerMessage {
    /// Full registry snapshot, always the first message on a connection.
    /// The partition is the one the snapshot implies at `taken_at`.
    Init {
        taken_at: Timestamp,
        nodes: BTreeMap<NodeId, NodeSnapshot>,
        active: Vec<NodeId>,
        stale: Vec<NodeId>,
    },
    /// One node changed; carries the whole node, not a diff
    Update { id: NodeId, node: NodeSnapshot },
    /// The active/stale partition changed
    Liveness {
        at: Timestamp,
        active: Vec<NodeId>,
        stale: Vec<NodeId>,
    },
    /// A command was handed to the transport
    Ack { addr: String, ep: String },
    /// Pong response to ping
    Pong,
    /// Error message
    Error { message: String },
}

impl ViewerMessage {
    pub fn init(snapshot: Snapshot, classification: Classification) -> Self {
        ViewerMessage::Init {
            taken_at: snapshot.taken_at,
            nodes: snapshot.nodes,
            active: classification.active,
            stale: classification.stale,
        }
    }

    pub fn liveness(at: Timestamp, classification: Classification) -> Self {
        ViewerMessage::Liveness {
            at,
            active: classification.active,
            stale: classification.stale,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ViewerMessage::Error {
            message: message.into(),
        }
    }
}

/// Internal event broadcast to every viewer session
#[derive(Debug, Clone)]
pub enum FanoutEvent {
    /// A node was created or mutated
    Update(Arc<NodeSnapshot>),
    /// The sweeper saw the liveness partition change
    Liveness {
        at: Timestamp,
        classification: Classification,
    },
}

impl FanoutEvent {
    pub fn update(node: NodeSnapshot) -> Self {
        FanoutEvent::Update(Arc::new(node))
    }
}

impl From<FanoutEvent> for ViewerMessage {
    fn from(event: FanoutEvent) -> Self {
        match event {
            FanoutEvent::Update(node) => {
                let node = Arc::unwrap_or_clone(node);
                ViewerMessage::Update {
                    id: node.id.clone(),
                    node,
                }
            }
            FanoutEvent::Liveness { at, classification } => {
                ViewerMessage::liveness(at, classification)
            }
        }
    }
}
