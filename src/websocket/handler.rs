//! WebSocket Handler
//!
//! Upgrades viewer connections and drives one `ViewerSession` per socket.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::hub::ViewerSession;
use super::messages::{ClientMessage, ViewerMessage};
use crate::api::AppState;
use crate::relay::Command;

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn encode(message: &ViewerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize viewer message");
            None
        }
    }
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let (mut session, init) = match ViewerSession::open(Arc::clone(&state.registry)) {
        Ok(opened) => opened,
        Err(e) => {
            tracing::warn!(error = %e, "Rejecting viewer");
            if let Some(frame) = encode(&ViewerMessage::error(e.to_string())) {
                let _ = sender.send(frame).await;
            }
            let _ = sender.close().await;
            return;
        }
    };
    let viewer_id = session.id().to_string();

    if let Some(frame) = encode(&init) {
        if sender.send(frame).await.is_err() {
            tracing::debug!(viewer_id = %viewer_id, "Viewer gone before init");
            return;
        }
    }

    // Replies to this viewer's own requests (ack, pong, error)
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<ViewerMessage>();

    let send_id = viewer_id.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                event = session.next() => match event {
                    Some(message) => message,
                    None => break,
                },
                reply = reply_rx.recv() => match reply {
                    Some(message) => message,
                    None => break,
                },
            };

            let Some(frame) = encode(&message) else {
                continue;
            };
            if sender.send(frame).await.is_err() {
                tracing::debug!(viewer_id = %send_id, "WebSocket send failed, closing connection");
                break;
            }
        }
    });

    let recv_id = viewer_id.clone();
    let recv_state = Arc::clone(&state);
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(msg) => {
                    if !handle_ws_message(&recv_state, &recv_id, msg, &reply_tx) {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(viewer_id = %recv_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    tracing::debug!(viewer_id = %viewer_id, "Viewer session ended");
}

/// Handle a received WebSocket frame.
///
/// Returns false if the connection should be closed.
fn handle_ws_message(
    state: &AppState,
    viewer_id: &str,
    message: Message,
    reply: &mpsc::UnboundedSender<ViewerMessage>,
) -> bool {
    match message {
        Message::Text(text) => {
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    let response = handle_client_message(state, viewer_id, client_msg);
                    let _ = reply.send(response);
                }
                Err(e) => {
                    tracing::debug!(
                        viewer_id = %viewer_id,
                        error = %e,
                        "Invalid viewer message"
                    );
                    let _ = reply.send(ViewerMessage::error(format!(
                        "Invalid message format: {}",
                        e
                    )));
                }
            }
            true
        }
        Message::Binary(_) => {
            let _ = reply.send(ViewerMessage::error("Binary messages not supported"));
            true
        }
        // Axum answers pings itself
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(viewer_id = %viewer_id, "Viewer requested close");
            false
        }
    }
}

/// Handle a parsed viewer request and build the reply
fn handle_client_message(
    state: &AppState,
    viewer_id: &str,
    message: ClientMessage,
) -> ViewerMessage {
    match message {
        ClientMessage::CoapSend { addr, ep, val } => match Command::from_json(addr, ep, &val) {
            Ok(command) => {
                tracing::debug!(viewer_id = %viewer_id, addr = %command.addr, ep = %command.ep, "Viewer command");
                let ack = ViewerMessage::Ack {
                    addr: command.addr.clone(),
                    ep: command.ep.clone(),
                };
                state.relay.send(command);
                ack
            }
            Err(e) => ViewerMessage::error(e.to_string()),
        },
        ClientMessage::Ping => ViewerMessage::Pong,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiConfig;
    use crate::relay::command::tests::RecordingTransport;
    use crate::relay::CommandRelay;
    use crate::telemetry::{Registry, RegistryConfig};
    use crate::websocket::{EventFanout, FanoutConfig};

    fn create_test_state() -> (Arc<RecordingTransport>, AppState) {
        let fanout = Arc::new(EventFanout::new(FanoutConfig::default()));
        let registry = Arc::new(Registry::new(RegistryConfig::default(), fanout));
        let transport = Arc::new(RecordingTransport::default());
        let relay = CommandRelay::new(transport.clone(), "sense");
        (transport, AppState::new(registry, relay, ApiConfig::default()))
    }

    #[tokio::test]
    async fn test_coap_send_acks_and_relays() {
        let (transport, state) = create_test_state();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let frame = Message::Text(
            r#"{"type":"coap_send","addr":"fd00::1","ep":"a:rgb","val":"0,255,0"}"#.to_string(),
        );
        assert!(handle_ws_message(&state, "v1", frame, &tx));

        match rx.recv().await.unwrap() {
            ViewerMessage::Ack { addr, ep } => {
                assert_eq!(addr, "fd00::1");
                assert_eq!(ep, "a:rgb");
            }
            other => panic!("Expected Ack, got {:?}", other),
        }

        for _ in 0..10 {
            if !transport.sent.lock().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(transport.sent.lock()[0].2, "0,255,0");
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (_transport, state) = create_test_state();
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(handle_ws_message(
            &state,
            "v1",
            Message::Text(r#"{"type":"ping"}"#.to_string()),
            &tx
        ));
        assert!(matches!(rx.recv().await, Some(ViewerMessage::Pong)));
    }

    #[tokio::test]
    async fn test_invalid_messages_keep_connection() {
        let (transport, state) = create_test_state();
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(handle_ws_message(&state, "v1", Message::Text("nope".to_string()), &tx));
        assert!(matches!(rx.recv().await, Some(ViewerMessage::Error { .. })));

        let empty_addr = Message::Text(r#"{"type":"coap_send","addr":"","ep":"a","val":1}"#.to_string());
        assert!(handle_ws_message(&state, "v1", empty_addr, &tx));
        assert!(matches!(rx.recv().await, Some(ViewerMessage::Error { .. })));
        assert!(transport.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_close_ends_session() {
        let (_transport, state) = create_test_state();
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(!handle_ws_message(&state, "v1", Message::Close(None), &tx));
    }
}
