//! WebSocket transport for the sync protocol.
//!
//! Each connection gets its own canvas: the remote peer plays the builder,
//! and frames are [`SyncMessage`]s as JSON text.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use studio_core::RenderSession;
use studio_sync::{CanvasContext, SyncMessage};
use tokio::sync::mpsc;

use crate::AppState;

/// `GET /sync`
#[tracing::instrument(name = "sync_websocket_connect", skip(ws, state))]
pub async fn sync_websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    tracing::info!("Sync WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_sync_socket(socket, state))
}

/// Run one canvas for the lifetime of `socket`.
pub async fn handle_sync_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (outbox, mut canvas_rx) = mpsc::unbounded_channel();
    let session = RenderSession::new(
        Arc::clone(&state.registry),
        state.document.document(),
        state.params.clone(),
    );
    let mut canvas = CanvasContext::new(session, outbox);
    let peer_id = canvas.peer_id().to_string();
    tracing::info!(peer_id = %peer_id, "Canvas opened");

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received from {}: {}", peer_id, text);
                        match serde_json::from_str::<SyncMessage>(&text) {
                            Ok(message) => {
                                let kind = message.kind();
                                if let Err(e) = canvas.handle(message) {
                                    tracing::warn!(peer_id = %peer_id, ?kind, error = %e, "Failed to apply message");
                                }
                                if let Some(output) = canvas.flush() {
                                    tracing::debug!(
                                        peer_id = %peer_id,
                                        mode = %canvas.effective_mode(),
                                        errors = output.errors.len(),
                                        "Canvas re-rendered"
                                    );
                                }
                            }
                            Err(e) => {
                                tracing::warn!(peer_id = %peer_id, error = %e, "Unparseable sync message");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("Peer {} disconnected", peer_id);
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error for peer {}: {}", peer_id, e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }

            outgoing = canvas_rx.recv() => {
                match outgoing {
                    Some(message) => match serde_json::to_string(&message) {
                        Ok(json) => {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::error!(peer_id = %peer_id, "Failed to serialize sync message: {}", e);
                        }
                    },
                    None => break,
                }
            }
        }
    }

    tracing::info!(peer_id = %peer_id, "Canvas closed");
}
