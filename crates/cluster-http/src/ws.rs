//! `GET /ws/network` and `GET /ws/pipeline`: subscribe a new connection to
//! the corresponding broadcaster and forward every published message as a
//! JSON text frame until the sentinel is observed or the client disconnects
//! (§4.7).

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use cluster_broadcast::Envelope;
use serde::Serialize;

use crate::server::ServerState;

pub async fn ws_network(
    ws: WebSocketUpgrade,
    State(state): State<ServerState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let (id, rx) = state.manager.subscribe_network().await;
        forward(socket, rx).await;
        state.manager.unsubscribe_network(id).await;
    })
}

pub async fn ws_pipeline(
    ws: WebSocketUpgrade,
    State(state): State<ServerState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let (id, rx) = state.manager.subscribe_pipeline().await;
        forward(socket, rx).await;
        state.manager.unsubscribe_pipeline(id).await;
    })
}

async fn forward<T: Serialize>(
    mut socket: WebSocket,
    mut rx: tokio::sync::mpsc::UnboundedReceiver<Envelope<T>>,
) {
    loop {
        tokio::select! {
            envelope = rx.recv() => {
                match envelope {
                    Some(Envelope::Message(message)) => {
                        let Ok(text) = serde_json::to_string(&message) else { continue };
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Some(Envelope::Sentinel) | None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(_)) => continue,
                    _ => break,
                }
            }
        }
    }
}
