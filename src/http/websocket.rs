//! WebSocket endpoint.
//!
//! The upgrade itself is gated by `ws_auth_middleware`; once through, the
//! socket echoes text and binary frames until the client closes. Terminal
//! and agent streams attach here in the full host.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};

pub async fn ws_handler(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(handle_socket)
}

async fn handle_socket(socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    tracing::debug!("WebSocket session opened");

    while let Some(frame) = receiver.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(error = %e, "WebSocket receive error");
                break;
            }
        };
        match msg {
            Message::Close(_) => break,
            Message::Text(_) | Message::Binary(_) => {
                if sender.send(msg).await.is_err() {
                    break;
                }
            }
            // Ping/pong are answered by axum.
            _ => {}
        }
    }

    tracing::debug!("WebSocket session closed");
}
