//! WebSocket session transport
//!
//! One task per socket. The upgrade is the connecting phase; once
//! [`SessionHub::connect`] returns the session is active until the client
//! closes, the socket errors, or the writer can no longer send, at which
//! point the hub is told to disconnect it.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};

use super::AppState;
use crate::session::{Connection, SessionHub};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<SessionHub>) {
    let Connection { identity, mut events } = hub.connect().await;
    let id = identity.id;
    let (mut sink, mut stream) = socket.split();

    // Drain the outbox onto the socket
    let writer_id = id.clone();
    let mut writer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let text = match event.to_json() {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(
                        connection_id = %writer_id,
                        event = event.name(),
                        error = %e,
                        "Failed to encode event"
                    );
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => hub.handle_frame(&id, text.as_str()).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(connection_id = %id, error = %e, "Socket error");
                    break;
                }
            },
            _ = &mut writer => {
                tracing::debug!(connection_id = %id, "Socket writer stopped");
                break;
            }
        }
    }

    hub.disconnect(&id).await;
    writer.abort();
}
