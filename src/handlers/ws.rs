use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    Extension,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::AppState;

/// GET /ws. The session cookie authenticates the upgrade like any API call.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, auth_user.id))
}

/// True when a broadcast message is addressed to `user_id`.
pub fn is_for_user(raw: &str, user_id: Uuid) -> bool {
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .and_then(|v| v.get("user_id").and_then(|u| u.as_str()).map(|u| u == user_id.to_string()))
        .unwrap_or(false)
}

/// Next broadcast message addressed to `user_id`, or `None` once the channel
/// closes. A receiver that fell behind skips the dropped messages.
async fn next_for_user(rx: &mut broadcast::Receiver<String>, user_id: Uuid) -> Option<String> {
    loop {
        match rx.recv().await {
            Ok(msg) if is_for_user(&msg, user_id) => return Some(msg),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(user_id = %user_id, skipped, "WebSocket subscriber lagged");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.ws_tx.subscribe();

    tracing::debug!(user_id = %user_id, "WebSocket connection established");

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = next_for_user(&mut rx, user_id).await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    tracing::debug!(user_id = %user_id, message = %text, "WebSocket message received");
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::debug!(user_id = %user_id, "WebSocket connection closed");
}
