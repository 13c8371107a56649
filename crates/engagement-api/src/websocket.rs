//! WebSocket handler for real-time updates

use axum::extract::ws::{Message, WebSocket};
use engagement_rules::RuleEvent;
use futures::{SinkExt, StreamExt};
use serde::Serialize;

use crate::AppState;

/// WebSocket events sent to clients
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    Connected,
    Rule { event: RuleEvent },
}

/// Handle a WebSocket connection
pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let Ok(connected_msg) = serde_json::to_string(&WsEvent::Connected) else {
        return;
    };
    if sender.send(Message::Text(connected_msg)).await.is_err() {
        return;
    }

    // Forward store events until the client goes away
    let mut event_rx = state.store.subscribe();
    let send_task = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event) => {
                    let json = match serde_json::to_string(&WsEvent::Rule { event }) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::warn!("Failed to serialize rule event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("WebSocket client lagged by {} events", n);
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    send_task.abort();
}
