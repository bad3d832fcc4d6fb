//! WebSocket stream of engine change notifications.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use qbdeck_core::SyncEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_LAG_EVENTS, WS_MESSAGES_SENT};
use crate::state::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

fn event_type(event: &SyncEvent) -> &'static str {
    match event {
        SyncEvent::Reconciled { .. } => "reconciled",
        SyncEvent::SelectionChanged { .. } => "selection_changed",
        SyncEvent::ViewChanged { .. } => "view_changed",
        SyncEvent::Connectivity { .. } => "connectivity",
        SyncEvent::BatchStarted { .. } => "batch_started",
        SyncEvent::BatchCompleted { .. } => "batch_completed",
    }
}

fn heartbeat() -> String {
    serde_json::json!({
        "type": "heartbeat",
        "timestamp": chrono::Utc::now().timestamp(),
    })
    .to_string()
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let mut rx = state.engine().subscribe();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();

    info!("WebSocket client connected");

    let send_task = tokio::spawn(async move {
        let mut heartbeat_timer = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat_timer.tick().await;

        loop {
            let text = tokio::select! {
                result = rx.recv() => match result {
                    Ok(event) => {
                        WS_MESSAGES_SENT.with_label_values(&[event_type(&event)]).inc();
                        match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(e) => {
                                error!("Failed to serialize SyncEvent: {}", e);
                                continue;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // The UI re-reads the window on the next event anyway.
                        warn!("WebSocket client lagged, skipped {} events", n);
                        WS_LAG_EVENTS.inc();
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Event channel closed");
                        break;
                    }
                },
                _ = heartbeat_timer.tick() => {
                    WS_MESSAGES_SENT.with_label_values(&["heartbeat"]).inc();
                    heartbeat()
                }
            };

            if sender.send(Message::Text(text.into())).await.is_err() {
                debug!("WebSocket send failed, client disconnected");
                break;
            }
        }
    });

    // Client messages are not part of the protocol; only watch for close.
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client requested close");
                break;
            }
            Ok(Message::Text(text)) => {
                debug!("Ignoring client text message: {}", text.as_str());
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    send_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!("WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = SyncEvent::SelectionChanged { size: 3 };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event_type(&event));
        assert_eq!(json["size"], 3);
    }

    #[test]
    fn test_heartbeat_shape() {
        let json: serde_json::Value = serde_json::from_str(&heartbeat()).unwrap();
        assert_eq!(json["type"], "heartbeat");
        assert!(json["timestamp"].is_i64());
    }
}
