use crate::directory::SensorStatus;
use crate::engine::{ReconcileEngine, StatusChange};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Shared application state for the WebSocket handler
#[derive(Clone)]
pub struct WsAppState {
    pub engine: Arc<ReconcileEngine>,
}

/// Server → Client: status change notification
#[derive(Debug, Clone, Serialize)]
pub struct StatusChangeMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub id: i64,
    pub location: String,
    pub status: SensorStatus,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl From<StatusChange> for StatusChangeMessage {
    fn from(change: StatusChange) -> Self {
        Self {
            msg_type: "status_change".to_string(),
            id: change.id,
            location: change.location,
            status: change.status,
            updated_at: change.updated_at,
        }
    }
}

/// Create WebSocket router
pub fn create_ws_router(state: Arc<WsAppState>) -> Router {
    Router::new()
        .route("/api/ws", get(ws_handler))
        .with_state(state)
}

/// GET /api/ws - WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<WsAppState>>) -> Response {
    info!("WebSocket upgrade request received");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle one observer connection: forward every status change as JSON.
///
/// Delivery is best-effort. A lagging receiver skips the overwritten events
/// and keeps going; there is no replay for observers that connect later.
async fn handle_socket(mut socket: WebSocket, state: Arc<WsAppState>) {
    let mut change_rx = state.engine.subscribe();

    info!("Observer connected");

    loop {
        tokio::select! {
            // Handle incoming client frames (observers only listen)
            Some(msg) = socket.recv() => {
                match msg {
                    Ok(Message::Close(_)) => {
                        info!("Observer disconnected");
                        break;
                    }
                    Ok(Message::Ping(data)) => {
                        if let Err(e) = socket.send(Message::Pong(data)).await {
                            error!(error = %e, "Failed to send pong");
                            break;
                        }
                    }
                    Ok(_) => {
                        // Ignore text, binary, pong frames
                    }
                    Err(e) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                }
            }

            // Forward status changes from the engine broadcast
            result = change_rx.recv() => {
                match result {
                    Ok(change) => {
                        if let Err(e) = send_status_change(&mut socket, change).await {
                            error!(error = %e, "Failed to send status change");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "Observer lagged, skipped status changes");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        error!("Status change broadcast channel closed");
                        break;
                    }
                }
            }

            else => {
                break;
            }
        }
    }

    info!("Observer connection closed");
}

async fn send_status_change(socket: &mut WebSocket, change: StatusChange) -> anyhow::Result<()> {
    let msg = StatusChangeMessage::from(change);
    let json = serde_json::to_string(&msg)?;
    socket.send(Message::Text(json)).await?;
    Ok(())
}
