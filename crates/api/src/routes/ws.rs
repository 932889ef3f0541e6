//! Live monitoring over WebSocket, one session per connection

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use monitor::{FrameReport, MonitorSession};
use pose_capture::PoseFrame;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::routes::alerts::AlertAck;
use crate::AppState;

/// Client messages
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Frame { frame: PoseFrame },
    Ping,
    Responded,
}

/// Server messages
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Session { session_id: Uuid },
    Result { report: FrameReport },
    Alert { ack: AlertAck },
    Pong,
    Error { message: String },
}

pub async fn monitor_socket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send(socket: &mut WebSocket, message: &ServerMessage) -> bool {
    match serde_json::to_string(message) {
        Ok(text) => socket.send(Message::Text(text)).await.is_ok(),
        Err(e) => {
            warn!("Failed to encode message: {}", e);
            true
        }
    }
}

/// Apply one client message to the session
pub fn handle_message(session: &MonitorSession, text: &str) -> ServerMessage {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            return ServerMessage::Error {
                message: format!("invalid message: {}", e),
            }
        }
    };

    match message {
        ClientMessage::Frame { frame } => match session.process_frame(&frame) {
            Ok(report) => ServerMessage::Result { report },
            Err(e) => ServerMessage::Error {
                message: e.to_string(),
            },
        },
        ClientMessage::Ping => ServerMessage::Pong,
        ClientMessage::Responded => {
            let transition = session.driver_responded();
            ServerMessage::Alert {
                ack: AlertAck::new(transition, session.escalation_status()),
            }
        }
    }
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let session = match state.registry.create().await {
        Ok(session) => session,
        Err(e) => {
            warn!("Could not open session for WebSocket client: {}", e);
            let _ = send(&mut socket, &ServerMessage::Error { message: e.to_string() }).await;
            return;
        }
    };
    let id = session.id();
    info!(session_id = %id, "WebSocket client connected");

    if send(&mut socket, &ServerMessage::Session { session_id: id }).await {
        while let Some(Ok(message)) = socket.recv().await {
            let reply = match message {
                Message::Text(text) => handle_message(&session, &text),
                Message::Close(_) => break,
                other => {
                    debug!(session_id = %id, "Ignoring message: {:?}", other);
                    continue;
                }
            };
            if !send(&mut socket, &reply).await {
                break;
            }
        }
    }

    drop(session);
    if let Err(e) = state.registry.close(id).await {
        warn!(session_id = %id, "Session already closed: {}", e);
    }
    info!(session_id = %id, "WebSocket client disconnected");
}
