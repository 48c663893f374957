//! WebSocket front door and the connection registry.
//!
//! The browser widget opens one socket, announces itself with
//! `c_user_login`, then asks questions with `c_create_answer`. Answers
//! come back as `s_create_answer_<emitId>` frames addressed through the
//! registry, so any part of the backend can reach "the socket of session
//! X" without holding the connection itself.

use crate::gateway::GatewayState;
use crate::models::{AnswerPayload, AnswerRequest};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, warn};
use validator::Validate;

/// A frame pushed to the browser: `{ "event": ..., "data": ... }`.
#[derive(Debug, Clone, Serialize)]
pub struct ServerEvent {
    pub event: String,
    pub data: serde_json::Value,
}

impl ServerEvent {
    /// An answer frame for the exchange identified by `emit_id`.
    pub fn answer(emit_id: &str, payload: AnswerPayload) -> Self {
        Self {
            event: format!("s_create_answer_{}", emit_id),
            data: serde_json::to_value(payload).unwrap_or_default(),
        }
    }

    /// Notifies the client that its asynchronous TTS audio is ready.
    pub fn audio_ready(url: &str) -> Self {
        Self {
            event: "s_callback_audio_success".to_string(),
            data: serde_json::Value::String(url.to_string()),
        }
    }
}

/// A frame received from the browser.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Registers this connection under a client-generated id.
    #[serde(rename = "c_user_login")]
    UserLogin(String),
    /// Asks for an answer, delivered back over the registered socket.
    #[serde(rename = "c_create_answer")]
    CreateAnswer(AnswerRequest),
}

type Outbound = mpsc::UnboundedSender<ServerEvent>;

/// Maps session ids to live socket senders, plus the pending asynchronous
/// TTS requests awaiting a provider callback.
#[derive(Clone, Default)]
pub struct SocketRegistry {
    connections: Arc<RwLock<HashMap<String, Outbound>>>,
    /// TTS request id → session id waiting for that audio.
    audio_waiters: Arc<RwLock<HashMap<String, String>>>,
}

impl SocketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection under `session_id`. A later login with the
    /// same id (page reload) replaces the earlier sender.
    pub async fn register(&self, session_id: &str, sender: Outbound) {
        let mut connections = self.connections.write().await;
        connections.insert(session_id.to_string(), sender);
        info!("Socket registered for session {} ({} online)", session_id, connections.len());
    }

    /// Drops every registration pointing at this connection. Called on
    /// disconnect, where only the sender is known.
    pub async fn remove_connection(&self, sender: &Outbound) {
        let mut connections = self.connections.write().await;
        connections.retain(|_, registered| !registered.same_channel(sender));
    }

    /// Sends an event to the socket registered for `session_id`. A missing
    /// or dead registration drops the frame with a warning; answering into
    /// the void is not an error.
    pub async fn emit(&self, session_id: &str, event: ServerEvent) -> bool {
        let connections = self.connections.read().await;
        match connections.get(session_id) {
            Some(sender) => match sender.send(event) {
                Ok(()) => true,
                Err(_) => {
                    warn!("Socket for session {} is gone, dropping frame", session_id);
                    false
                }
            },
            None => {
                warn!("No socket registered for session {}, dropping frame", session_id);
                false
            }
        }
    }

    pub async fn register_audio_waiter(&self, request_id: &str, session_id: &str) {
        self.audio_waiters
            .write()
            .await
            .insert(request_id.to_string(), session_id.to_string());
    }

    pub async fn take_audio_waiter(&self, request_id: &str) -> Option<String> {
        self.audio_waiters.write().await.remove(request_id)
    }
}

/// `GET /ws`: upgrades to the socket protocol described above.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerEvent>();

    // Writer half: drain the outbound queue onto the wire.
    let writer = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to serialize server event: {}", e);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Reader half: dispatch client events until the peer goes away.
    while let Some(Ok(message)) = ws_rx.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        match serde_json::from_str::<ClientEvent>(text.as_str()) {
            Ok(ClientEvent::UserLogin(session_id)) => {
                state.registry.register(&session_id, out_tx.clone()).await;
            }
            Ok(ClientEvent::CreateAnswer(request)) => {
                if let Err(e) = request.validate() {
                    let _ = out_tx.send(ServerEvent::answer(
                        &request.emit_id,
                        AnswerPayload::error(format!("Câu hỏi không hợp lệ: {}", e)),
                    ));
                    continue;
                }
                spawn_answer(&state, request);
            }
            Err(e) => {
                warn!("Unparseable client event: {}", e);
            }
        }
    }

    state.registry.remove_connection(&out_tx).await;
    writer.abort();
    info!("Socket disconnected");
}

/// Runs one question in its own task so a slow answer never blocks the
/// socket reader.
fn spawn_answer(state: &GatewayState, request: AnswerRequest) {
    let supervisor = state.supervisor.clone();
    let registry = state.registry.clone();
    tokio::spawn(async move {
        let session_id = request.session_id.clone();
        let emit_id = request.emit_id.clone();
        if let Err(e) = supervisor.process_question(request).await {
            error!("Answer failed for session {}: {}", session_id, e);
            let message = match e {
                crate::error::AppError::RateLimited => return, // already delivered
                _ => "Xin lỗi, hệ thống đang gặp sự cố. Bạn vui lòng thử lại sau nhé!",
            };
            registry
                .emit(&session_id, ServerEvent::answer(&emit_id, AnswerPayload::error(message)))
                .await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_and_emit_round_trip() {
        let registry = SocketRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register("session-1", tx).await;

        assert!(registry.emit("session-1", ServerEvent::audio_ready("https://a/b.mp3")).await);
        let event = rx.try_recv().unwrap();
        assert_eq!(event.event, "s_callback_audio_success");
        assert_eq!(event.data, serde_json::json!("https://a/b.mp3"));
    }

    #[tokio::test]
    async fn emit_to_unknown_session_is_dropped() {
        let registry = SocketRegistry::new();
        assert!(!registry.emit("ghost", ServerEvent::audio_ready("u")).await);
    }

    #[tokio::test]
    async fn relogin_replaces_earlier_registration() {
        let registry = SocketRegistry::new();
        let (old_tx, mut old_rx) = mpsc::unbounded_channel();
        let (new_tx, mut new_rx) = mpsc::unbounded_channel();
        registry.register("session-1", old_tx).await;
        registry.register("session-1", new_tx).await;

        registry.emit("session-1", ServerEvent::audio_ready("u")).await;
        assert!(old_rx.try_recv().is_err());
        assert!(new_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn remove_connection_clears_every_alias() {
        let registry = SocketRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.register("alias-a", tx.clone()).await;
        registry.register("alias-b", tx.clone()).await;

        registry.remove_connection(&tx).await;
        assert!(!registry.emit("alias-a", ServerEvent::audio_ready("u")).await);
        assert!(!registry.emit("alias-b", ServerEvent::audio_ready("u")).await);
    }

    #[tokio::test]
    async fn audio_waiters_are_taken_once() {
        let registry = SocketRegistry::new();
        registry.register_audio_waiter("req-9", "session-1").await;
        assert_eq!(registry.take_audio_waiter("req-9").await.as_deref(), Some("session-1"));
        assert_eq!(registry.take_audio_waiter("req-9").await, None);
    }

    #[test]
    fn client_events_deserialize_from_wire_frames() {
        let login: ClientEvent =
            serde_json::from_str(r#"{"event":"c_user_login","data":"abc-1"}"#).unwrap();
        assert!(matches!(login, ClientEvent::UserLogin(id) if id == "abc-1"));

        let ask: ClientEvent = serde_json::from_str(
            r#"{"event":"c_create_answer","data":{"sessionId":"abc-1","question":"hi","emitId":"e1"}}"#,
        )
        .unwrap();
        assert!(matches!(ask, ClientEvent::CreateAnswer(req) if req.emit_id == "e1"));
    }
}
