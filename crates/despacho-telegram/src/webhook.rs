// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound webhook server.
//!
//! Accepts the Telegram update envelope at `POST /telegram/webhook`, always
//! answers `{"ok":true}`, and hands text messages to a per-chat worker so
//! messages from one chat are processed strictly in arrival order while
//! different chats run concurrently. Non-text updates are acknowledged and
//! dropped.

use std::sync::Arc;
use std::time::Duration;

use axum::{Json, Router, extract::State, routing::post};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use despacho_core::{DespachoError, UpdateHandler};

/// Workers idle out after this long without traffic; the next message from
/// the chat recreates one.
const WORKER_IDLE: Duration = Duration::from_secs(300);

/// Telegram update envelope. Unknown fields are ignored by design.
#[derive(Debug, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub chat: IncomingChat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingChat {
    pub id: i64,
}

#[derive(Debug, Serialize)]
struct Ack {
    ok: bool,
}

/// Shared state for the webhook route.
#[derive(Clone)]
pub struct WebhookState {
    handler: Arc<dyn UpdateHandler>,
    workers: Arc<DashMap<String, mpsc::UnboundedSender<String>>>,
}

impl WebhookState {
    pub fn new(handler: Arc<dyn UpdateHandler>) -> Self {
        Self {
            handler,
            workers: Arc::new(DashMap::new()),
        }
    }

    /// Queue a text update for its chat's worker, creating one if needed.
    fn dispatch(&self, chat_id: String, text: String) {
        let mut text = Some(text);
        // A worker that idled out between lookup and send leaves a closed
        // channel behind; drop it and retry with a fresh one.
        while let Some(payload) = text.take() {
            let tx = self
                .workers
                .entry(chat_id.clone())
                .or_insert_with(|| spawn_worker(self.clone(), chat_id.clone()))
                .clone();
            match tx.send(payload) {
                Ok(()) => {}
                Err(mpsc::error::SendError(payload)) => {
                    self.workers
                        .remove_if(&chat_id, |_, existing| tx.same_channel(existing));
                    text = Some(payload);
                }
            }
        }
    }
}

/// One ordered worker per chat: drains its queue serially, exits when idle.
fn spawn_worker(state: WebhookState, chat_id: String) -> mpsc::UnboundedSender<String> {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let self_tx = tx.clone();

    tokio::spawn(async move {
        loop {
            match tokio::time::timeout(WORKER_IDLE, rx.recv()).await {
                Ok(Some(text)) => {
                    if let Err(e) = state.handler.handle_update(&chat_id, &text).await {
                        warn!(chat_id = chat_id.as_str(), error = %e, "update handling failed");
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    // Deregister first, then drain what raced in meanwhile.
                    state
                        .workers
                        .remove_if(&chat_id, |_, existing| self_tx.same_channel(existing));
                    while let Ok(text) = rx.try_recv() {
                        if let Err(e) = state.handler.handle_update(&chat_id, &text).await {
                            warn!(chat_id = chat_id.as_str(), error = %e, "update handling failed");
                        }
                    }
                    debug!(chat_id = chat_id.as_str(), "chat worker idled out");
                    break;
                }
            }
        }
    });

    tx
}

/// The webhook always acknowledges with `{"ok":true}`, even for envelopes
/// it cannot decode; Telegram retries anything else forever.
async fn telegram_webhook(State(state): State<WebhookState>, body: String) -> Json<Ack> {
    match serde_json::from_str::<Update>(&body) {
        Ok(Update {
            message: Some(message),
        }) => match message.text {
            Some(text) if !text.trim().is_empty() => {
                state.dispatch(message.chat.id.to_string(), text);
            }
            _ => {
                debug!(chat_id = message.chat.id, "ignoring non-text update");
            }
        },
        Ok(_) => debug!("ignoring update without message"),
        Err(e) => debug!(error = %e, "ignoring undecodable update"),
    }
    Json(Ack { ok: true })
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/telegram/webhook", post(telegram_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve the webhook until the cancellation token fires.
pub async fn start_webhook(
    host: &str,
    port: u16,
    state: WebhookState,
    cancel: CancellationToken,
) -> Result<(), DespachoError> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| DespachoError::Channel {
            message: format!("failed to bind webhook to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    info!("webhook listening on {addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| DespachoError::Channel {
            message: format!("webhook server error: {e}"),
            source: Some(Box::new(e)),
        })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Handler recording `(chat_id, text)` pairs in processing order.
    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl UpdateHandler for RecordingHandler {
        async fn handle_update(&self, chat_id: &str, text: &str) -> Result<(), DespachoError> {
            self.seen
                .lock()
                .unwrap()
                .push((chat_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    async fn drain(state: &WebhookState) {
        // Let spawned workers run their queues dry.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = state;
    }

    #[test]
    fn envelope_decodes_with_unknown_fields() {
        let raw = r#"{
            "update_id": 42,
            "message": {
                "message_id": 7,
                "chat": {"id": 1001, "type": "private", "first_name": "Ana"},
                "date": 1700000000,
                "text": "123"
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        let message = update.message.unwrap();
        assert_eq!(message.chat.id, 1001);
        assert_eq!(message.text.as_deref(), Some("123"));
    }

    #[test]
    fn envelope_without_message_decodes() {
        let update: Update =
            serde_json::from_str(r#"{"update_id": 42, "edited_message": {}}"#).unwrap();
        assert!(update.message.is_none());
    }

    #[test]
    fn envelope_with_non_text_message_decodes() {
        let raw = r#"{"message": {"chat": {"id": 1001}, "sticker": {"emoji": "x"}}}"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        assert!(update.message.unwrap().text.is_none());
    }

    #[tokio::test]
    async fn webhook_always_acks() {
        let handler = Arc::new(RecordingHandler::default());
        let state = WebhookState::new(handler.clone());

        // Empty envelope, non-text message, and garbage all get {"ok":true}.
        let ack = telegram_webhook(State(state.clone()), r#"{"update_id": 1}"#.into()).await;
        assert!(ack.ok);

        let ack = telegram_webhook(
            State(state.clone()),
            r#"{"message": {"chat": {"id": 1001}, "sticker": {}}}"#.into(),
        )
        .await;
        assert!(ack.ok);

        let ack = telegram_webhook(State(state), "not json at all".into()).await;
        assert!(ack.ok);
    }

    #[tokio::test]
    async fn same_chat_messages_are_processed_in_order() {
        let handler = Arc::new(RecordingHandler::default());
        let state = WebhookState::new(handler.clone());

        for i in 0..10 {
            state.dispatch("1001".into(), format!("msg-{i}"));
        }
        drain(&state).await;

        let seen = handler.seen.lock().unwrap().clone();
        let texts: Vec<String> = seen.into_iter().map(|(_, t)| t).collect();
        let expected: Vec<String> = (0..10).map(|i| format!("msg-{i}")).collect();
        assert_eq!(texts, expected);
    }

    #[tokio::test]
    async fn different_chats_get_independent_workers() {
        let handler = Arc::new(RecordingHandler::default());
        let state = WebhookState::new(handler.clone());

        state.dispatch("1001".into(), "a".into());
        state.dispatch("1002".into(), "b".into());
        drain(&state).await;

        let seen = handler.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(state.workers.len(), 2);
    }

    #[tokio::test]
    async fn blank_text_updates_are_dropped() {
        let handler = Arc::new(RecordingHandler::default());
        let state = WebhookState::new(handler.clone());

        telegram_webhook(
            State(state.clone()),
            r#"{"message": {"chat": {"id": 1001}, "text": "   "}}"#.into(),
        )
        .await;
        drain(&state).await;

        assert!(handler.seen.lock().unwrap().is_empty());
    }
}
