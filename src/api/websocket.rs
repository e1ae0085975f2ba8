// SPDX-License-Identifier: GPL-3.0-only
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::routing::get;
use axum::Json;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::api::handlers::{ApiHandlers, ApiResult};

/// Commands a client may send over the socket.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum WsMessage {
    EnsureAlbum { pin_id: i64 },
    NewCollection { pin_id: i64 },
    GetState { pin_id: i64 },
}

#[derive(Debug, Serialize, Deserialize)]
struct WsResponse {
    success: bool,
    data: Option<serde_json::Value>,
    error: Option<String>,
}

impl<T: Serialize> From<ApiResult<T>> for WsResponse {
    fn from(result: ApiResult<T>) -> Self {
        match result {
            Ok(Json(response)) => WsResponse {
                success: response.success,
                data: response.data.and_then(|v| serde_json::to_value(v).ok()),
                error: response.error,
            },
            Err(e) => WsResponse {
                success: false,
                data: None,
                error: Some(e.message),
            },
        }
    }
}

/// Serves `/ws`: every connection receives each `SyncEvent` as a JSON text
/// frame and may send album commands.
pub struct WebSocketServer {
    handlers: Arc<ApiHandlers>,
}

impl WebSocketServer {
    pub fn new(handlers: Arc<ApiHandlers>) -> Self {
        Self { handlers }
    }

    pub fn router(&self) -> Router {
        let handlers = self.handlers.clone();
        Router::new().route(
            "/ws",
            get(move |ws: WebSocketUpgrade| async move {
                ws.on_upgrade(move |socket| handle_socket(socket, handlers))
            }),
        )
    }
}

async fn handle_socket(socket: WebSocket, handlers: Arc<ApiHandlers>) {
    let subscription = handlers.album().subscribe();
    let subscription_id = subscription.id;
    let mut events = subscription.events;

    let (sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut send_task = tokio::spawn(async move {
        let mut sender = sender;
        while let Some(msg) = rx.recv().await {
            if let Err(e) = sender.send(msg).await {
                error!(error = %e, "Failed to send WebSocket message");
                break;
            }
        }
    });

    let event_tx = tx.clone();
    let event_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(text) => {
                    if event_tx.send(Message::Text(text)).is_err() {
                        break;
                    }
                }
                Err(e) => error!(error = %e, "Failed to encode sync event"),
            }
        }
    });

    let handlers_clone = handlers.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let Err(e) = handle_message(text, &handlers_clone, &tx).await {
                        error!(error = %e, "Failed to handle WebSocket message");
                    }
                }
                Message::Close(_) => {
                    info!("WebSocket connection closed");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    event_task.abort();
    handlers.album().unsubscribe(subscription_id);
    debug!(
        subscription = subscription_id,
        remaining = handlers.album().subscriber_count(),
        "WebSocket subscriber removed"
    );
}

async fn handle_message(
    text: String,
    handlers: &ApiHandlers,
    tx: &mpsc::UnboundedSender<Message>,
) -> anyhow::Result<()> {
    let msg: WsMessage = match serde_json::from_str(&text) {
        Ok(m) => m,
        Err(e) => {
            let response = WsResponse {
                success: false,
                data: None,
                error: Some(format!("Invalid message format: {}", e)),
            };
            tx.send(Message::Text(serde_json::to_string(&response)?))?;
            return Ok(());
        }
    };

    let response: WsResponse = match msg {
        WsMessage::EnsureAlbum { pin_id } => handlers.album_photos(pin_id).await.into(),
        WsMessage::NewCollection { pin_id } => handlers.new_collection(pin_id).await.into(),
        WsMessage::GetState { pin_id } => handlers.sync_state(pin_id).await.into(),
    };

    tx.send(Message::Text(serde_json::to_string(&response)?))?;
    Ok(())
}
