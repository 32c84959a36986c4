//! Axum WebSocket handler
//!
//! This module contains the WebSocket upgrade handler and the per-connection
//! loop. Authentication happens at upgrade time; a rejected client still gets
//! the upgrade so the error can travel as a normal protocol message before
//! the socket closes.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::state::AppState;

use super::{
    messages::{MessageRoute, ServerMessage, SpeakRequest},
    processor::handle_speak_request,
};

/// Optimized channel buffer size for audio workloads
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// WebSocket speech relay handler
/// Upgrades the HTTP connection to WebSocket for one voicing session
pub async fn ws_speech_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!("WebSocket speech connection upgrade requested");
    let authorized = authorize(&state.config, &params, &headers);
    ws.on_upgrade(move |socket| handle_speech_socket(socket, state, authorized))
}

/// Check the upgrade request against the configured auth token.
/// The token may arrive as a `token` query parameter or a bearer header;
/// with no token configured every connection is accepted.
fn authorize(
    config: &ServerConfig,
    params: &HashMap<String, String>,
    headers: &HeaderMap,
) -> bool {
    let Some(expected) = config.auth_token.as_deref() else {
        return true;
    };
    if params.get("token").map(String::as_str) == Some(expected) {
        return true;
    }
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        == Some(expected)
}

/// Handle one WebSocket voicing session
async fn handle_speech_socket(mut socket: WebSocket, app_state: Arc<AppState>, authorized: bool) {
    if !authorized {
        warn!("Rejecting unauthenticated speech connection");
        let message = ServerMessage::Error {
            message: "Unauthorized".to_string(),
        };
        if let Ok(json) = serde_json::to_string(&message) {
            let _ = socket.send(Message::Text(json.into())).await;
        }
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    let connection_id = Uuid::new_v4().to_string();
    info!("WebSocket speech connection established: {connection_id}");
    let (mut sender, mut receiver) = socket.split();

    let (message_tx, mut message_rx) = mpsc::channel::<MessageRoute>(CHANNEL_BUFFER_SIZE);

    // Dedicated sender task, direct serialization for low latency
    let sender_task = tokio::spawn(async move {
        while let Some(route) = message_rx.recv().await {
            let result = match route {
                MessageRoute::Outgoing(message) => match serde_json::to_string(&message) {
                    Ok(json) => sender.send(Message::Text(json.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing message: {e}");
                        continue;
                    }
                },
                MessageRoute::Binary(data) => sender.send(Message::Binary(data)).await,
            };
            if let Err(e) = result {
                error!("Failed to send WebSocket message: {e}");
                break;
            }
        }
    });

    // Requests are handled to completion before the next one is read, which
    // enforces the one-chunk-in-flight discipline server-side as well
    while let Some(msg_result) = receiver.next().await {
        match msg_result {
            Ok(msg) => {
                if !process_message(msg, &message_tx, &app_state).await {
                    break;
                }
            }
            Err(e) => {
                warn!("WebSocket error: {e}");
                break;
            }
        }
    }

    // Let queued messages (a final error, usually) flush before teardown
    drop(message_tx);
    let _ = tokio::time::timeout(std::time::Duration::from_secs(1), sender_task).await;
    info!("WebSocket speech connection terminated: {connection_id}");
}

/// Process one incoming WebSocket message.
/// Returns false when the session should end.
async fn process_message(
    msg: Message,
    message_tx: &mpsc::Sender<MessageRoute>,
    app_state: &Arc<AppState>,
) -> bool {
    match msg {
        Message::Text(text) => {
            debug!("Received speak request: {} bytes", text.len());
            let request: SpeakRequest = match serde_json::from_str(&text) {
                Ok(request) => request,
                Err(e) => {
                    error!("Failed to parse speak request: {e}");
                    let _ = message_tx
                        .send(MessageRoute::Outgoing(ServerMessage::Error {
                            message: format!("Invalid request format: {e}"),
                        }))
                        .await;
                    return true;
                }
            };
            handle_speak_request(request, app_state, message_tx).await
        }
        Message::Binary(_) => {
            debug!("Ignoring binary frame from client");
            true
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            info!("WebSocket connection closed by client");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_token(token: Option<&str>) -> ServerConfig {
        let mut config = ServerConfig::defaults();
        config.auth_token = token.map(String::from);
        config
    }

    #[test]
    fn test_authorize_without_configured_token() {
        let config = config_with_token(None);
        assert!(authorize(&config, &HashMap::new(), &HeaderMap::new()));
    }

    #[test]
    fn test_authorize_query_token() {
        let config = config_with_token(Some("sesame"));
        let mut params = HashMap::new();
        params.insert("token".to_string(), "sesame".to_string());
        assert!(authorize(&config, &params, &HeaderMap::new()));

        params.insert("token".to_string(), "wrong".to_string());
        assert!(!authorize(&config, &params, &HeaderMap::new()));
    }

    #[test]
    fn test_authorize_bearer_header() {
        let config = config_with_token(Some("sesame"));
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            "Bearer sesame".parse().unwrap(),
        );
        assert!(authorize(&config, &HashMap::new(), &headers));

        let mut bad = HeaderMap::new();
        bad.insert(
            axum::http::header::AUTHORIZATION,
            "Bearer wrong".parse().unwrap(),
        );
        assert!(!authorize(&config, &HashMap::new(), &bad));
        assert!(!authorize(&config, &HashMap::new(), &HeaderMap::new()));
    }
}
