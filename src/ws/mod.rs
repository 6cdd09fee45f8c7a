pub mod handlers;
pub mod session;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};

use crate::auth::extract_credential;
use crate::protocol::ServerMessage;
use crate::state::CollabState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    headers: HeaderMap,
    State(state): State<CollabState>,
) -> impl IntoResponse {
    let credential = extract_credential(&headers, params.token.as_deref());
    tracing::info!(
        has_credential = credential.is_some(),
        "WebSocket connection request"
    );

    ws.on_upgrade(move |socket| handle_socket(socket, credential, state))
}

/// Pump one WebSocket: frames in become session events, the outbox goes out.
///
/// The session runs as its own task. When the socket goes away the close
/// signal is sent; when the session closes (e.g. failed authentication) its
/// outbox ends and the socket is closed.
async fn handle_socket(socket: WebSocket, credential: Option<String>, state: CollabState) {
    let (mut sender, mut receiver) = socket.split();

    let (outbox, mut outbox_rx) = mpsc::channel::<ServerMessage>(state.config.outbox_capacity);
    let (inbox, inbox_rx) = mpsc::channel(state.config.inbox_capacity);
    let (close_tx, close_rx) = oneshot::channel::<()>();

    let session = state.open_session(outbox);
    let connection_id = session.id().to_string();
    tracing::info!(connection_id = %connection_id, "WebSocket connected");

    let driver = tokio::spawn(session.run(credential, inbox_rx, close_rx));

    loop {
        tokio::select! {
            outbound = outbox_rx.recv() => {
                match outbound {
                    Some(msg) => {
                        if let Ok(json) = serde_json::to_string(&msg) {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                tracing::error!(connection_id = %connection_id, "Failed to send message");
                                break;
                            }
                        }
                    }
                    None => {
                        // Session closed
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!(connection_id = %connection_id, "Received message: {}", text.as_str());

                        match handlers::decode_frame(text.as_str()) {
                            Ok(event) => {
                                if inbox.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Err(error) => {
                                if let Ok(json) = serde_json::to_string(&error) {
                                    let _ = sender.send(Message::Text(json.into())).await;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!(connection_id = %connection_id, "WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!(connection_id = %connection_id, "WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    let _ = close_tx.send(());
    drop(inbox);
    if let Err(e) = driver.await {
        tracing::error!(connection_id = %connection_id, "Session task failed: {}", e);
    }

    tracing::info!(connection_id = %connection_id, "WebSocket connection closed");
}
