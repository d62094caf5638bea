//! WebSocket control channel.
//!
//! Clients connect with `GET /ws?token=<jwt>`. A token that fails
//! verification closes the channel with the reserved 4001 code before any
//! session state is created. A verified connect registers the session and
//! queues an immediate catch-up sync for every enabled account.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use chrono::Utc;
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::{verify_token, CLOSE_UNAUTHORIZED};
use crate::scheduler::SyncScheduler;

use super::messages::{ClientMessage, ServerMessage};

/// Server-side keep-alive cadence on the control channel
const PING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    token: String,
}

/// Handle the WebSocket upgrade for the control channel
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(auth): Query<WsAuthQuery>,
    State(scheduler): State<Arc<SyncScheduler>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, scheduler, auth.token))
}

async fn handle_socket(socket: WebSocket, scheduler: Arc<SyncScheduler>, token: String) {
    let (mut sender, mut receiver) = socket.split();

    // Verify identity before any state is created
    let user_id = match verify_token(&token, &scheduler.config.jwt_secret) {
        Ok(user_id) => user_id,
        Err(e) => {
            warn!("control channel rejected: {}", e);
            let _ = sender
                .send(Message::Close(Some(CloseFrame {
                    code: CLOSE_UNAUTHORIZED,
                    reason: "unauthorized".into(),
                })))
                .await;
            return;
        }
    };

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();

    let queued = match scheduler
        .connect_user(user_id, outbound_tx.clone(), Utc::now())
        .await
    {
        Ok(queued) => queued,
        Err(e) => {
            error!("account fetch for {} failed at connect: {}", user_id, e);
            let _ = sender
                .send(Message::Close(Some(CloseFrame {
                    code: 1011,
                    reason: "internal error".into(),
                })))
                .await;
            return;
        }
    };

    scheduler.registry.push_to_user(
        user_id,
        ServerMessage::SessionReady {
            accounts_queued: queued,
            timestamp: Utc::now(),
        },
    );

    let mut ping = interval(PING_INTERVAL);

    loop {
        select! {
            // Client -> server control messages
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&text, user_id, &scheduler);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("control channel error for {}: {}", user_id, e);
                        break;
                    }
                    _ => {}
                }
            }

            // Server -> client pushes (channel handle held by the registry)
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(message) => {
                        if send_json(&mut sender, &message).await.is_err() {
                            break;
                        }
                    }
                    // session replaced by a newer connection
                    None => break,
                }
            }

            // Keep-alive
            _ = ping.tick() => {
                let message = ServerMessage::Ping { timestamp: Utc::now() };
                if send_json(&mut sender, &message).await.is_err() {
                    break;
                }
            }
        }
    }

    scheduler.disconnect_user(user_id, &outbound_tx, Utc::now());
    info!("control channel closed for {}", user_id);
}

/// Apply one client message to the registry. Malformed frames are logged
/// and ignored; they never tear the connection down.
fn handle_client_message(text: &str, user_id: Uuid, scheduler: &SyncScheduler) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            debug!("ignoring malformed control message from {}: {}", user_id, e);
            return;
        }
    };

    match message {
        ClientMessage::Heartbeat => {
            scheduler.registry.record_heartbeat(user_id, Utc::now());
        }
        ClientMessage::ChartSubscribe { symbol } => {
            scheduler.registry.subscribe_chart(user_id, &symbol);
        }
        ClientMessage::ChartUnsubscribe { symbol } => {
            scheduler.registry.unsubscribe_chart(user_id, &symbol);
        }
    }
}

async fn send_json(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    match serde_json::to_string(message) {
        Ok(json) => sender.send(Message::Text(json)).await,
        Err(e) => {
            error!("failed to serialize server message: {}", e);
            Ok(())
        }
    }
}
