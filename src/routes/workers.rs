use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::app_state::AppState;
use crate::models::protocol::{ClientMessage, ServerMessage};
use crate::models::worker::ConnectionId;
use crate::services::broker::{BrokerStatus, TaskOutcome};

/// GET /api/v1/workers - broker status snapshot.
pub async fn worker_status(State(state): State<AppState>) -> Json<BrokerStatus> {
    Json(state.broker.status().await)
}

/// GET /ws - worker peer upgrade.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    // Writer: the only place frames reach the socket.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize server message");
                    continue;
                }
            };
            if sender.send(WsMessage::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let id = state.broker.connect(tx.clone()).await;
    let _ = tx.send(ServerMessage::Welcome {
        client_id: id.clone(),
        message: "Connected to analysis broker".to_string(),
    });

    let period = state.ping_interval;
    let mut ping = interval_at(Instant::now() + period, period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = receiver.next() => {
                let text = match frame {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::warn!(connection_id = %id, error = %e, "Worker socket error");
                        break;
                    }
                };
                if !state.broker.touch(&id).await {
                    tracing::info!(connection_id = %id, "Connection was evicted, closing socket");
                    break;
                }
                handle_frame(&state, &id, &tx, text.as_str()).await;
            }
            _ = ping.tick() => {
                if !state.broker.is_connected(&id).await {
                    tracing::info!(connection_id = %id, "Connection was evicted, closing socket");
                    break;
                }
                let _ = tx.send(ServerMessage::Ping {
                    timestamp: chrono::Utc::now().timestamp_millis(),
                });
            }
        }
    }

    // Runs on every exit path, including socket errors.
    state.broker.worker_disconnected(&id).await;

    drop(tx);
    let _ = send_task.await;
}

async fn handle_frame(
    state: &AppState,
    id: &ConnectionId,
    tx: &mpsc::UnboundedSender<ServerMessage>,
    text: &str,
) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(connection_id = %id, error = %e, "Invalid message from worker");
            let _ = tx.send(ServerMessage::Error {
                message: format!("Invalid message: {e}"),
            });
            return;
        }
    };

    match message {
        ClientMessage::Capabilities(capabilities) => {
            state.broker.report_capabilities(id, capabilities).await;
        }
        ClientMessage::TaskResult {
            task_id,
            result,
            error,
        } => {
            let outcome: TaskOutcome = match (error, result) {
                (Some(error), _) => Err(error),
                (None, Some(result)) => Ok(result),
                (None, None) => Err("Worker returned neither result nor error".to_string()),
            };
            state.broker.complete_task(id, &task_id, outcome).await;
        }
        ClientMessage::StatusUpdate {
            status,
            task_progress,
        } => {
            tracing::debug!(connection_id = %id, status = %status, progress = ?task_progress, "Worker status update");
            state.broker.record_status(id, status).await;
        }
        ClientMessage::Pong { timestamp } => {
            tracing::trace!(connection_id = %id, timestamp = ?timestamp, "Pong");
        }
    }
}
