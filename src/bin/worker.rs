use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tracing_subscriber::EnvFilter;

use veggie_scan::{
    config::WorkerConfig,
    models::{
        protocol::{ClientMessage, ServerMessage},
        task::{TaskId, TaskPayload, ANALYZE_IMAGE},
        worker::WorkerCapabilities,
    },
    services::{
        inference::{ImageInput, InferenceClient, InferenceError},
        normalizer,
    },
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting veggie-scan worker");

    let config = WorkerConfig::from_env().expect("Failed to load configuration");

    let inference = InferenceClient::new(
        &config.inference_base_url,
        &config.inference_chat_path,
        &config.inference_model,
        config.inference_timeout(),
    )
    .expect("Failed to initialize inference client");
    let inference = Arc::new(inference);

    // Reconnect forever; the broker requeues anything we held.
    loop {
        match run_session(&config, &inference).await {
            Ok(()) => tracing::info!("Broker closed the connection"),
            Err(e) => tracing::error!(error = %e, "Worker session failed"),
        }

        tracing::info!(
            delay_secs = config.reconnect_delay().as_secs(),
            "Reconnecting to broker"
        );
        sleep(config.reconnect_delay()).await;
    }
}

async fn run_session(config: &WorkerConfig, inference: &Arc<InferenceClient>) -> Result<(), BoxError> {
    tracing::info!(url = %config.broker_ws_url, "Connecting to broker");
    let (stream, _) = tokio_tungstenite::connect_async(config.broker_ws_url.as_str()).await?;
    let (mut sink, mut source) = stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ClientMessage>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize worker message");
                    continue;
                }
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = source.next().await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let message: ServerMessage = match serde_json::from_str(text.as_str()) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable frame from broker");
                continue;
            }
        };

        match message {
            ServerMessage::Welcome { client_id, message } => {
                tracing::info!(client_id = %client_id, message = %message, "Registered with broker");
                let capabilities = detect_capabilities(config, inference).await;
                let _ = tx.send(ClientMessage::Capabilities(capabilities));
            }
            ServerMessage::CapabilitiesAck { message } => {
                tracing::info!(message = %message, "Capabilities acknowledged");
            }
            ServerMessage::Ping { .. } => {
                let _ = tx.send(ClientMessage::Pong {
                    timestamp: Some(chrono::Utc::now().timestamp_millis()),
                });
            }
            ServerMessage::Task {
                task_id,
                task_type,
                data,
            } => {
                tokio::spawn(run_task(inference.clone(), tx.clone(), task_id, task_type, data));
            }
            ServerMessage::ClientList { clients } => {
                tracing::debug!(connected = clients.len(), "Client list updated");
            }
            ServerMessage::Error { message } => {
                tracing::warn!(message = %message, "Broker reported an error");
            }
        }
    }

    drop(tx);
    writer.abort();
    Ok(())
}

async fn detect_capabilities(config: &WorkerConfig, inference: &InferenceClient) -> WorkerCapabilities {
    let cpu = config.worker_cpu.clone().unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|cores| format!("{cores} cores"))
            .unwrap_or_else(|_| "Unknown CPU".to_string())
    });

    let (has_inference_engine, available_models) = match inference.list_models().await {
        Ok(models) => (true, models),
        Err(e) => {
            tracing::warn!(error = %e, "Local inference endpoint not reachable");
            (false, Vec::new())
        }
    };

    WorkerCapabilities {
        cpu,
        gpu: config.worker_gpu.clone().unwrap_or_else(|| "Unknown GPU".to_string()),
        memory: config.worker_ram.clone().unwrap_or_else(|| "Unknown RAM".to_string()),
        has_inference_engine,
        available_models,
    }
}

async fn run_task(
    inference: Arc<InferenceClient>,
    tx: mpsc::UnboundedSender<ClientMessage>,
    task_id: TaskId,
    task_type: String,
    data: TaskPayload,
) {
    tracing::info!(task_id = %task_id, task_type = %task_type, "Received task");
    let _ = tx.send(ClientMessage::StatusUpdate {
        status: "busy".to_string(),
        task_progress: Some(serde_json::json!({ "taskId": task_id, "progress": 0 })),
    });

    let outcome = if task_type == ANALYZE_IMAGE {
        analyze(&inference, &data).await.map_err(|e| e.to_string())
    } else {
        Err(format!("Unknown task type: {task_type}"))
    };

    let reply = match outcome {
        Ok(result) => {
            tracing::info!(task_id = %task_id, "Task finished");
            ClientMessage::TaskResult {
                task_id,
                result: Some(result),
                error: None,
            }
        }
        Err(error) => {
            tracing::error!(task_id = %task_id, error = %error, "Task failed");
            ClientMessage::TaskResult {
                task_id,
                result: None,
                error: Some(error),
            }
        }
    };
    let _ = tx.send(reply);

    let _ = tx.send(ClientMessage::StatusUpdate {
        status: "ready".to_string(),
        task_progress: None,
    });
}

async fn analyze(inference: &InferenceClient, data: &TaskPayload) -> Result<serde_json::Value, TaskError> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(&data.image_base64)?;
    let content_type = image::guess_format(&bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or("image/jpeg");
    let image = ImageInput::new(bytes, content_type);

    let model = (!data.model.is_empty()).then_some(data.model.as_str());
    let raw = inference.complete(&image, &data.prompt, model).await?;

    let verdict = normalizer::normalize(&raw);
    Ok(serde_json::to_value(verdict)?)
}

#[derive(Debug, thiserror::Error)]
enum TaskError {
    #[error("Image payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("Failed to encode verdict: {0}")]
    Encode(#[from] serde_json::Error),
}
