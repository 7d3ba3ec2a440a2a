//! Test helper utilities: in-process server, stub inference endpoint and
//! WebSocket worker plumbing.
#![allow(dead_code)]

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use veggie_scan::{
    app_state::AppState,
    routes,
    services::{
        broker::{BrokerSettings, TaskBroker},
        dataset::MemoryDataset,
        inference::InferenceClient,
    },
};

/// Nothing listens on the discard port.
pub const UNREACHABLE_INFERENCE: &str = "http://127.0.0.1:9";

pub type WorkerSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Stub OpenAI-compatible endpoint that answers every chat request the same way.
pub struct StubInference {
    pub base_url: String,
    pub requests: Arc<Mutex<Vec<Value>>>,
}

pub async fn spawn_stub_inference(status: StatusCode, content: &str) -> StubInference {
    let content = content.to_string();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = requests.clone();

    let app = Router::new()
        .route(
            "/v1/models",
            get(|| async { Json(json!({ "data": [{ "id": "google/gemma-3-4b" }] })) }),
        )
        .route(
            "/v1/chat/completions",
            post(move |Json(body): Json<Value>| {
                let content = content.clone();
                let recorded = recorded.clone();
                async move {
                    recorded.lock().await.push(body);
                    (
                        status,
                        Json(json!({
                            "choices": [{ "message": { "role": "assistant", "content": content } }]
                        })),
                    )
                }
            }),
        );

    let addr = serve(app).await;
    StubInference {
        base_url: format!("http://{addr}"),
        requests,
    }
}

/// Application state wired like `main`, with an in-memory dataset and a
/// running broker loop.
pub fn build_state(worker_mode: bool, inference_url: &str, worker_timeout: Duration) -> (AppState, Arc<MemoryDataset>) {
    let broker = Arc::new(TaskBroker::new(BrokerSettings {
        enabled: worker_mode,
        assign_interval: Duration::from_millis(100),
        ..BrokerSettings::default()
    }));
    tokio::spawn(broker.clone().run());

    let inference = InferenceClient::new(
        inference_url,
        "/v1/chat/completions",
        "google/gemma-3-4b",
        Duration::from_secs(5),
    )
    .expect("Failed to build inference client");

    let dataset = Arc::new(MemoryDataset::new());
    let metrics = PrometheusBuilder::new().build_recorder().handle();

    let state = AppState::new(
        broker,
        inference,
        dataset.clone(),
        metrics,
        worker_timeout,
        Duration::from_secs(30),
    );
    (state, dataset)
}

pub async fn spawn_app(state: AppState) -> SocketAddr {
    serve(routes::router(state)).await
}

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("No local address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test server error");
    });
    addr
}

/// POST a photo to `/api/v1/analyze`.
pub async fn post_image(addr: SocketAddr, bytes: &[u8], mime: &str) -> reqwest::Response {
    let part = reqwest::multipart::Part::bytes(bytes.to_vec())
        .file_name("photo")
        .mime_str(mime)
        .expect("Invalid mime type");
    let form = reqwest::multipart::Form::new().part("image", part);

    reqwest::Client::new()
        .post(format!("http://{addr}/api/v1/analyze"))
        .multipart(form)
        .send()
        .await
        .expect("Analyze request failed")
}

/// Open a worker socket and consume the `welcome` frame. Returns the
/// connection id the broker assigned.
pub async fn connect_worker(addr: SocketAddr) -> (WorkerSocket, String) {
    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("WebSocket connect failed");
    let welcome = next_of_type(&mut socket, "welcome").await;
    let client_id = welcome["clientId"].as_str().expect("welcome without clientId").to_string();
    (socket, client_id)
}

pub async fn send_json(socket: &mut WorkerSocket, value: Value) {
    socket
        .send(Message::Text(value.to_string().into()))
        .await
        .expect("WebSocket send failed");
}

/// Report GPU-less capabilities with an inference engine and wait for the ack.
pub async fn report_capabilities(socket: &mut WorkerSocket) {
    send_json(
        socket,
        json!({
            "type": "capabilities",
            "cpu": "Test CPU",
            "gpu": "Unknown GPU",
            "ram": "8 GB",
            "hasLMStudio": true,
            "models": ["google/gemma-3-4b"]
        }),
    )
    .await;
    next_of_type(socket, "capabilities_ack").await;
}

/// Next JSON text frame, failing after five seconds.
pub async fn next_message(socket: &mut WorkerSocket) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("Timed out waiting for a frame")
            .expect("Socket closed")
            .expect("Socket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("Frame is not JSON");
        }
    }
}

/// Skip frames until one of the given `type` arrives.
pub async fn next_of_type(socket: &mut WorkerSocket, kind: &str) -> Value {
    loop {
        let message = next_message(socket).await;
        if message["type"] == kind {
            return message;
        }
    }
}
