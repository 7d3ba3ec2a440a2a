use serde::{Deserialize, Serialize};

use super::task::{TaskId, TaskPayload};
use super::worker::{ConnectionId, WorkerCapabilities, WorkerSummary};

/// Frames the broker sends to a worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Welcome {
        client_id: ConnectionId,
        message: String,
    },
    CapabilitiesAck {
        message: String,
    },
    Task {
        task_id: TaskId,
        task_type: String,
        data: TaskPayload,
    },
    Ping {
        timestamp: i64,
    },
    ClientList {
        clients: Vec<WorkerSummary>,
    },
    Error {
        message: String,
    },
}

/// Frames a worker sends to the broker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Capabilities(WorkerCapabilities),
    TaskResult {
        task_id: TaskId,
        #[serde(default)]
        result: Option<serde_json::Value>,
        #[serde(default)]
        error: Option<String>,
    },
    StatusUpdate {
        status: String,
        #[serde(default)]
        task_progress: Option<serde_json::Value>,
    },
    Pong {
        #[serde(default)]
        timestamp: Option<i64>,
    },
}
