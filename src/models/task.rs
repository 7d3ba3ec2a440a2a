use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::worker::ConnectionId;

/// Task kind the orchestrator submits for one photo.
pub const ANALYZE_IMAGE: &str = "analyze_image";

/// Unique identifier of a submitted task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Status of a task inside the broker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    Completed,
    Failed,
}

/// Data sent to a worker with an `analyze_image` task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    pub image_base64: String,
    pub prompt: String,
    pub model: String,
}

/// One unit of work owned by the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub kind: String,
    pub payload: TaskPayload,
    pub status: TaskStatus,
    pub assigned_worker: Option<ConnectionId>,
    pub created_at: DateTime<Utc>,
    /// Submission order; breaks `created_at` ties.
    pub seq: u64,
}

impl Task {
    pub fn new(kind: impl Into<String>, payload: TaskPayload, seq: u64) -> Self {
        Self {
            id: TaskId::generate(),
            kind: kind.into(),
            payload,
            status: TaskStatus::Pending,
            assigned_worker: None,
            created_at: Utc::now(),
            seq,
        }
    }

    pub fn assign(&mut self, worker: ConnectionId) {
        self.status = TaskStatus::Assigned;
        self.assigned_worker = Some(worker);
    }

    /// Return an abandoned task to the queue.
    pub fn requeue(&mut self) {
        self.status = TaskStatus::Pending;
        self.assigned_worker = None;
    }

    pub fn finish(&mut self, succeeded: bool) {
        self.status = if succeeded {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        self.assigned_worker = None;
    }
}
