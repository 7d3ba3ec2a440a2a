use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::models::protocol::ServerMessage;
use crate::models::task::TaskId;
use crate::models::worker::{ConnectionId, WorkerCapabilities, WorkerState, WorkerSummary};

const BASE_SCORE: i64 = 100;
const PER_TASK_PENALTY: i64 = 10;
const GPU_BONUS: i64 = 50;

/// Outbound half of a worker socket.
pub type WorkerSender = mpsc::UnboundedSender<ServerMessage>;

/// One registered peer.
#[derive(Debug)]
pub struct WorkerConnection {
    pub id: ConnectionId,
    pub capabilities: Option<WorkerCapabilities>,
    pub state: WorkerState,
    pub assigned_task_ids: HashSet<TaskId>,
    pub last_seen: Instant,
    pub connected_at: Instant,
    /// Last status string the peer reported; informational only.
    pub reported_status: Option<String>,
    outbound: WorkerSender,
}

impl WorkerConnection {
    /// Candidate score: idle and GPU-equipped workers rank first.
    pub fn score(&self) -> i64 {
        let gpu = self
            .capabilities
            .as_ref()
            .is_some_and(WorkerCapabilities::has_gpu);
        BASE_SCORE - PER_TASK_PENALTY * self.assigned_task_ids.len() as i64
            + if gpu { GPU_BONUS } else { 0 }
    }

    pub fn task_count(&self) -> usize {
        self.assigned_task_ids.len()
    }

    /// Queue a frame for the socket writer. Fails once the writer is gone.
    pub fn send(&self, msg: ServerMessage) -> Result<(), RegistryError> {
        self.outbound
            .send(msg)
            .map_err(|_| RegistryError::ChannelClosed(self.id.clone()))
    }

    fn summary(&self) -> WorkerSummary {
        WorkerSummary {
            id: self.id.clone(),
            capabilities: self.capabilities.clone(),
            status: self.state,
            tasks: self.task_count(),
        }
    }
}

/// Table of live worker connections. No locking of its own; the broker holds
/// it behind the same mutex as the task table.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    connections: HashMap<ConnectionId, WorkerConnection>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a CONNECTED entry. It is unusable until capabilities arrive.
    pub fn register(&mut self, outbound: WorkerSender) -> ConnectionId {
        let id = ConnectionId::generate();
        let now = Instant::now();
        self.connections.insert(
            id.clone(),
            WorkerConnection {
                id: id.clone(),
                capabilities: None,
                state: WorkerState::Connected,
                assigned_task_ids: HashSet::new(),
                last_seen: now,
                connected_at: now,
                reported_status: None,
                outbound,
            },
        );
        info!(connection_id = %id, "Worker connected");
        id
    }

    /// CONNECTED -> READY. A repeated report refreshes capabilities only.
    /// Returns false when the connection is already gone.
    pub fn set_capabilities(&mut self, id: &ConnectionId, capabilities: WorkerCapabilities) -> bool {
        let Some(conn) = self.connections.get_mut(id) else {
            warn!(connection_id = %id, "Capabilities for unknown connection ignored");
            return false;
        };

        info!(
            connection_id = %id,
            cpu = %capabilities.cpu,
            gpu = %capabilities.gpu,
            memory = %capabilities.memory,
            has_inference_engine = capabilities.has_inference_engine,
            models = ?capabilities.available_models,
            "Worker capabilities received"
        );

        conn.capabilities = Some(capabilities);
        if conn.state == WorkerState::Connected {
            conn.state = WorkerState::Ready;
        }
        true
    }

    pub fn mark_busy(&mut self, id: &ConnectionId, task_id: &TaskId) {
        match self.connections.get_mut(id) {
            Some(conn) => {
                conn.assigned_task_ids.insert(task_id.clone());
                conn.state = WorkerState::Busy;
            }
            None => warn!(connection_id = %id, task_id = %task_id, "mark_busy on unknown connection"),
        }
    }

    /// Release one task. The connection is READY again once it holds none.
    pub fn mark_ready(&mut self, id: &ConnectionId, task_id: &TaskId) {
        match self.connections.get_mut(id) {
            Some(conn) => {
                conn.assigned_task_ids.remove(task_id);
                if conn.assigned_task_ids.is_empty() && conn.capabilities.is_some() {
                    conn.state = WorkerState::Ready;
                }
            }
            None => debug!(connection_id = %id, task_id = %task_id, "mark_ready on unknown connection"),
        }
    }

    /// Terminal transition. Returns every task the connection still held.
    pub fn remove(&mut self, id: &ConnectionId) -> HashSet<TaskId> {
        match self.connections.remove(id) {
            Some(mut conn) => {
                conn.state = WorkerState::Gone;
                let abandoned = std::mem::take(&mut conn.assigned_task_ids);
                info!(
                    connection_id = %id,
                    abandoned_tasks = abandoned.len(),
                    "Worker disconnected"
                );
                abandoned
            }
            None => HashSet::new(),
        }
    }

    /// Refresh `last_seen`. Returns false for unknown connections.
    pub fn touch(&mut self, id: &ConnectionId) -> bool {
        match self.connections.get_mut(id) {
            Some(conn) => {
                conn.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    pub fn set_reported_status(&mut self, id: &ConnectionId, status: String) {
        if let Some(conn) = self.connections.get_mut(id) {
            conn.reported_status = Some(status);
        }
    }

    /// Highest-scoring connection that has reported capabilities, satisfies
    /// `predicate` and holds fewer than `max_tasks` tasks. Ties go to the
    /// lower task count, then to the earlier connection.
    pub fn best_candidate<P>(&self, max_tasks: usize, predicate: P) -> Option<ConnectionId>
    where
        P: Fn(&WorkerCapabilities) -> bool,
    {
        self.connections
            .values()
            .filter(|conn| matches!(conn.state, WorkerState::Ready | WorkerState::Busy))
            .filter(|conn| conn.task_count() < max_tasks)
            .filter(|conn| conn.capabilities.as_ref().is_some_and(&predicate))
            .max_by(|a, b| {
                a.score()
                    .cmp(&b.score())
                    .then_with(|| b.task_count().cmp(&a.task_count()))
                    .then_with(|| b.connected_at.cmp(&a.connected_at))
            })
            .map(|conn| conn.id.clone())
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&WorkerConnection> {
        self.connections.get(id)
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Connections not heard from since `cutoff`.
    pub fn idle_since(&self, cutoff: Instant) -> Vec<ConnectionId> {
        self.connections
            .values()
            .filter(|conn| conn.last_seen < cutoff)
            .map(|conn| conn.id.clone())
            .collect()
    }

    pub fn summaries(&self) -> Vec<WorkerSummary> {
        let mut summaries: Vec<_> = self.connections.values().map(WorkerConnection::summary).collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// Send a frame to every connection; failures are left to disconnect handling.
    pub fn broadcast(&self, msg: &ServerMessage) {
        for conn in self.connections.values() {
            if conn.send(msg.clone()).is_err() {
                debug!(connection_id = %conn.id, "Broadcast skipped closed connection");
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Outbound channel closed for worker {0}")]
    ChannelClosed(ConnectionId),
}
