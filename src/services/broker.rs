//! Task broker: queues analysis tasks, assigns them to workers and routes
//! results back to the waiting callers.
//!
//! The worker registry and the task table share one mutex. Every assignment,
//! completion and disconnect runs under it, so a task can never be handed to
//! a worker that is concurrently being removed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{oneshot, Mutex, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::models::protocol::ServerMessage;
use crate::models::task::{Task, TaskId, TaskPayload, TaskStatus};
use crate::models::worker::{ConnectionId, WorkerCapabilities, WorkerSummary};
use crate::services::registry::{RegistryError, WorkerRegistry, WorkerSender};

/// What a worker sent back for a task: a result value or an error message.
pub type TaskOutcome = Result<serde_json::Value, String>;

/// Broker tuning, taken from `AppConfig`.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// Worker mode switch. When off, `submit` always fails fast.
    pub enabled: bool,
    /// Tasks a single connection may hold at once.
    pub max_tasks_per_worker: usize,
    /// Period of the background assignment pass.
    pub assign_interval: Duration,
    /// Evict connections silent for this long. `None` disables the sweep.
    pub heartbeat_timeout: Option<Duration>,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_tasks_per_worker: 1,
            assign_interval: Duration::from_secs(5),
            heartbeat_timeout: None,
        }
    }
}

/// Caller side of a submitted task.
#[derive(Debug)]
pub struct TaskHandle {
    task_id: TaskId,
    rx: oneshot::Receiver<TaskOutcome>,
}

impl TaskHandle {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Wait for the worker's answer. The broker never times out on its own;
    /// wrap this in `tokio::time::timeout` for a bounded wait.
    pub async fn wait(self) -> Result<serde_json::Value, BrokerError> {
        match self.rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(BrokerError::Worker(message)),
            Err(_) => Err(BrokerError::Abandoned),
        }
    }
}

/// Snapshot served by the status route.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerStatus {
    pub enabled: bool,
    pub connections: Vec<WorkerSummary>,
    pub pending_tasks: usize,
    pub assigned_tasks: usize,
}

struct QueuedTask {
    task: Task,
    /// Taken exactly once, when the task reaches a terminal state.
    completion: Option<oneshot::Sender<TaskOutcome>>,
}

impl QueuedTask {
    /// The submitting caller stopped waiting.
    fn is_abandoned(&self) -> bool {
        self.completion.as_ref().is_none_or(|tx| tx.is_closed())
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct AssignPass {
    assigned: usize,
    requeued: usize,
    discarded: usize,
}

#[derive(Default)]
struct BrokerState {
    registry: WorkerRegistry,
    tasks: HashMap<TaskId, QueuedTask>,
    next_seq: u64,
}

impl BrokerState {
    /// Walk pending tasks oldest-first, handing each to the best worker.
    /// Stops at the first task no worker can take.
    fn assign_pending(&mut self, max_tasks: usize) -> AssignPass {
        let mut pass = AssignPass::default();

        let mut pending: Vec<&Task> = self
            .tasks
            .values()
            .map(|queued| &queued.task)
            .filter(|task| task.status == TaskStatus::Pending)
            .collect();
        pending.sort_by_key(|task| (task.created_at, task.seq));
        let pending: Vec<TaskId> = pending.into_iter().map(|task| task.id.clone()).collect();

        for task_id in pending {
            if self.tasks.get(&task_id).is_none_or(QueuedTask::is_abandoned) {
                if let Some(mut queued) = self.tasks.remove(&task_id) {
                    queued.task.finish(false);
                    info!(task_id = %task_id, "Discarding pending task, caller stopped waiting");
                    pass.discarded += 1;
                }
                continue;
            }

            loop {
                let Some(worker_id) = self
                    .registry
                    .best_candidate(max_tasks, |caps: &WorkerCapabilities| caps.has_inference_engine)
                else {
                    debug!(task_id = %task_id, "No available worker for task, waiting for next pass");
                    return pass;
                };

                match self.dispatch(&task_id, &worker_id) {
                    Ok(()) => {
                        pass.assigned += 1;
                        break;
                    }
                    Err(e) => {
                        warn!(worker_id = %worker_id, error = %e, "Failed to send task - treating worker as disconnected");
                        pass.requeued += self.remove_worker(&worker_id);
                    }
                }
            }
        }

        pass
    }

    fn dispatch(&mut self, task_id: &TaskId, worker_id: &ConnectionId) -> Result<(), RegistryError> {
        let Some(queued) = self.tasks.get_mut(task_id) else {
            return Ok(());
        };
        let Some(conn) = self.registry.get(worker_id) else {
            return Err(RegistryError::ChannelClosed(worker_id.clone()));
        };

        conn.send(ServerMessage::Task {
            task_id: task_id.clone(),
            task_type: queued.task.kind.clone(),
            data: queued.task.payload.clone(),
        })?;

        queued.task.assign(worker_id.clone());
        self.registry.mark_busy(worker_id, task_id);

        info!(
            task_id = %task_id,
            worker_id = %worker_id,
            kind = %queued.task.kind,
            "Assigned task to worker"
        );
        Ok(())
    }

    /// Drop a connection and put every task it held back in the queue.
    fn remove_worker(&mut self, worker_id: &ConnectionId) -> usize {
        let mut requeued = 0;
        for task_id in self.registry.remove(worker_id) {
            let Some(queued) = self.tasks.get_mut(&task_id) else {
                continue;
            };
            if queued.task.assigned_worker.as_ref() == Some(worker_id) {
                queued.task.requeue();
                requeued += 1;
                info!(task_id = %task_id, worker_id = %worker_id, "Requeued task from disconnected worker");
            }
        }
        if requeued > 0 {
            metrics::counter!("broker_tasks_requeued_total").increment(requeued as u64);
        }
        requeued
    }

    fn count_status(&self, status: TaskStatus) -> usize {
        self.tasks
            .values()
            .filter(|queued| queued.task.status == status)
            .count()
    }

    fn client_list(&self) -> ServerMessage {
        ServerMessage::ClientList {
            clients: self.registry.summaries(),
        }
    }
}

/// Distributes tasks across connected workers.
pub struct TaskBroker {
    state: Mutex<BrokerState>,
    wake: Notify,
    settings: BrokerSettings,
}

impl TaskBroker {
    pub fn new(settings: BrokerSettings) -> Self {
        Self {
            state: Mutex::new(BrokerState::default()),
            wake: Notify::new(),
            settings,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Register a freshly accepted socket.
    pub async fn connect(&self, outbound: WorkerSender) -> ConnectionId {
        let mut state = self.state.lock().await;
        let id = state.registry.register(outbound);
        metrics::gauge!("broker_connected_workers").set(state.registry.len() as f64);
        id
    }

    /// Record a capability report, acknowledge it and share the client list.
    pub async fn report_capabilities(&self, id: &ConnectionId, capabilities: WorkerCapabilities) -> bool {
        let mut state = self.state.lock().await;
        if !state.registry.set_capabilities(id, capabilities) {
            return false;
        }

        if let Some(conn) = state.registry.get(id) {
            let ack = ServerMessage::CapabilitiesAck {
                message: "Capabilities received".to_string(),
            };
            if let Err(e) = conn.send(ack) {
                debug!(connection_id = %id, error = %e, "Could not acknowledge capabilities");
            }
        }
        let client_list = state.client_list();
        state.registry.broadcast(&client_list);
        drop(state);

        self.wake.notify_one();
        true
    }

    /// Refresh liveness for an inbound frame. False if the connection is gone.
    pub async fn touch(&self, id: &ConnectionId) -> bool {
        self.state.lock().await.registry.touch(id)
    }

    pub async fn record_status(&self, id: &ConnectionId, status: String) {
        self.state.lock().await.registry.set_reported_status(id, status);
    }

    pub async fn is_connected(&self, id: &ConnectionId) -> bool {
        self.state.lock().await.registry.contains(id)
    }

    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.registry.len()
    }

    /// Queue a task and try to assign it right away.
    ///
    /// Fails fast only when worker mode is off or nobody is connected.
    /// Otherwise the task waits in the queue until a worker takes it.
    pub async fn submit(&self, kind: &str, payload: TaskPayload) -> Result<TaskHandle, BrokerError> {
        if !self.settings.enabled {
            return Err(BrokerError::Disabled);
        }

        let mut state = self.state.lock().await;
        if state.registry.is_empty() {
            return Err(BrokerError::NoWorkersConnected);
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        let task = Task::new(kind, payload, seq);
        let task_id = task.id.clone();
        let (tx, rx) = oneshot::channel();
        state.tasks.insert(
            task_id.clone(),
            QueuedTask {
                task,
                completion: Some(tx),
            },
        );
        info!(task_id = %task_id, kind = %kind, "Task submitted");
        metrics::counter!("broker_tasks_submitted_total").increment(1);

        let pass = state.assign_pending(self.settings.max_tasks_per_worker);
        drop(state);
        if pass.requeued > 0 {
            self.wake.notify_one();
        }

        Ok(TaskHandle { task_id, rx })
    }

    /// Deliver a worker's answer to the waiting caller.
    ///
    /// Unknown task ids, repeated results and results from a connection that
    /// no longer owns the task are dropped. Returns whether it was accepted.
    pub async fn complete_task(&self, worker_id: &ConnectionId, task_id: &TaskId, outcome: TaskOutcome) -> bool {
        let mut state = self.state.lock().await;

        let owned = state
            .tasks
            .get(task_id)
            .is_some_and(|queued| queued.task.assigned_worker.as_ref() == Some(worker_id));
        if !owned {
            debug!(task_id = %task_id, worker_id = %worker_id, "Dropping result for unknown or reassigned task");
            return false;
        }
        let Some(mut queued) = state.tasks.remove(task_id) else {
            return false;
        };

        state.registry.mark_ready(worker_id, task_id);
        drop(state);

        let succeeded = outcome.is_ok();
        queued.task.finish(succeeded);
        if succeeded {
            info!(task_id = %task_id, worker_id = %worker_id, "Task completed");
            metrics::counter!("broker_tasks_completed_total").increment(1);
        } else {
            warn!(task_id = %task_id, worker_id = %worker_id, "Task failed on worker");
            metrics::counter!("broker_tasks_failed_total").increment(1);
        }

        if let Some(tx) = queued.completion.take() {
            if tx.send(outcome).is_err() {
                debug!(task_id = %task_id, "Caller stopped waiting, result discarded");
            }
        }

        self.wake.notify_one();
        true
    }

    /// Disconnect cleanup: remove the connection and requeue its tasks.
    pub async fn worker_disconnected(&self, worker_id: &ConnectionId) {
        let mut state = self.state.lock().await;
        let requeued = state.remove_worker(worker_id);
        metrics::gauge!("broker_connected_workers").set(state.registry.len() as f64);
        drop(state);

        if requeued > 0 {
            info!(worker_id = %worker_id, requeued, "Requeued abandoned tasks");
        }
        self.wake.notify_one();
    }

    /// Evict connections not heard from within `timeout`.
    pub async fn evict_idle(&self, timeout: Duration) -> usize {
        let Some(cutoff) = Instant::now().checked_sub(timeout) else {
            return 0;
        };

        let mut state = self.state.lock().await;
        let idle = state.registry.idle_since(cutoff);
        for worker_id in &idle {
            warn!(worker_id = %worker_id, timeout_secs = timeout.as_secs(), "Worker missed heartbeat window, evicting");
            state.remove_worker(worker_id);
        }
        metrics::gauge!("broker_connected_workers").set(state.registry.len() as f64);
        drop(state);

        if !idle.is_empty() {
            self.wake.notify_one();
        }
        idle.len()
    }

    /// One assignment pass over the queue.
    pub async fn assign_pending_tasks(&self) -> usize {
        let mut state = self.state.lock().await;
        let pass = state.assign_pending(self.settings.max_tasks_per_worker);
        metrics::gauge!("broker_pending_tasks").set(state.count_status(TaskStatus::Pending) as f64);
        drop(state);

        if pass.discarded > 0 {
            debug!(discarded = pass.discarded, "Dropped tasks whose callers left");
        }
        if pass.requeued > 0 {
            self.wake.notify_one();
        }
        pass.assigned
    }

    /// Snapshot of a queued or in-flight task.
    pub async fn task(&self, task_id: &TaskId) -> Option<Task> {
        self.state
            .lock()
            .await
            .tasks
            .get(task_id)
            .map(|queued| queued.task.clone())
    }

    pub async fn status(&self) -> BrokerStatus {
        let state = self.state.lock().await;
        BrokerStatus {
            enabled: self.settings.enabled,
            connections: state.registry.summaries(),
            pending_tasks: state.count_status(TaskStatus::Pending),
            assigned_tasks: state.count_status(TaskStatus::Assigned),
        }
    }

    /// Background scheduler: a pass on every tick and on every state change.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.settings.assign_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.settings.assign_interval.as_secs(),
            max_tasks_per_worker = self.settings.max_tasks_per_worker,
            "Task broker scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(timeout) = self.settings.heartbeat_timeout {
                        self.evict_idle(timeout).await;
                    }
                }
                _ = self.wake.notified() => {}
            }
            self.assign_pending_tasks().await;
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Worker mode is disabled")]
    Disabled,

    #[error("No worker clients connected")]
    NoWorkersConnected,

    #[error("Task was dropped before a result arrived")]
    Abandoned,

    #[error("Worker reported an error: {0}")]
    Worker(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::ANALYZE_IMAGE;
    use crate::models::worker::WorkerState;
    use tokio::sync::mpsc;
    use tokio_test::{assert_err, assert_ok};

    fn payload() -> TaskPayload {
        TaskPayload {
            image_base64: "AAAA".to_string(),
            prompt: "analyze".to_string(),
            model: "google/gemma-3-4b".to_string(),
        }
    }

    fn caps(gpu: &str) -> WorkerCapabilities {
        WorkerCapabilities {
            cpu: "Test CPU".to_string(),
            gpu: gpu.to_string(),
            memory: "16 GB".to_string(),
            has_inference_engine: true,
            available_models: vec![],
        }
    }

    fn broker() -> Arc<TaskBroker> {
        Arc::new(TaskBroker::new(BrokerSettings {
            assign_interval: Duration::from_millis(50),
            ..BrokerSettings::default()
        }))
    }

    async fn ready_worker(
        broker: &TaskBroker,
        gpu: &str,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = broker.connect(tx).await;
        assert!(broker.report_capabilities(&id, caps(gpu)).await);
        (id, rx)
    }

    /// Next `task` frame on a worker channel, skipping acks and client lists.
    async fn next_task(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Option<TaskId> {
        loop {
            match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
                Ok(Some(ServerMessage::Task { task_id, .. })) => return Some(task_id),
                Ok(Some(_)) => continue,
                _ => return None,
            }
        }
    }

    fn drain_tasks(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<TaskId> {
        let mut tasks = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let ServerMessage::Task { task_id, .. } = msg {
                tasks.push(task_id);
            }
        }
        tasks
    }

    #[tokio::test]
    async fn test_submit_fails_fast_when_disabled() {
        let broker = TaskBroker::new(BrokerSettings {
            enabled: false,
            ..BrokerSettings::default()
        });
        let err = assert_err!(broker.submit(ANALYZE_IMAGE, payload()).await);
        assert!(matches!(err, BrokerError::Disabled));
    }

    #[tokio::test]
    async fn test_submit_fails_fast_with_no_connections() {
        let broker = broker();
        let err = assert_err!(broker.submit(ANALYZE_IMAGE, payload()).await);
        assert!(matches!(err, BrokerError::NoWorkersConnected));
    }

    #[tokio::test]
    async fn test_submit_assign_complete_roundtrip() {
        let broker = broker();
        let (worker, mut rx) = ready_worker(&broker, "RTX 3060").await;

        let handle = assert_ok!(broker.submit(ANALYZE_IMAGE, payload()).await);
        let task_id = handle.task_id().clone();
        assert_eq!(next_task(&mut rx).await, Some(task_id.clone()));

        let task = broker.task(&task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Assigned);
        assert_eq!(task.assigned_worker.as_ref(), Some(&worker));

        let result = serde_json::json!({"vegetableName": "Tomato"});
        assert!(broker.complete_task(&worker, &task_id, Ok(result.clone())).await);
        assert_eq!(assert_ok!(handle.wait().await), result);

        assert!(broker.task(&task_id).await.is_none());
        let status = broker.status().await;
        assert_eq!(status.connections[0].status, WorkerState::Ready);
        assert_eq!(status.connections[0].tasks, 0);
    }

    #[tokio::test]
    async fn test_worker_error_resolves_handle_with_error() {
        let broker = broker();
        let (worker, mut rx) = ready_worker(&broker, "").await;
        let handle = broker.submit(ANALYZE_IMAGE, payload()).await.unwrap();
        let task_id = next_task(&mut rx).await.unwrap();

        assert!(broker.complete_task(&worker, &task_id, Err("out of memory".to_string())).await);
        match handle.wait().await {
            Err(BrokerError::Worker(message)) => assert_eq!(message, "out of memory"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_and_foreign_results_are_dropped() {
        let broker = broker();
        let (worker, mut rx) = ready_worker(&broker, "").await;
        let (other, _other_rx) = ready_worker(&broker, "").await;

        let handle = broker.submit(ANALYZE_IMAGE, payload()).await.unwrap();
        let task_id = handle.task_id().clone();
        // Only one of the two idle workers got it.
        let owner = match next_task(&mut rx).await {
            Some(_) => worker.clone(),
            None => other.clone(),
        };
        let stranger = if owner == worker { other } else { worker };

        assert!(!broker.complete_task(&stranger, &task_id, Ok(serde_json::json!(1))).await);
        assert!(broker.complete_task(&owner, &task_id, Ok(serde_json::json!(2))).await);
        assert!(!broker.complete_task(&owner, &task_id, Ok(serde_json::json!(3))).await);
        assert!(!broker.complete_task(&owner, &TaskId::from("nope"), Ok(serde_json::json!(4))).await);

        assert_eq!(handle.wait().await.unwrap(), serde_json::json!(2));
    }

    #[tokio::test]
    async fn test_task_waits_when_no_worker_qualifies() {
        let broker = broker();
        let (tx, _rx) = mpsc::unbounded_channel();
        let _unready = broker.connect(tx).await;

        let handle = broker.submit(ANALYZE_IMAGE, payload()).await.unwrap();
        let task_id = handle.task_id().clone();
        let task = broker.task(&task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.assigned_worker.is_none());

        let waited = tokio::time::timeout(Duration::from_millis(100), handle.wait()).await;
        assert!(waited.is_err(), "broker must not resolve the task on its own");

        // The caller gave up; the next pass discards the task.
        broker.assign_pending_tasks().await;
        assert!(broker.task(&task_id).await.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_requeues_to_another_worker() {
        let broker = broker();
        tokio::spawn(broker.clone().run());

        let (a, mut a_rx) = ready_worker(&broker, "").await;
        let handle = broker.submit(ANALYZE_IMAGE, payload()).await.unwrap();
        let t1 = handle.task_id().clone();
        assert_eq!(next_task(&mut a_rx).await, Some(t1.clone()));

        broker.worker_disconnected(&a).await;
        let task = broker.task(&t1).await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.assigned_worker.is_none());

        let (b, mut b_rx) = ready_worker(&broker, "").await;
        assert_eq!(next_task(&mut b_rx).await, Some(t1.clone()));
        assert!(drain_tasks(&mut a_rx).is_empty(), "task must not be duplicated to the old worker");

        let task = broker.task(&t1).await.unwrap();
        assert_eq!(task.assigned_worker.as_ref(), Some(&b));

        // A late answer from the departed worker is ignored.
        assert!(!broker.complete_task(&a, &t1, Ok(serde_json::json!("late"))).await);
        assert!(broker.complete_task(&b, &t1, Ok(serde_json::json!("done"))).await);
        assert_eq!(handle.wait().await.unwrap(), serde_json::json!("done"));
    }

    #[tokio::test]
    async fn test_pending_tasks_assigned_oldest_first() {
        let broker = broker();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = broker.connect(tx).await;

        let first = broker.submit(ANALYZE_IMAGE, payload()).await.unwrap();
        let second = broker.submit(ANALYZE_IMAGE, payload()).await.unwrap();

        assert!(broker.report_capabilities(&worker, caps("")).await);
        assert_eq!(broker.assign_pending_tasks().await, 1);
        assert_eq!(next_task(&mut rx).await.as_ref(), Some(first.task_id()));

        let second_task = broker.task(second.task_id()).await.unwrap();
        assert_eq!(second_task.status, TaskStatus::Pending);

        let first_id = first.task_id().clone();
        assert!(broker.complete_task(&worker, &first_id, Ok(serde_json::json!({}))).await);
        assert_eq!(broker.assign_pending_tasks().await, 1);
        assert_eq!(next_task(&mut rx).await.as_ref(), Some(second.task_id()));
    }

    #[tokio::test]
    async fn test_gpu_worker_preferred() {
        let broker = broker();
        let (_cpu, mut cpu_rx) = ready_worker(&broker, "Unknown GPU").await;
        let (_gpu, mut gpu_rx) = ready_worker(&broker, "NVIDIA RTX 4090").await;

        let handle = broker.submit(ANALYZE_IMAGE, payload()).await.unwrap();
        assert_eq!(next_task(&mut gpu_rx).await.as_ref(), Some(handle.task_id()));
        assert!(drain_tasks(&mut cpu_rx).is_empty());
    }

    #[tokio::test]
    async fn test_dead_transport_treated_as_disconnect() {
        let broker = broker();
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = broker.connect(tx).await;
        broker.report_capabilities(&worker, caps("")).await;
        drop(rx);

        let handle = broker.submit(ANALYZE_IMAGE, payload()).await.unwrap();
        assert!(!broker.is_connected(&worker).await);
        let task = broker.task(handle.task_id()).await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_late_result_after_caller_timeout_is_discarded() {
        let broker = broker();
        let (worker, mut rx) = ready_worker(&broker, "").await;
        let handle = broker.submit(ANALYZE_IMAGE, payload()).await.unwrap();
        let task_id = next_task(&mut rx).await.unwrap();
        drop(handle);

        assert!(broker.complete_task(&worker, &task_id, Ok(serde_json::json!({}))).await);
        assert_eq!(broker.status().await.connections[0].status, WorkerState::Ready);
    }

    #[tokio::test]
    async fn test_evict_idle_requeues() {
        let broker = broker();
        let (_worker, mut rx) = ready_worker(&broker, "").await;
        let handle = broker.submit(ANALYZE_IMAGE, payload()).await.unwrap();
        next_task(&mut rx).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(broker.evict_idle(Duration::from_millis(5)).await, 1);
        assert_eq!(broker.connection_count().await, 0);

        let task = broker.task(handle.task_id()).await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
    }
}
