use serde::Deserialize;
use std::time::Duration;

use crate::services::broker::BrokerSettings;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Dispatch analysis to connected workers before calling the endpoint directly.
    #[serde(default)]
    pub use_worker_mode: bool,

    /// Base URL of the OpenAI-compatible inference endpoint
    #[serde(default = "default_inference_base_url")]
    pub inference_base_url: String,

    #[serde(default = "default_inference_chat_path")]
    pub inference_chat_path: String,

    #[serde(default = "default_inference_model")]
    pub inference_model: String,

    #[serde(default = "default_inference_timeout_secs")]
    pub inference_timeout_secs: u64,

    /// How long a caller waits for a worker before falling back.
    #[serde(default = "default_worker_task_timeout_secs")]
    pub worker_task_timeout_secs: u64,

    #[serde(default = "default_worker_max_concurrent_tasks")]
    pub worker_max_concurrent_tasks: usize,

    #[serde(default = "default_broker_assign_interval_secs")]
    pub broker_assign_interval_secs: u64,

    #[serde(default = "default_worker_ping_interval_secs")]
    pub worker_ping_interval_secs: u64,

    /// Evict workers silent for this many seconds. 0 disables eviction.
    #[serde(default)]
    pub worker_heartbeat_timeout_secs: u64,

    /// PostgreSQL connection string. Unset keeps the dataset in memory.
    #[serde(default)]
    pub database_url: Option<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_inference_base_url() -> String {
    "http://localhost:1234".to_string()
}

fn default_inference_chat_path() -> String {
    "/v1/chat/completions".to_string()
}

fn default_inference_model() -> String {
    "google/gemma-3-4b".to_string()
}

fn default_inference_timeout_secs() -> u64 {
    120
}

fn default_worker_task_timeout_secs() -> u64 {
    60
}

fn default_worker_max_concurrent_tasks() -> usize {
    1
}

fn default_broker_assign_interval_secs() -> u64 {
    5
}

fn default_worker_ping_interval_secs() -> u64 {
    30
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn broker_settings(&self) -> BrokerSettings {
        BrokerSettings {
            enabled: self.use_worker_mode,
            max_tasks_per_worker: self.worker_max_concurrent_tasks.max(1),
            assign_interval: Duration::from_secs(self.broker_assign_interval_secs.max(1)),
            heartbeat_timeout: (self.worker_heartbeat_timeout_secs > 0)
                .then(|| Duration::from_secs(self.worker_heartbeat_timeout_secs)),
        }
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }

    pub fn worker_task_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_task_timeout_secs)
    }

    pub fn worker_ping_interval(&self) -> Duration {
        Duration::from_secs(self.worker_ping_interval_secs.max(1))
    }
}

/// Settings for the `worker` binary.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Broker WebSocket endpoint, e.g. "ws://localhost:3000/ws".
    #[serde(default = "default_broker_ws_url")]
    pub broker_ws_url: String,

    #[serde(default = "default_inference_base_url")]
    pub inference_base_url: String,

    #[serde(default = "default_inference_chat_path")]
    pub inference_chat_path: String,

    #[serde(default = "default_inference_model")]
    pub inference_model: String,

    #[serde(default = "default_inference_timeout_secs")]
    pub inference_timeout_secs: u64,

    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// Hardware labels reported to the broker.
    #[serde(default)]
    pub worker_cpu: Option<String>,

    #[serde(default)]
    pub worker_gpu: Option<String>,

    #[serde(default)]
    pub worker_ram: Option<String>,
}

fn default_broker_ws_url() -> String {
    "ws://localhost:3000/ws".to_string()
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs.max(1))
    }
}
