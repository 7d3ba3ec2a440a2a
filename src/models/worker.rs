use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use strum::Display;
use uuid::Uuid;

/// Identifier of one worker connection, generated when the socket is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Hardware and model profile a worker reports about itself. Missing or
/// null fields fall back to their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerCapabilities {
    #[serde(default = "unknown", deserialize_with = "string_or_unknown")]
    pub cpu: String,

    #[serde(default = "unknown", deserialize_with = "string_or_unknown")]
    pub gpu: String,

    #[serde(default = "unknown", rename = "ram", deserialize_with = "string_or_unknown")]
    pub memory: String,

    #[serde(default, alias = "hasLMStudio", deserialize_with = "null_as_default")]
    pub has_inference_engine: bool,

    #[serde(default, rename = "models", deserialize_with = "null_as_default")]
    pub available_models: Vec<String>,
}

fn unknown() -> String {
    "Unknown".to_string()
}

fn string_or_unknown<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(unknown))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Default for WorkerCapabilities {
    fn default() -> Self {
        Self {
            cpu: unknown(),
            gpu: unknown(),
            memory: unknown(),
            has_inference_engine: false,
            available_models: Vec::new(),
        }
    }
}

impl WorkerCapabilities {
    /// A GPU counts when the worker named one; "Unknown GPU" and blanks do not.
    pub fn has_gpu(&self) -> bool {
        let gpu = self.gpu.trim();
        !gpu.is_empty() && !gpu.to_lowercase().contains("unknown")
    }
}

/// Lifecycle of a worker connection as seen by the registry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    /// Socket open, capabilities not reported yet.
    Connected,
    Ready,
    /// Holds at least one task.
    Busy,
    Gone,
}

/// Point-in-time view of a connection, shared with peers and the status route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSummary {
    pub id: ConnectionId,
    pub capabilities: Option<WorkerCapabilities>,
    pub status: WorkerState,
    pub tasks: usize,
}
