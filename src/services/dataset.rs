use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::db::queries;
use crate::models::verdict::{AnalysisSource, AnalysisVerdict};

/// One stored verdict. `recorded_at` becomes the row's `created_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetEntry {
    pub verdict: AnalysisVerdict,
    pub source: AnalysisSource,
    pub recorded_at: DateTime<Utc>,
}

impl DatasetEntry {
    pub fn new(verdict: AnalysisVerdict, source: AnalysisSource) -> Self {
        Self {
            verdict,
            source,
            recorded_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait DatasetSink: Send + Sync {
    async fn append(&self, entry: &DatasetEntry) -> Result<(), DatasetError>;

    async fn count(&self) -> Result<u64, DatasetError>;

    /// Connectivity check used by `/health`.
    async fn health_check(&self) -> Result<(), DatasetError>;

    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;
}

/// PostgreSQL-backed dataset.
pub struct PgDataset {
    pool: PgPool,
}

impl PgDataset {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DatasetSink for PgDataset {
    async fn append(&self, entry: &DatasetEntry) -> Result<(), DatasetError> {
        let id = queries::insert_dataset_entry(&self.pool, &entry.verdict, entry.source, entry.recorded_at).await?;
        tracing::debug!(entry_id = %id, vegetable = %entry.verdict.vegetable_name, "Dataset entry stored");
        Ok(())
    }

    async fn count(&self) -> Result<u64, DatasetError> {
        let total = queries::count_dataset_entries(&self.pool).await?;
        Ok(u64::try_from(total).unwrap_or_default())
    }

    async fn health_check(&self) -> Result<(), DatasetError> {
        queries::ping(&self.pool).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

/// Process-local dataset used when no database is configured.
#[derive(Default)]
pub struct MemoryDataset {
    entries: RwLock<Vec<DatasetEntry>>,
}

impl MemoryDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<DatasetEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl DatasetSink for MemoryDataset {
    async fn append(&self, entry: &DatasetEntry) -> Result<(), DatasetError> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn count(&self) -> Result<u64, DatasetError> {
        Ok(self.entries.read().await.len() as u64)
    }

    async fn health_check(&self) -> Result<(), DatasetError> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
