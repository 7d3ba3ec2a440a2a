use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::verdict::{AnalysisSource, AnalysisVerdict};

/// Append one verdict to the historical dataset.
pub async fn insert_dataset_entry(
    pool: &PgPool,
    verdict: &AnalysisVerdict,
    source: AnalysisSource,
    recorded_at: DateTime<Utc>,
) -> Result<Uuid, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO dataset_entries
            (id, vegetable_name, safe_to_eat, disease_name, recommendation,
             freshness_level, freshness_score, source, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&verdict.vegetable_name)
    .bind(verdict.safe_to_eat)
    .bind(verdict.disease_name.as_deref())
    .bind(&verdict.recommendation)
    .bind(verdict.freshness_level.to_string())
    .bind(i16::from(verdict.freshness_score))
    .bind(source.to_string())
    .bind(recorded_at)
    .fetch_one(pool)
    .await?;

    row.try_get("id")
}

/// Number of rows in the dataset.
pub async fn count_dataset_entries(pool: &PgPool) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) AS total FROM dataset_entries")
        .fetch_one(pool)
        .await?;

    row.try_get("total")
}

/// Cheap connectivity probe for the health route.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
