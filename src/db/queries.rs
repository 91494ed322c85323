use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::services::pipeline::{OwnershipEntry, OwnershipLedger};

/// Upsert the ownership record for a job and return its id.
///
/// Keyed on `job_id`, so a job executed twice keeps a single record.
pub async fn upsert_collectible_record(
    pool: &PgPool,
    entry: &OwnershipEntry,
) -> Result<Uuid, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO collectible_records (job_id, owner_ref, variant, asset_url, metadata_url)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (job_id) DO UPDATE
        SET asset_url = EXCLUDED.asset_url,
            metadata_url = EXCLUDED.metadata_url,
            updated_at = NOW()
        RETURNING id
        "#,
    )
    .bind(entry.job_id.0)
    .bind(&entry.owner_ref.0)
    .bind(entry.variant)
    .bind(&entry.asset_url)
    .bind(&entry.metadata_url)
    .fetch_one(pool)
    .await?;

    row.try_get("id")
}

/// PostgreSQL-backed ownership ledger.
pub struct PgOwnershipLedger {
    pool: PgPool,
}

impl PgOwnershipLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Constraint and data errors repeat on every attempt; connection trouble does not.
fn classify(err: sqlx::Error) -> PipelineError {
    match err {
        sqlx::Error::Database(db_err) => {
            PipelineError::Permanent(format!("ownership record rejected: {db_err}"))
        }
        other => PipelineError::Transient(format!("ownership ledger unavailable: {other}")),
    }
}

#[async_trait]
impl OwnershipLedger for PgOwnershipLedger {
    async fn record(&self, entry: &OwnershipEntry) -> Result<String, PipelineError> {
        let id = upsert_collectible_record(&self.pool, entry)
            .await
            .map_err(classify)?;
        Ok(id.to_string())
    }

    async fn health_check(&self) -> Result<(), PipelineError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(classify)
    }
}
