use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions, Postgres};
use sqlx::types::Json;
use sqlx::Transaction;
use tracing::{debug, info};

use super::{
    GoalSlice, LeasedJob, LeasedTuple, Post, PostSource, Prediction, PredictionDetails,
    ValidationQueue, ValidationRecord,
};
use crate::config::{DatabaseConfig, ValidationConfig};
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time.
///
/// Only the `validation_result` table is owned (and migrated) here; the
/// upstream tables belong to the parsing pipeline.
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Selects the oldest matured, unvalidated prediction that passes the
/// quality thresholds (null values pass), locking its row so concurrent
/// workers skip it. The lock is released when the lease's transaction
/// ends.
const LEASE_SQL: &str = r#"
SELECT
    p.id AS prediction_id,
    p.source_post_id,
    p.goal_slices,
    p.llm_confidence,
    p.prediction_quality,
    p.vagueness,
    d.prediction_context,
    d.timeframe_start,
    d.timeframe_end,
    d.timeframe_status,
    d.filter_validation_confidence,
    d.filter_validation_reasoning,
    s.text AS post_text
FROM parsed_prediction p
JOIN parsed_prediction_details d ON d.parsed_prediction_id = p.id
JOIN scraped_post s ON s.id = p.source_post_id
WHERE d.timeframe_end IS NOT NULL
  AND d.timeframe_end <= $1
  AND d.timeframe_status <> 'missing'
  AND (d.timeframe_start IS NULL OR d.timeframe_start <= d.timeframe_end)
  AND (d.filter_validation_confidence IS NULL OR d.filter_validation_confidence >= $2)
  AND (p.prediction_quality IS NULL OR p.prediction_quality >= $3)
  AND (p.llm_confidence IS NULL OR p.llm_confidence >= $4)
  AND (p.vagueness IS NULL OR p.vagueness <= $5)
  AND NOT EXISTS (
      SELECT 1 FROM validation_result v WHERE v.parsed_prediction_id = p.id
  )
ORDER BY d.timeframe_end ASC
LIMIT 1
FOR UPDATE OF p SKIP LOCKED
"#;

const INSERT_RESULT_SQL: &str = r#"
INSERT INTO validation_result (id, parsed_prediction_id, outcome, proof, sources, created_at)
VALUES ($1, $2, $3, $4, $5, $6)
ON CONFLICT (parsed_prediction_id) DO NOTHING
"#;

/// Postgres-backed storage implementation
#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
    thresholds: ValidationConfig,
}

impl PgStorage {
    /// Connect a pool and run the owned migrations.
    ///
    /// The pool must allow at least one connection per worker plus
    /// head-room for post lookups during slicing.
    pub async fn connect(
        config: &DatabaseConfig,
        thresholds: ValidationConfig,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool, thresholds };
        storage.run_migrations().await?;

        Ok(storage)
    }

    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Migration {
                message: format!("Failed to run migrations: {}", e),
            })?;

        info!("Database migrations completed successfully");
        Ok(())
    }
}

#[async_trait]
impl ValidationQueue for PgStorage {
    type Job = PgLease;

    async fn lease(&self, now: DateTime<Utc>) -> StorageResult<Option<PgLease>> {
        let mut tx = self.pool.begin().await?;

        let row: Option<LeaseRow> = sqlx::query_as(LEASE_SQL)
            .bind(now)
            .bind(self.thresholds.min_filter_confidence)
            .bind(self.thresholds.min_prediction_quality)
            .bind(self.thresholds.min_llm_confidence)
            .bind(self.thresholds.max_vagueness)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        debug!(prediction_id = %row.prediction_id, "Leased prediction");

        Ok(Some(PgLease {
            tuple: row.into(),
            tx,
        }))
    }
}

#[async_trait]
impl PostSource for PgStorage {
    async fn post_text(&self, post_id: &str) -> StorageResult<Option<String>> {
        let text: Option<String> =
            sqlx::query_scalar("SELECT text FROM scraped_post WHERE id = $1")
                .bind(post_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(text)
    }
}

/// A leased prediction plus the open transaction holding its row lock.
///
/// Dropping the lease rolls the transaction back, releasing the lock
/// without writing anything.
pub struct PgLease {
    tuple: LeasedTuple,
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LeasedJob for PgLease {
    fn tuple(&self) -> &LeasedTuple {
        &self.tuple
    }

    async fn persist(mut self, record: ValidationRecord) -> StorageResult<bool> {
        let result = sqlx::query(INSERT_RESULT_SQL)
            .bind(&record.id)
            .bind(&record.prediction_id)
            .bind(record.outcome.as_str())
            .bind(&record.proof)
            .bind(Json(&record.sources))
            .bind(record.created_at)
            .execute(&mut *self.tx)
            .await?;

        self.tx.commit().await?;

        let inserted = result.rows_affected() == 1;
        if !inserted {
            // Another worker won the race; the unique constraint held.
            debug!(prediction_id = %record.prediction_id, "Result already present, insert skipped");
        }

        Ok(inserted)
    }
}

// Internal row type for SQLx mapping
#[derive(sqlx::FromRow)]
struct LeaseRow {
    prediction_id: String,
    source_post_id: String,
    #[sqlx(json)]
    goal_slices: Vec<GoalSlice>,
    llm_confidence: Option<f64>,
    prediction_quality: Option<f64>,
    vagueness: Option<f64>,
    prediction_context: Option<String>,
    timeframe_start: Option<DateTime<Utc>>,
    timeframe_end: Option<DateTime<Utc>>,
    timeframe_status: Option<String>,
    filter_validation_confidence: Option<f64>,
    filter_validation_reasoning: Option<String>,
    post_text: String,
}

impl From<LeaseRow> for LeasedTuple {
    fn from(row: LeaseRow) -> Self {
        Self {
            prediction: Prediction {
                id: row.prediction_id.clone(),
                source_post_id: row.source_post_id.clone(),
                goal_slices: row.goal_slices,
                llm_confidence: row.llm_confidence,
                prediction_quality: row.prediction_quality,
                vagueness: row.vagueness,
            },
            details: PredictionDetails {
                prediction_id: row.prediction_id,
                prediction_context: row.prediction_context,
                timeframe_start: row.timeframe_start,
                timeframe_end: row.timeframe_end,
                timeframe_status: row.timeframe_status,
                filter_validation_confidence: row.filter_validation_confidence,
                filter_validation_reasoning: row.filter_validation_reasoning,
            },
            post: Post {
                id: row.source_post_id,
                text: row.post_text,
            },
        }
    }
}
