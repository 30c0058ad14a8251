//! # Deduction Outcome Repository
//!
//! The engine's commit bookkeeping. One row per sale line attempt; the
//! health monitor compares these rows with the movement log.
//!
//! ```text
//! apply_deduction ──► insert(outcome)          status committed / rolled_back / failed
//! idempotency     ──► find_committed_by_key
//! health monitor  ──► recent(store?, since)
//! reversal        ──► mark_reversed            committed → reversed
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use larder_core::{DeductionOutcome, OutcomeStatus};

const OUTCOME_COLUMNS: &str = r#"
    id, transaction_id, store_id, product_id, quantity_sold,
    status, items_processed, idempotency_key, errors, created_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct OutcomeRow {
    id: String,
    transaction_id: String,
    store_id: String,
    product_id: String,
    quantity_sold: i64,
    status: OutcomeStatus,
    items_processed: i64,
    idempotency_key: Option<String>,
    errors: String,
    created_at: DateTime<Utc>,
}

impl From<OutcomeRow> for DeductionOutcome {
    fn from(row: OutcomeRow) -> Self {
        DeductionOutcome {
            id: row.id,
            transaction_id: row.transaction_id,
            store_id: row.store_id,
            product_id: row.product_id,
            quantity_sold: row.quantity_sold,
            status: row.status,
            items_processed: row.items_processed,
            idempotency_key: row.idempotency_key,
            errors: serde_json::from_str(&row.errors).unwrap_or_default(),
            created_at: row.created_at,
        }
    }
}

/// Repository for deduction outcomes.
#[derive(Debug, Clone)]
pub struct OutcomeRepository {
    pool: SqlitePool,
}

impl OutcomeRepository {
    /// Creates a new OutcomeRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OutcomeRepository { pool }
    }

    /// Records the outcome of one sale line.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - A committed outcome already uses
    ///   this idempotency key
    pub async fn insert(&self, outcome: &DeductionOutcome) -> DbResult<()> {
        debug!(
            transaction_id = %outcome.transaction_id,
            status = outcome.status.as_str(),
            items_processed = outcome.items_processed,
            "Recording deduction outcome"
        );

        let errors = serde_json::to_string(&outcome.errors).unwrap_or_else(|_| "[]".to_string());

        sqlx::query(
            r#"
            INSERT INTO deduction_outcomes (
                id, transaction_id, store_id, product_id, quantity_sold,
                status, items_processed, idempotency_key, errors, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&outcome.id)
        .bind(&outcome.transaction_id)
        .bind(&outcome.store_id)
        .bind(&outcome.product_id)
        .bind(outcome.quantity_sold)
        .bind(outcome.status)
        .bind(outcome.items_processed)
        .bind(&outcome.idempotency_key)
        .bind(errors)
        .bind(outcome.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// The committed outcome recorded under an idempotency key, if any.
    pub async fn find_committed_by_key(&self, key: &str) -> DbResult<Option<DeductionOutcome>> {
        let sql = format!(
            "SELECT {OUTCOME_COLUMNS} FROM deduction_outcomes \
             WHERE idempotency_key = ?1 AND status = 'committed' \
             LIMIT 1"
        );
        let row = sqlx::query_as::<_, OutcomeRow>(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(DeductionOutcome::from))
    }

    /// Outcomes recorded since `since`, optionally for one store, oldest first.
    pub async fn recent(
        &self,
        store_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> DbResult<Vec<DeductionOutcome>> {
        let sql = format!(
            "SELECT {OUTCOME_COLUMNS} FROM deduction_outcomes \
             WHERE created_at >= ?1 AND (?2 IS NULL OR store_id = ?2) \
             ORDER BY created_at, rowid"
        );
        let rows = sqlx::query_as::<_, OutcomeRow>(&sql)
            .bind(since)
            .bind(store_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(DeductionOutcome::from).collect())
    }

    /// Every outcome of a transaction.
    pub async fn for_transaction(&self, transaction_id: &str) -> DbResult<Vec<DeductionOutcome>> {
        let sql = format!(
            "SELECT {OUTCOME_COLUMNS} FROM deduction_outcomes \
             WHERE transaction_id = ?1 \
             ORDER BY created_at, rowid"
        );
        let rows = sqlx::query_as::<_, OutcomeRow>(&sql)
            .bind(transaction_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(DeductionOutcome::from).collect())
    }

    /// Marks the committed outcomes of a transaction as reversed.
    ///
    /// ## Returns
    /// Number of outcomes changed.
    pub async fn mark_reversed(&self, transaction_id: &str, store_id: &str) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE deduction_outcomes
            SET status = 'reversed'
            WHERE transaction_id = ?1 AND store_id = ?2 AND status = 'committed'
            "#,
        )
        .bind(transaction_id)
        .bind(store_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
