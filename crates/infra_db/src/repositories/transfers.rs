//! Transfer rows

use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::error::DatabaseError;

const COLUMNS: &str = r#"
    transfer_id, idempotency_key, caller_id, funding_kind, source_account_id,
    remote_owner_id, destination_account_id, amount, status, failure_code,
    failure_reason, destination_balance_after, source_balance_after,
    created_at, completed_at
"#;

/// A row of the `transfers` table
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct TransferRow {
    pub transfer_id: Uuid,
    pub idempotency_key: String,
    pub caller_id: String,
    /// `INTERNAL` or `REMOTE`
    pub funding_kind: String,
    pub source_account_id: Option<Uuid>,
    pub remote_owner_id: Option<String>,
    pub destination_account_id: Uuid,
    pub amount: i64,
    pub status: String,
    pub failure_code: Option<String>,
    pub failure_reason: Option<String>,
    pub destination_balance_after: Option<i64>,
    pub source_balance_after: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Queries over `transfers`
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferRepository;

impl TransferRepository {
    /// Inserts the row unless its idempotency key exists
    ///
    /// Returns `false` when another row already holds the key. A concurrent
    /// insert with the same key waits on the unique index until the first
    /// one commits, so exactly one caller sees `true`.
    pub async fn insert_if_absent<'e, E: PgExecutor<'e>>(executor: E, row: &TransferRow) -> Result<bool, DatabaseError> {
        let inserted = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO transfers (
                transfer_id, idempotency_key, caller_id, funding_kind, source_account_id,
                remote_owner_id, destination_account_id, amount, status, failure_code,
                failure_reason, destination_balance_after, source_balance_after,
                created_at, completed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (idempotency_key) DO NOTHING
            RETURNING transfer_id
            "#,
        )
        .bind(row.transfer_id)
        .bind(&row.idempotency_key)
        .bind(&row.caller_id)
        .bind(&row.funding_kind)
        .bind(row.source_account_id)
        .bind(&row.remote_owner_id)
        .bind(row.destination_account_id)
        .bind(row.amount)
        .bind(&row.status)
        .bind(&row.failure_code)
        .bind(&row.failure_reason)
        .bind(row.destination_balance_after)
        .bind(row.source_balance_after)
        .bind(row.created_at)
        .bind(row.completed_at)
        .fetch_optional(executor)
        .await?;
        Ok(inserted.is_some())
    }

    pub async fn find<'e, E: PgExecutor<'e>>(executor: E, transfer_id: Uuid) -> Result<Option<TransferRow>, DatabaseError> {
        let sql = format!("SELECT {} FROM transfers WHERE transfer_id = $1", COLUMNS);
        let row = sqlx::query_as::<_, TransferRow>(&sql)
            .bind(transfer_id)
            .fetch_optional(executor)
            .await?;
        Ok(row)
    }

    pub async fn find_by_key<'e, E: PgExecutor<'e>>(executor: E, key: &str) -> Result<Option<TransferRow>, DatabaseError> {
        let sql = format!("SELECT {} FROM transfers WHERE idempotency_key = $1", COLUMNS);
        let row = sqlx::query_as::<_, TransferRow>(&sql)
            .bind(key)
            .fetch_optional(executor)
            .await?;
        Ok(row)
    }

    /// Reads the row and holds its lock until the transaction ends
    pub async fn find_for_update<'e, E: PgExecutor<'e>>(
        executor: E,
        transfer_id: Uuid,
    ) -> Result<Option<TransferRow>, DatabaseError> {
        let sql = format!("SELECT {} FROM transfers WHERE transfer_id = $1 FOR UPDATE", COLUMNS);
        let row = sqlx::query_as::<_, TransferRow>(&sql)
            .bind(transfer_id)
            .fetch_optional(executor)
            .await?;
        Ok(row)
    }

    /// Writes the outcome columns
    pub async fn update_outcome<'e, E: PgExecutor<'e>>(executor: E, row: &TransferRow) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE transfers
            SET status = $2,
                failure_code = $3,
                failure_reason = $4,
                destination_balance_after = $5,
                source_balance_after = $6,
                completed_at = $7
            WHERE transfer_id = $1
            "#,
        )
        .bind(row.transfer_id)
        .bind(&row.status)
        .bind(&row.failure_code)
        .bind(&row.failure_reason)
        .bind(row.destination_balance_after)
        .bind(row.source_balance_after)
        .bind(row.completed_at)
        .execute(executor)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Transfer", row.transfer_id));
        }
        Ok(())
    }

    /// PENDING rows created before `older_than`, oldest first
    pub async fn stale<'e, E: PgExecutor<'e>>(
        executor: E,
        older_than: DateTime<Utc>,
        after: Option<(DateTime<Utc>, Uuid)>,
        limit: i64,
    ) -> Result<Vec<TransferRow>, DatabaseError> {
        let sql = format!(
            r#"
            SELECT {} FROM transfers
            WHERE status = 'PENDING' AND created_at < $1
              AND ($2::timestamptz IS NULL OR (created_at, transfer_id) > ($2, $3))
            ORDER BY created_at, transfer_id
            LIMIT $4
            "#,
            COLUMNS
        );
        let rows = sqlx::query_as::<_, TransferRow>(&sql)
            .bind(older_than)
            .bind(after.map(|(created_at, _)| created_at))
            .bind(after.map(|(_, id)| id))
            .bind(limit)
            .fetch_all(executor)
            .await?;
        Ok(rows)
    }
}
