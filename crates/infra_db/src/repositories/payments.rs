//! Payment rows

use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::error::DatabaseError;

const COLUMNS: &str = r#"
    payment_id, idempotency_key, caller_id, payer_account_id, amount,
    recipient_name, recipient_bank, recipient_account_number, session_ref,
    status, failure_code, failure_reason, balance_after, created_at, completed_at
"#;

/// A row of the `payments` table
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PaymentRow {
    pub payment_id: Uuid,
    pub idempotency_key: String,
    pub caller_id: String,
    pub payer_account_id: Uuid,
    pub amount: i64,
    pub recipient_name: String,
    pub recipient_bank: Option<String>,
    pub recipient_account_number: Option<String>,
    pub session_ref: Option<String>,
    pub status: String,
    pub failure_code: Option<String>,
    pub failure_reason: Option<String>,
    pub balance_after: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Queries over `payments`
#[derive(Debug, Clone, Copy, Default)]
pub struct PaymentRepository;

impl PaymentRepository {
    /// Inserts the row unless its idempotency key exists; see
    /// [`TransferRepository::insert_if_absent`](super::TransferRepository::insert_if_absent)
    pub async fn insert_if_absent<'e, E: PgExecutor<'e>>(executor: E, row: &PaymentRow) -> Result<bool, DatabaseError> {
        let inserted = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO payments (
                payment_id, idempotency_key, caller_id, payer_account_id, amount,
                recipient_name, recipient_bank, recipient_account_number, session_ref,
                status, failure_code, failure_reason, balance_after, created_at, completed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (idempotency_key) DO NOTHING
            RETURNING payment_id
            "#,
        )
        .bind(row.payment_id)
        .bind(&row.idempotency_key)
        .bind(&row.caller_id)
        .bind(row.payer_account_id)
        .bind(row.amount)
        .bind(&row.recipient_name)
        .bind(&row.recipient_bank)
        .bind(&row.recipient_account_number)
        .bind(&row.session_ref)
        .bind(&row.status)
        .bind(&row.failure_code)
        .bind(&row.failure_reason)
        .bind(row.balance_after)
        .bind(row.created_at)
        .bind(row.completed_at)
        .fetch_optional(executor)
        .await?;
        Ok(inserted.is_some())
    }

    pub async fn find<'e, E: PgExecutor<'e>>(executor: E, payment_id: Uuid) -> Result<Option<PaymentRow>, DatabaseError> {
        let sql = format!("SELECT {} FROM payments WHERE payment_id = $1", COLUMNS);
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(payment_id)
            .fetch_optional(executor)
            .await?;
        Ok(row)
    }

    pub async fn find_by_key<'e, E: PgExecutor<'e>>(executor: E, key: &str) -> Result<Option<PaymentRow>, DatabaseError> {
        let sql = format!("SELECT {} FROM payments WHERE idempotency_key = $1", COLUMNS);
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(key)
            .fetch_optional(executor)
            .await?;
        Ok(row)
    }

    pub async fn find_for_update<'e, E: PgExecutor<'e>>(
        executor: E,
        payment_id: Uuid,
    ) -> Result<Option<PaymentRow>, DatabaseError> {
        let sql = format!("SELECT {} FROM payments WHERE payment_id = $1 FOR UPDATE", COLUMNS);
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(payment_id)
            .fetch_optional(executor)
            .await?;
        Ok(row)
    }

    pub async fn update_outcome<'e, E: PgExecutor<'e>>(executor: E, row: &PaymentRow) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2,
                failure_code = $3,
                failure_reason = $4,
                balance_after = $5,
                completed_at = $6
            WHERE payment_id = $1
            "#,
        )
        .bind(row.payment_id)
        .bind(&row.status)
        .bind(&row.failure_code)
        .bind(&row.failure_reason)
        .bind(row.balance_after)
        .bind(row.completed_at)
        .execute(executor)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Payment", row.payment_id));
        }
        Ok(())
    }

    pub async fn stale<'e, E: PgExecutor<'e>>(
        executor: E,
        older_than: DateTime<Utc>,
        after: Option<(DateTime<Utc>, Uuid)>,
        limit: i64,
    ) -> Result<Vec<PaymentRow>, DatabaseError> {
        let sql = format!(
            r#"
            SELECT {} FROM payments
            WHERE status = 'PENDING' AND created_at < $1
              AND ($2::timestamptz IS NULL OR (created_at, payment_id) > ($2, $3))
            ORDER BY created_at, payment_id
            LIMIT $4
            "#,
            COLUMNS
        );
        let rows = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(older_than)
            .bind(after.map(|(created_at, _)| created_at))
            .bind(after.map(|(_, id)| id))
            .bind(limit)
            .fetch_all(executor)
            .await?;
        Ok(rows)
    }
}
