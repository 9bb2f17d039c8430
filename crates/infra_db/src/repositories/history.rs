//! Keyset history queries
//!
//! Both queries walk `idx_ledger_entries_history` backwards from the cursor:
//! `(created_at, entry_id) < (cursor_created_at, cursor_id)`. There is no
//! OFFSET, so rows appended while a client pages never shift a page.

use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::error::DatabaseError;

/// A journal row joined with the operation it belongs to
///
/// Payment rows carry `recipient_name`; transfer rows carry the funding
/// columns.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct HistoryRow {
    pub entry_id: i64,
    pub transaction_type: String,
    pub amount: i64,
    pub balance_after: i64,
    pub reference_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub recipient_name: Option<String>,
    pub funding_kind: Option<String>,
    pub source_account_id: Option<Uuid>,
    pub remote_owner_id: Option<String>,
    pub destination_account_id: Option<Uuid>,
}

/// Queries over the journal for history pages
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryRepository;

impl HistoryRepository {
    /// Payment entries of an account, newest first, strictly before the cursor
    pub async fn payment_slice<'e, E: PgExecutor<'e>>(
        executor: E,
        account_id: Uuid,
        cursor: Option<(DateTime<Utc>, i64)>,
        limit: i64,
    ) -> Result<Vec<HistoryRow>, DatabaseError> {
        let (cursor_created_at, cursor_id) = split(cursor);
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT e.entry_id, e.transaction_type, e.amount, e.balance_after,
                   e.reference_id, e.created_at,
                   p.recipient_name,
                   NULL::TEXT AS funding_kind,
                   NULL::UUID AS source_account_id,
                   NULL::TEXT AS remote_owner_id,
                   NULL::UUID AS destination_account_id
            FROM ledger_entries e
            JOIN payments p ON p.payment_id = e.reference_id
            WHERE e.account_id = $1
              AND e.reference_kind = 'PAYMENT'
              AND ($2::TIMESTAMPTZ IS NULL OR (e.created_at, e.entry_id) < ($2::TIMESTAMPTZ, $3::BIGINT))
            ORDER BY e.created_at DESC, e.entry_id DESC
            LIMIT $4
            "#,
        )
        .bind(account_id)
        .bind(cursor_created_at)
        .bind(cursor_id)
        .bind(limit)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    /// Transfer entries of an account, newest first, strictly before the cursor
    pub async fn transfer_slice<'e, E: PgExecutor<'e>>(
        executor: E,
        account_id: Uuid,
        cursor: Option<(DateTime<Utc>, i64)>,
        limit: i64,
    ) -> Result<Vec<HistoryRow>, DatabaseError> {
        let (cursor_created_at, cursor_id) = split(cursor);
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT e.entry_id, e.transaction_type, e.amount, e.balance_after,
                   e.reference_id, e.created_at,
                   NULL::TEXT AS recipient_name,
                   t.funding_kind,
                   t.source_account_id,
                   t.remote_owner_id,
                   t.destination_account_id
            FROM ledger_entries e
            JOIN transfers t ON t.transfer_id = e.reference_id
            WHERE e.account_id = $1
              AND e.reference_kind = 'TRANSFER'
              AND ($2::TIMESTAMPTZ IS NULL OR (e.created_at, e.entry_id) < ($2::TIMESTAMPTZ, $3::BIGINT))
            ORDER BY e.created_at DESC, e.entry_id DESC
            LIMIT $4
            "#,
        )
        .bind(account_id)
        .bind(cursor_created_at)
        .bind(cursor_id)
        .bind(limit)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }
}

fn split(cursor: Option<(DateTime<Utc>, i64)>) -> (Option<DateTime<Utc>>, Option<i64>) {
    match cursor {
        Some((created_at, id)) => (Some(created_at), Some(id)),
        None => (None, None),
    }
}
