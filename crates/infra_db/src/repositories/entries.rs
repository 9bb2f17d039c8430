//! Journal rows
//!
//! `ledger_entries` is append-only; a trigger rejects UPDATE and DELETE.

use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::error::DatabaseError;

/// A row of the `ledger_entries` table
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct EntryRow {
    pub entry_id: i64,
    pub account_id: Uuid,
    pub transaction_type: String,
    pub amount: i64,
    pub balance_after: i64,
    pub reference_kind: Option<String>,
    pub reference_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// An entry to insert; the database assigns `entry_id`
#[derive(Debug, Clone)]
pub struct NewEntryRow {
    pub account_id: Uuid,
    pub transaction_type: String,
    pub amount: i64,
    pub balance_after: i64,
    pub reference_kind: Option<String>,
    pub reference_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct EntrySum {
    total: i64,
    entry_count: i64,
}

/// Queries over `ledger_entries`
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryRepository;

impl EntryRepository {
    /// Entry with the highest id for the account
    pub async fn latest<'e, E: PgExecutor<'e>>(executor: E, account_id: Uuid) -> Result<Option<EntryRow>, DatabaseError> {
        let row = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT entry_id, account_id, transaction_type, amount, balance_after,
                   reference_kind, reference_id, created_at
            FROM ledger_entries
            WHERE account_id = $1
            ORDER BY entry_id DESC
            LIMIT 1
            "#,
        )
        .bind(account_id)
        .fetch_optional(executor)
        .await?;
        Ok(row)
    }

    /// Appends an entry
    ///
    /// # Errors
    ///
    /// `ConstraintViolation` if `balance_after` is negative.
    pub async fn insert<'e, E: PgExecutor<'e>>(executor: E, entry: &NewEntryRow) -> Result<EntryRow, DatabaseError> {
        let row = sqlx::query_as::<_, EntryRow>(
            r#"
            INSERT INTO ledger_entries (
                account_id, transaction_type, amount, balance_after,
                reference_kind, reference_id, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING entry_id, account_id, transaction_type, amount, balance_after,
                      reference_kind, reference_id, created_at
            "#,
        )
        .bind(entry.account_id)
        .bind(&entry.transaction_type)
        .bind(entry.amount)
        .bind(entry.balance_after)
        .bind(&entry.reference_kind)
        .bind(entry.reference_id)
        .bind(entry.created_at)
        .fetch_one(executor)
        .await?;
        Ok(row)
    }

    /// Sum of signed amounts and number of entries
    pub async fn sum<'e, E: PgExecutor<'e>>(executor: E, account_id: Uuid) -> Result<(i64, i64), DatabaseError> {
        let sum = sqlx::query_as::<_, EntrySum>(
            r#"
            SELECT COALESCE(SUM(amount), 0)::BIGINT AS total,
                   COUNT(*) AS entry_count
            FROM ledger_entries
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_one(executor)
        .await?;
        Ok((sum.total, sum.entry_count))
    }

    /// All entries of an account in append order
    pub async fn all<'e, E: PgExecutor<'e>>(executor: E, account_id: Uuid) -> Result<Vec<EntryRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT entry_id, account_id, transaction_type, amount, balance_after,
                   reference_kind, reference_id, created_at
            FROM ledger_entries
            WHERE account_id = $1
            ORDER BY entry_id
            "#,
        )
        .bind(account_id)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }
}
