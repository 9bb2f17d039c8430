//! Account rows

use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::error::DatabaseError;

/// A row of the `accounts` table
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AccountRow {
    pub account_id: Uuid,
    pub owner_id: String,
    pub kind: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Queries over `accounts`
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountRepository;

impl AccountRepository {
    pub async fn insert<'e, E: PgExecutor<'e>>(executor: E, row: &AccountRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (account_id, owner_id, kind, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(row.account_id)
        .bind(&row.owner_id)
        .bind(&row.kind)
        .bind(row.is_active)
        .bind(row.created_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn find<'e, E: PgExecutor<'e>>(executor: E, account_id: Uuid) -> Result<Option<AccountRow>, DatabaseError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT account_id, owner_id, kind, is_active, created_at
            FROM accounts
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(executor)
        .await?;
        Ok(row)
    }

    /// Reads the row and holds its lock until the transaction ends
    pub async fn find_for_update<'e, E: PgExecutor<'e>>(
        executor: E,
        account_id: Uuid,
    ) -> Result<Option<AccountRow>, DatabaseError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT account_id, owner_id, kind, is_active, created_at
            FROM accounts
            WHERE account_id = $1
            FOR UPDATE
            "#,
        )
        .bind(account_id)
        .fetch_optional(executor)
        .await?;
        Ok(row)
    }

    /// All accounts of one owner, oldest first
    pub async fn by_owner<'e, E: PgExecutor<'e>>(executor: E, owner_id: &str) -> Result<Vec<AccountRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT account_id, owner_id, kind, is_active, created_at
            FROM accounts
            WHERE owner_id = $1
            ORDER BY created_at, account_id
            "#,
        )
        .bind(owner_id)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    pub async fn set_active<'e, E: PgExecutor<'e>>(
        executor: E,
        account_id: Uuid,
        is_active: bool,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE accounts SET is_active = $2 WHERE account_id = $1")
            .bind(account_id)
            .bind(is_active)
            .execute(executor)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Account", account_id));
        }
        Ok(())
    }
}
